//! # Bridge HTTP ↔ Handler Externo
//! src/bridge/mod.rs
//!
//! - `registry`: correlación requestId → respuesta pendiente
//! - `event`: payload del evento y trait `EventEmitter`
//! - `builder`: construcción de respuestas inline o desde archivo
//! - `request_bridge`: orquesta un request completo

pub mod builder;
pub mod event;
pub mod registry;
pub mod request_bridge;

pub use builder::ResponseBuilder;
pub use event::{ChannelEmitter, EmittedEvent, EventEmitter, RequestEvent, SERVER_EVENT_ID};
pub use registry::{CallState, PendingCall, PendingResponse, RequestId, RequestRegistry, ResponseBody};
pub use request_bridge::{RequestBridge, REQUEST_ID_HEADER};
