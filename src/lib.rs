//! # HTTP Bridge
//! src/lib.rs
//!
//! Servidor HTTP embebido que no contesta nada por sí mismo: cada request
//! se publica como un evento para un handler externo y el thread de la
//! conexión espera hasta que ese handler responde (o vence el timeout).
//!
//! ## Arquitectura
//!
//! - `http`: parsing de requests, multipart y construcción de responses
//! - `server`: listener TCP (un thread por conexión) y ciclo de vida
//! - `bridge`: registro de requests pendientes, eventos y respuestas
//! - `storage`: archivos temporales de los uploads
//! - `metrics`: recolección de métricas
//! - `config`, `error`, `logging`: configuración, errores y tracing
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use http_bridge::{ChannelEmitter, Config, Server};
//! use std::sync::Arc;
//!
//! let (emitter, events) = ChannelEmitter::new();
//! let server = Server::new(Config::default(), Arc::new(emitter)).unwrap();
//! let handle = server.handle();
//! server.start(8080).unwrap();
//!
//! for event in events {
//!     let id = event.payload.request_id.clone();
//!     handle.respond(&id, 200, "text/plain", "hola").unwrap();
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod storage;

pub use bridge::{ChannelEmitter, EmittedEvent, EventEmitter, RequestEvent, SERVER_EVENT_ID};
pub use config::Config;
pub use error::{BridgeError, Result};
pub use server::{Server, ServerHandle};
