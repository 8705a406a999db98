//! # Eventos hacia el Handler Externo
//! src/bridge/event.rs
//!
//! Cada request HTTP se publica como un único evento
//! `httpServerResponseReceived` cuyo payload es `RequestEvent`. El emisor
//! no retorna nada: la respuesta vuelve por `ServerHandle::respond`.
//!
//! ## Payload (JSON)
//!
//! ```json
//! {
//!   "url": "/foo?a=1&b=2",
//!   "method": "GET",
//!   "requestId": "1700000000000:42",
//!   "files": {},
//!   "arguments": {"a": "1", "b": "2"}
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::warn;

/// Nombre del evento que se emite por cada request
pub const SERVER_EVENT_ID: &str = "httpServerResponseReceived";

/// Request tal como lo ve el handler externo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    /// Path + `?` + query string cruda (si hay)
    pub url: String,

    pub method: String,

    pub request_id: String,

    /// Campo del formulario → ruta del archivo en el `TempFileStore`
    pub files: BTreeMap<String, String>,

    /// Query params y campos de formulario
    pub arguments: BTreeMap<String, String>,
}

impl RequestEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Destino de los eventos (bus de eventos de la aplicación)
///
/// `emit` se llama desde el thread de cada conexión, por eso la
/// implementación debe ser `Send + Sync`.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event_name: &str, payload: RequestEvent);
}

impl<F> EventEmitter for F
where
    F: Fn(&str, RequestEvent) + Send + Sync,
{
    fn emit(&self, event_name: &str, payload: RequestEvent) {
        self(event_name, payload)
    }
}

/// Un evento emitido, tal como lo recibe el consumidor de un `ChannelEmitter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub name: String,
    pub payload: RequestEvent,
}

/// Emisor que reenvía los eventos por un canal mpsc
///
/// Útil cuando el handler vive en su propio thread.
pub struct ChannelEmitter {
    sender: Sender<EmittedEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, Receiver<EmittedEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event_name: &str, payload: RequestEvent) {
        let request_id = payload.request_id.clone();
        let event = EmittedEvent {
            name: event_name.to_string(),
            payload,
        };

        // Sin receptor el request terminará por timeout
        if self.sender.send(event).is_err() {
            warn!(request_id = %request_id, "Event receiver is gone; request will time out");
        }
    }
}
