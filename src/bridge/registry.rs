//! # Registro de Requests Pendientes
//! src/bridge/registry.rs
//!
//! Punto de encuentro entre el thread que atiende una conexión y el
//! handler externo que responde de forma asíncrona.
//!
//! Cada request abre una *llamada pendiente* identificada por su
//! `RequestId`. La llamada guarda un canal de una posición: `fulfill`
//! deposita la respuesta y el thread bloqueado en `await_response` la
//! recibe sin polling.
//!
//! ```text
//! open_call() ──► Pending ──fulfill()──► Fulfilled ──wait()──► Consumed
//!                    │
//!                    └──timeout──► TimedOut
//! ```
//!
//! Un id sale del registro exactamente una vez (al consumirse o al
//! vencer); cualquier `fulfill` posterior es un no-op.

use crate::error::BridgeError;
use crate::http::StatusCode;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Token opaco que correlaciona un request con su respuesta
pub type RequestId = String;

/// Rango del componente aleatorio del id
const RANDOM_COMPONENT_BOUND: u32 = 1_000_000;

/// Body de una respuesta producida por el handler externo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Texto en memoria
    Text(String),

    /// Ruta a un archivo que se enviará como body
    File(PathBuf),
}

/// Respuesta del handler externo esperando a ser entregada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResponse {
    pub request_id: RequestId,
    pub status: StatusCode,
    pub content_type: String,
    pub body: ResponseBody,
}

impl PendingResponse {
    pub fn text(request_id: &str, status: StatusCode, content_type: &str, body: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            status,
            content_type: content_type.to_string(),
            body: ResponseBody::Text(body.to_string()),
        }
    }

    pub fn file(request_id: &str, status: StatusCode, content_type: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            request_id: request_id.to_string(),
            status,
            content_type: content_type.to_string(),
            body: ResponseBody::File(path.into()),
        }
    }
}

/// Estado de una llamada pendiente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Esperando al handler externo
    Pending,

    /// El handler respondió; la respuesta está en el canal
    Fulfilled,

    /// El thread de la conexión recibió la respuesta
    Consumed,

    /// Venció el timeout sin respuesta
    TimedOut,
}

struct Slot {
    state: CallState,
    sender: SyncSender<PendingResponse>,
}

type Slots = Arc<Mutex<HashMap<RequestId, Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<RequestId, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tabla de correlación requestId → llamada pendiente
pub struct RequestRegistry {
    slots: Slots,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Genera un id que no coincide con ninguna llamada en curso
    ///
    /// Formato: `<unix-millis>:<aleatorio 0..1000000>`. El id no queda
    /// reservado; para eso está `open_call`.
    pub fn allocate_id(&self) -> RequestId {
        Self::unique_id(&lock(&self.slots))
    }

    fn unique_id(slots: &HashMap<RequestId, Slot>) -> RequestId {
        let mut rng = rand::thread_rng();
        loop {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            let id = format!("{}:{}", millis, rng.gen_range(0..RANDOM_COMPONENT_BOUND));

            if !slots.contains_key(&id) {
                return id;
            }
        }
    }

    /// Reserva un id nuevo y registra su llamada como `Pending`
    ///
    /// La llamada se elimina del registro cuando el `PendingCall` se
    /// destruye, así que un request que falla antes de esperar no deja
    /// basura.
    pub fn open_call(&self) -> PendingCall {
        let (sender, receiver) = mpsc::sync_channel(1);

        let id = {
            let mut slots = lock(&self.slots);
            let id = Self::unique_id(&slots);
            slots.insert(
                id.clone(),
                Slot {
                    state: CallState::Pending,
                    sender,
                },
            );
            id
        };

        debug!(request_id = %id, "Call opened");

        PendingCall {
            id,
            receiver,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Entrega la respuesta a la llamada `response.request_id`
    ///
    /// Retorna `false` (sin error) si el id es desconocido, ya fue
    /// respondido, consumido o venció.
    pub fn fulfill(&self, response: PendingResponse) -> bool {
        let mut slots = lock(&self.slots);

        let Some(slot) = slots.get_mut(&response.request_id) else {
            debug!(request_id = %response.request_id, "Fulfill for unknown request ignored");
            return false;
        };

        if slot.state != CallState::Pending {
            debug!(
                request_id = %response.request_id,
                state = ?slot.state,
                "Duplicate fulfill ignored"
            );
            return false;
        }

        let request_id = response.request_id.clone();
        match slot.sender.try_send(response) {
            Ok(()) => {
                slot.state = CallState::Fulfilled;
                debug!(request_id = %request_id, "Call fulfilled");
                true
            }
            Err(_) => false,
        }
    }

    /// Bloquea hasta que llegue la respuesta de `call` o venza `timeout`
    pub fn await_response(&self, call: PendingCall, timeout: Duration) -> Result<PendingResponse, BridgeError> {
        call.wait(timeout)
    }

    /// Responde todas las llamadas `Pending` con la respuesta que genere `make`
    ///
    /// Retorna cuántas llamadas se respondieron.
    pub fn cancel_all<F>(&self, make: F) -> usize
    where
        F: Fn(&str) -> PendingResponse,
    {
        let mut slots = lock(&self.slots);
        let mut cancelled = 0;

        for (id, slot) in slots.iter_mut() {
            if slot.state == CallState::Pending && slot.sender.try_send(make(id)).is_ok() {
                slot.state = CallState::Fulfilled;
                cancelled += 1;
            }
        }

        cancelled
    }

    /// Cantidad de llamadas aún registradas (pendientes o sin consumir)
    pub fn in_flight(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Estado de una llamada registrada; `None` si ya salió del registro
    pub fn state(&self, request_id: &str) -> Option<CallState> {
        lock(&self.slots).get(request_id).map(|slot| slot.state)
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RequestRegistry {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

/// Lado del thread de la conexión de una llamada pendiente
pub struct PendingCall {
    id: RequestId,
    receiver: Receiver<PendingResponse>,
    slots: Slots,
}

impl PendingCall {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Espera la respuesta como máximo `timeout`
    pub fn wait(self, timeout: Duration) -> Result<PendingResponse, BridgeError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(response) => {
                debug!(request_id = %self.id, state = ?CallState::Consumed, "Call finished");
                Ok(response)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                // Sacar el slot bajo el lock: desde aquí ningún fulfill puede
                // entrar. Si uno ganó la carrera, su respuesta ya está en el canal.
                lock(&self.slots).remove(&self.id);

                match self.receiver.try_recv() {
                    Ok(response) => {
                        debug!(request_id = %self.id, state = ?CallState::Consumed, "Call finished at deadline");
                        Ok(response)
                    }
                    Err(_) => {
                        debug!(request_id = %self.id, state = ?CallState::TimedOut, "Call finished");
                        Err(BridgeError::Timeout {
                            request_id: self.id.clone(),
                            timeout_ms: timeout.as_millis() as u64,
                        })
                    }
                }
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        lock(&self.slots).remove(&self.id);
    }
}
