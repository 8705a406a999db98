//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Listener HTTP/1.0 con un thread por conexión. Cada conexión lee un
//! request, lo entrega al `RequestBridge` (que bloquea hasta que el
//! handler externo responde), escribe la respuesta y cierra.
//!
//! El ciclo de vida es `new` → `start` → `stop`. `stop` es idempotente:
//!
//! 1. el bridge deja de aceptar requests (503) y cancela los pendientes
//! 2. espera a que terminen los requests en curso (`shutdown_grace_ms`)
//! 3. borra los archivos del `TempFileStore`
//! 4. despierta y cierra el loop de accept

use crate::bridge::registry::PendingResponse;
use crate::bridge::{EventEmitter, RequestBridge, RequestRegistry};
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::http::request::{content_length, find_header_end, parse_head_headers, ParseError};
use crate::http::{Method, Request, Response, StatusCode};
use crate::metrics::MetricsCollector;
use crate::storage::TempFileStore;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Tamaño máximo de request line + headers
const MAX_HEAD_BYTES: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 8192;

/// Timeout de la conexión que despierta al loop de accept
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errores al leer un request del socket
#[derive(Debug, Error)]
enum ReadError {
    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("Request body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("Bad request: {0}")]
    Malformed(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ReadError {
    fn status(&self) -> StatusCode {
        match self {
            ReadError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Lo que necesita cada thread de conexión
struct ConnectionContext {
    bridge: Arc<RequestBridge>,
    metrics: MetricsCollector,
    read_timeout: Duration,
    max_body_bytes: usize,
}

struct RunningListener {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_thread: JoinHandle<()>,
}

enum ListenerState {
    Idle,
    Running(RunningListener),
    Stopped,
}

/// Servidor HTTP embebido que delega cada request al handler externo
pub struct Server {
    config: Config,
    bridge: Arc<RequestBridge>,
    metrics: MetricsCollector,
    state: Mutex<ListenerState>,
}

impl Server {
    /// Crea el servidor sin abrir el socket
    ///
    /// Falla si el directorio de archivos temporales no se puede crear.
    pub fn new(config: Config, emitter: Arc<dyn EventEmitter>) -> Result<Self> {
        config.validate().map_err(BridgeError::Config)?;

        let files = TempFileStore::new(config.temp_dir())?;
        let metrics = MetricsCollector::new();
        let bridge = RequestBridge::new(
            RequestRegistry::new(),
            files,
            emitter,
            config.response_timeout(),
            metrics.clone(),
        );

        Ok(Self {
            config,
            bridge: Arc::new(bridge),
            metrics,
            state: Mutex::new(ListenerState::Idle),
        })
    }

    fn state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abre el listener en `port` (0 = efímero) y retorna la dirección real
    pub fn start(&self, port: u16) -> Result<SocketAddr> {
        let mut state = self.state();

        match *state {
            ListenerState::Running(_) => return Err(BridgeError::AlreadyRunning),
            ListenerState::Stopped => return Err(BridgeError::Stopped),
            ListenerState::Idle => {}
        }

        let address = format!("{}:{}", self.config.host, port);
        let listener = TcpListener::bind(&address)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let context = Arc::new(ConnectionContext {
            bridge: Arc::clone(&self.bridge),
            metrics: self.metrics.clone(),
            read_timeout: self.config.read_timeout(),
            max_body_bytes: self.config.max_body_bytes,
        });

        let accept_thread = thread::Builder::new().name("http-accept".to_string()).spawn({
            let shutdown = Arc::clone(&shutdown);
            move || Self::accept_loop(listener, shutdown, context)
        })?;

        info!(address = %local_addr, "Server listening (one thread per connection)");

        *state = ListenerState::Running(RunningListener {
            local_addr,
            shutdown,
            accept_thread,
        });

        Ok(local_addr)
    }

    /// Detiene el servidor; retorna cuántos archivos temporales se borraron
    ///
    /// Se puede llamar varias veces y desde cualquier thread; solo la
    /// primera llamada hace trabajo.
    pub fn stop(&self) -> Result<usize> {
        let mut state = self.state();

        let running = match std::mem::replace(&mut *state, ListenerState::Stopped) {
            ListenerState::Stopped => return Ok(0),
            ListenerState::Idle => None,
            ListenerState::Running(running) => Some(running),
        };

        self.bridge.begin_shutdown();
        self.bridge.wait_idle(self.config.shutdown_grace());

        let removed = self.bridge.files().clear();

        if let Some(running) = running {
            Self::stop_listener(running);
        }

        info!(removed_files = removed, "Server stopped");
        Ok(removed)
    }

    fn stop_listener(running: RunningListener) {
        running.shutdown.store(true, Ordering::SeqCst);

        // El accept es bloqueante: una conexión propia lo despierta
        match TcpStream::connect_timeout(&wake_address(running.local_addr), WAKE_TIMEOUT) {
            Ok(_) => {
                if running.accept_thread.join().is_err() {
                    error!("Accept thread panicked");
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not wake the accept loop; leaving it detached");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state(), ListenerState::Running(_))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state() {
            ListenerState::Running(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// Superficie de callbacks para el handler externo
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            bridge: Arc::clone(&self.bridge),
            metrics: self.metrics.clone(),
        }
    }

    fn accept_loop(listener: TcpListener, shutdown: Arc<AtomicBool>, context: Arc<ConnectionContext>) {
        for stream in listener.incoming() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => {
                    let context = Arc::clone(&context);

                    let peer_addr = stream
                        .peer_addr()
                        .map(|addr| addr.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    debug!(peer = %peer_addr, "New connection (spawning thread)");

                    context.metrics.increment_active_connections();

                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(stream, &context) {
                            warn!(peer = %peer_addr, error = %e, "Connection failed");
                        }
                        context.metrics.decrement_active_connections();
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            }
        }

        debug!("Accept loop finished");
    }

    fn handle_connection(mut stream: TcpStream, context: &ConnectionContext) -> io::Result<()> {
        let start = Instant::now();
        stream.set_read_timeout(Some(context.read_timeout))?;

        let (method, response, include_body) = match read_request(&mut stream, context.max_body_bytes) {
            Ok(None) => {
                debug!("Connection closed before sending a request");
                return Ok(());
            }
            Ok(Some(raw)) => match Request::parse(&raw) {
                Ok(request) => {
                    let method = request.method();
                    let response = context.bridge.serve(&request);
                    (method.as_str(), response, method != Method::HEAD)
                }
                Err(e) => {
                    debug!(error = %e, "Malformed request");
                    (
                        "-",
                        Response::text(StatusCode::BAD_REQUEST, &ReadError::from(e).to_string()),
                        true,
                    )
                }
            },
            Err(ReadError::Io(e)) => return Err(e),
            Err(e) => {
                debug!(error = %e, "Request rejected while reading");
                ("-", Response::text(e.status(), &e.to_string()), true)
            }
        };

        let status = response.status();
        let request_id = response
            .header(crate::bridge::REQUEST_ID_HEADER)
            .unwrap_or("-")
            .to_string();

        let result = response
            .with_header("Connection", "close")
            .write_to(&mut stream, include_body);

        let latency = start.elapsed();
        context.metrics.record_request(method, status.as_u16(), latency);

        info!(
            request_id = %request_id,
            method,
            status = status.as_u16(),
            latency_ms = latency.as_secs_f64() * 1000.0,
            "Request completed"
        );

        result
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Error stopping server on drop");
        }
    }
}

/// Callbacks del handler externo
///
/// Se puede clonar y usar desde cualquier thread. Responder a un id
/// desconocido, ya respondido o vencido es un no-op que retorna `false`.
#[derive(Clone)]
pub struct ServerHandle {
    bridge: Arc<RequestBridge>,
    metrics: MetricsCollector,
}

impl ServerHandle {
    /// Responde `request_id` con un body de texto
    pub fn respond(&self, request_id: &str, status_code: u16, content_type: &str, body: &str) -> Result<bool> {
        let status = StatusCode::from_u16(status_code).ok_or(BridgeError::InvalidStatus(status_code))?;
        Ok(self.deliver(PendingResponse::text(request_id, status, content_type, body)))
    }

    /// Responde `request_id` con el contenido del archivo en `path`
    ///
    /// El archivo se abre cuando el thread de la conexión arma la
    /// respuesta; si no se puede leer, el cliente recibe 500.
    pub fn respond_with_file(
        &self,
        request_id: &str,
        status_code: u16,
        content_type: &str,
        path: impl AsRef<Path>,
    ) -> Result<bool> {
        let status = StatusCode::from_u16(status_code).ok_or(BridgeError::InvalidStatus(status_code))?;
        Ok(self.deliver(PendingResponse::file(
            request_id,
            status,
            content_type,
            path.as_ref(),
        )))
    }

    fn deliver(&self, response: PendingResponse) -> bool {
        let delivered = self.bridge.registry().fulfill(response);
        if !delivered {
            self.metrics.record_stale_fulfillment();
        }
        delivered
    }

    /// Borra un archivo subido que el handler ya no necesita
    pub fn release_file(&self, path: impl AsRef<Path>) -> bool {
        self.bridge.files().release(path.as_ref())
    }

    /// Requests esperando respuesta del handler
    pub fn in_flight(&self) -> usize {
        self.bridge.registry().in_flight()
    }

    pub fn metrics_json(&self) -> String {
        self.metrics.get_metrics_json()
    }
}

/// Lee request line, headers y el body indicado por `Content-Length`
///
/// `Ok(None)` si el cliente cerró sin enviar nada. Un head incompleto se
/// retorna tal cual para que lo rechace el parser.
fn read_request<R: Read>(stream: &mut R, max_body_bytes: usize) -> std::result::Result<Option<Vec<u8>>, ReadError> {
    let mut buffer = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    let head_end = loop {
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(ReadError::HeadTooLarge(MAX_HEAD_BYTES));
        }

        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(if buffer.is_empty() { None } else { Some(buffer) });
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let length = content_length(&parse_head_headers(&buffer[..head_end])?)?.unwrap_or(0);
    if length > max_body_bytes {
        return Err(ReadError::BodyTooLarge {
            length,
            limit: max_body_bytes,
        });
    }

    let total = head_end + length;
    while buffer.len() < total {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    Ok(Some(buffer))
}

/// Dirección para conectarse a un listener ligado a `addr`
fn wake_address(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}
