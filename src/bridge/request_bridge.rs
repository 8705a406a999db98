//! # Request Bridge
//! src/bridge/request_bridge.rs
//!
//! Convierte un request HTTP en un evento para el handler externo y
//! bloquea el thread de la conexión hasta que llega la respuesta.
//!
//! ```text
//! Request ──parse body──► RequestEvent ──emit──► handler externo
//!                                                     │
//! Response ◄──ResponseBuilder◄── await_response ◄── respond()
//! ```

use crate::bridge::builder::ResponseBuilder;
use crate::bridge::event::{EventEmitter, RequestEvent, SERVER_EVENT_ID};
use crate::bridge::registry::{PendingResponse, RequestRegistry};
use crate::error::BridgeError;
use crate::http::{Request, Response, StatusCode};
use crate::metrics::MetricsCollector;
use crate::storage::TempFileStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Header con el id de correlación en cada respuesta
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const TIMEOUT_MESSAGE: &str = "Timed out waiting for a response";
const SHUTTING_DOWN_MESSAGE: &str = "Server is shutting down";

/// Intervalo de sondeo mientras se drenan los requests en curso
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cuenta un request en curso mientras vive
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Puente entre el listener HTTP y el handler externo
pub struct RequestBridge {
    registry: RequestRegistry,
    files: TempFileStore,
    emitter: Arc<dyn EventEmitter>,
    timeout: Duration,
    metrics: MetricsCollector,

    /// Una vez activo, los requests nuevos reciben 503
    stopping: AtomicBool,

    /// Requests dentro de `serve`
    active: AtomicUsize,
}

impl RequestBridge {
    pub fn new(
        registry: RequestRegistry,
        files: TempFileStore,
        emitter: Arc<dyn EventEmitter>,
        timeout: Duration,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            registry,
            files,
            emitter,
            timeout,
            metrics,
            stopping: AtomicBool::new(false),
            active: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    pub fn files(&self) -> &TempFileStore {
        &self.files
    }

    /// Atiende un request completo y retorna la respuesta a escribir
    ///
    /// Nunca falla: los errores se traducen a 500/503/504 con body de
    /// texto plano.
    pub fn serve(&self, request: &Request) -> Response {
        let _active = ActiveGuard::enter(&self.active);

        if self.is_stopping() {
            return Response::text(StatusCode::SERVICE_UNAVAILABLE, SHUTTING_DOWN_MESSAGE);
        }

        let call = self.registry.open_call();

        // Un stop que empezó mientras se abría la llamada ya pasó por cancel_all
        if self.is_stopping() {
            return Response::text(StatusCode::SERVICE_UNAVAILABLE, SHUTTING_DOWN_MESSAGE);
        }

        let request_id = call.id().to_string();

        let event = match self.fill_request_event(request, &request_id) {
            Ok(event) => event,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Request body could not be parsed");
                self.metrics.record_parse_failure();
                return Response::text(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
                    .with_header(REQUEST_ID_HEADER, &request_id);
            }
        };

        debug!(
            request_id = %request_id,
            method = %event.method,
            url = %event.url,
            files = event.files.len(),
            "Emitting request event"
        );
        self.emitter.emit(SERVER_EVENT_ID, event);

        let started = Instant::now();
        let response = match self.registry.await_response(call, self.timeout) {
            Ok(pending) => {
                debug!(
                    request_id = %request_id,
                    status = pending.status.as_u16(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Response received"
                );
                ResponseBuilder::build(pending)
            }
            Err(BridgeError::Timeout { timeout_ms, .. }) => {
                warn!(request_id = %request_id, timeout_ms, "Handler did not respond in time");
                self.metrics.record_timeout();
                Response::text(StatusCode::GATEWAY_TIMEOUT, TIMEOUT_MESSAGE)
            }
            Err(e) => Response::text(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        };

        response.with_header(REQUEST_ID_HEADER, &request_id)
    }

    /// Arma el payload del evento para `request`
    ///
    /// Los archivos subidos se copian al `TempFileStore`; los temporales de
    /// scratch del parseo se borran al salir.
    pub fn fill_request_event(&self, request: &Request, request_id: &str) -> Result<RequestEvent, BridgeError> {
        let body = request.parse_body()?;

        let mut files = BTreeMap::new();
        for (field, scratch) in &body.files {
            let stored = self.files.store_copy(scratch.path())?;
            files.insert(field.clone(), stored.to_string_lossy().into_owned());
        }

        Ok(RequestEvent {
            url: canonical_url(request),
            method: request.method().to_string(),
            request_id: request_id.to_string(),
            files,
            arguments: body.params.into_iter().collect(),
        })
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Requests actualmente dentro de `serve`
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Deja de aceptar requests y responde 503 a los que esperan
    ///
    /// Retorna cuántas llamadas pendientes se cancelaron. Solo la primera
    /// invocación cancela; las siguientes retornan 0.
    pub fn begin_shutdown(&self) -> usize {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let cancelled = self.registry.cancel_all(|id| {
            PendingResponse::text(id, StatusCode::SERVICE_UNAVAILABLE, "text/plain", SHUTTING_DOWN_MESSAGE)
        });
        info!(cancelled, "Bridge stopping; pending calls cancelled");
        cancelled
    }

    /// Espera hasta `grace` a que no quede ningún request en `serve`
    ///
    /// Retorna `true` si se drenaron todos.
    pub fn wait_idle(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            let active = self.active();
            if active == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(active, "Requests still in flight after shutdown grace period");
                return false;
            }
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
    }
}

/// Path + `?` + query string cruda cuando hay query
fn canonical_url(request: &Request) -> String {
    match request.query_string() {
        Some(query) if !query.is_empty() => format!("{}?{}", request.path(), query),
        _ => request.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::event::EmittedEvent;
    use std::fs;
    use std::sync::mpsc;
    use std::sync::Mutex;

    struct Fixture {
        bridge: Arc<RequestBridge>,
        _dir: tempfile::TempDir,
    }

    fn fixture<E: EventEmitter + 'static>(emitter: E, timeout: Duration) -> (Fixture, RequestRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = RequestRegistry::new();
        let files = TempFileStore::new(dir.path().join("store")).unwrap();
        let bridge = RequestBridge::new(
            registry.clone(),
            files,
            Arc::new(emitter),
            timeout,
            MetricsCollector::new(),
        );
        (
            Fixture {
                bridge: Arc::new(bridge),
                _dir: dir,
            },
            registry,
        )
    }

    /// Emisor que guarda el evento y responde en línea con `status`/`body`
    fn answering_emitter(
        registry: Arc<Mutex<Option<RequestRegistry>>>,
        seen: Arc<Mutex<Vec<EmittedEvent>>>,
    ) -> impl Fn(&str, RequestEvent) + Send + Sync {
        move |name: &str, payload: RequestEvent| {
            if let Some(registry) = registry.lock().unwrap().as_ref() {
                registry.fulfill(PendingResponse::text(
                    &payload.request_id,
                    StatusCode::OK,
                    "application/json",
                    &payload.to_json().unwrap(),
                ));
            }
            seen.lock().unwrap().push(EmittedEvent {
                name: name.to_string(),
                payload,
            });
        }
    }

    #[test]
    fn test_get_with_query_round_trip() {
        let slot = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (fx, registry) = fixture(answering_emitter(slot.clone(), seen.clone()), Duration::from_secs(5));
        *slot.lock().unwrap() = Some(registry.clone());

        let request = Request::parse(b"GET /foo?a=1&b=2 HTTP/1.0\r\n\r\n").unwrap();
        let response = fx.bridge.serve(&request);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, SERVER_EVENT_ID);

        let event = &seen[0].payload;
        assert_eq!(event.url, "/foo?a=1&b=2");
        assert_eq!(event.method, "GET");
        assert!(event.files.is_empty());
        assert_eq!(event.arguments.get("a").map(String::as_str), Some("1"));
        assert_eq!(event.arguments.get("b").map(String::as_str), Some("2"));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.header(REQUEST_ID_HEADER), Some(event.request_id.as_str()));
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_url_without_query() {
        let request = Request::parse(b"GET /plain HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(canonical_url(&request), "/plain");

        let request = Request::parse(b"GET /plain? HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(canonical_url(&request), "/plain");
    }

    #[test]
    fn test_multipart_upload_is_copied_to_store() {
        let uploaded: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();

        let mut body = Vec::new();
        body.extend_from_slice(b"--XyZ\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n");
        body.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        );
        body.extend_from_slice(&uploaded);
        body.extend_from_slice(b"\r\n--XyZ--\r\n");

        let mut raw = format!(
            "POST /upload HTTP/1.0\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(&body);
        let request = Request::parse(&raw).unwrap();

        let (tx, rx) = mpsc::channel();
        let slot: Arc<Mutex<Option<RequestRegistry>>> = Arc::new(Mutex::new(None));
        let emitter = {
            let slot = slot.clone();
            move |_: &str, payload: RequestEvent| {
                // El archivo debe existir mientras el handler lo procesa
                let path = payload.files.get("upload").cloned().unwrap();
                tx.send((payload.clone(), fs::read(&path).unwrap())).unwrap();
                let registry = slot.lock().unwrap().clone().unwrap();
                registry.fulfill(PendingResponse::text(&payload.request_id, StatusCode::NO_CONTENT, "text/plain", ""));
            }
        };
        let (fx, registry) = fixture(emitter, Duration::from_secs(5));
        *slot.lock().unwrap() = Some(registry);

        let response = fx.bridge.serve(&request);
        let (event, contents) = rx.recv().unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(contents, uploaded);
        assert_eq!(event.arguments.get("note").map(String::as_str), Some("hello"));
        assert!(event.files["upload"].starts_with(fx.bridge.files().dir().to_str().unwrap()));
        assert_eq!(fx.bridge.files().len(), 1);
    }

    #[test]
    fn test_each_upload_gets_a_fresh_path() {
        let (fx, _registry) = fixture(|_: &str, _: RequestEvent| {}, Duration::from_millis(10));

        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x\"\r\n\r\nsame\r\n--b--\r\n";
        let mut raw = format!(
            "POST / HTTP/1.0\r\nContent-Type: multipart/form-data; boundary=b\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);
        let request = Request::parse(&raw).unwrap();

        let first = fx.bridge.fill_request_event(&request, "1:1").unwrap();
        let second = fx.bridge.fill_request_event(&request, "1:2").unwrap();

        assert_ne!(first.files["f"], second.files["f"]);
        assert_eq!(fs::read(&first.files["f"]).unwrap(), b"same");
    }

    #[test]
    fn test_parse_error_short_circuits() {
        let emitted = Arc::new(Mutex::new(0));
        let counter = emitted.clone();
        let (fx, registry) = fixture(
            move |_: &str, _: RequestEvent| *counter.lock().unwrap() += 1,
            Duration::from_secs(5),
        );

        let raw = b"POST /x HTTP/1.0\r\nContent-Type: multipart/form-data\r\nContent-Length: 4\r\n\r\nabcd";
        let request = Request::parse(raw).unwrap();
        let response = fx.bridge.serve(&request);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        let body = response.into_body_bytes().unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "Multipart content type is missing a boundary");
        assert_eq!(*emitted.lock().unwrap(), 0);
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_timeout_returns_504() {
        let (fx, registry) = fixture(|_: &str, _: RequestEvent| {}, Duration::from_millis(50));

        let request = Request::parse(b"GET /slow HTTP/1.0\r\n\r\n").unwrap();
        let response = fx.bridge.serve(&request);

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(response.header(REQUEST_ID_HEADER).is_some());
        assert_eq!(registry.in_flight(), 0);
    }

    #[test]
    fn test_requests_refused_while_stopping() {
        let emitted = Arc::new(Mutex::new(0));
        let counter = emitted.clone();
        let (fx, _registry) = fixture(
            move |_: &str, _: RequestEvent| *counter.lock().unwrap() += 1,
            Duration::from_secs(5),
        );

        fx.bridge.begin_shutdown();
        let response = fx.bridge.serve(&Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap());

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(*emitted.lock().unwrap(), 0);
        assert!(fx.bridge.wait_idle(Duration::from_millis(100)));
    }

    #[test]
    fn test_shutdown_releases_blocked_waiter() {
        let (fx, _registry) = fixture(|_: &str, _: RequestEvent| {}, Duration::from_secs(30));

        let waiter = {
            let bridge = fx.bridge.clone();
            thread::spawn(move || bridge.serve(&Request::parse(b"GET /wait HTTP/1.0\r\n\r\n").unwrap()))
        };

        while fx.bridge.registry().in_flight() == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(fx.bridge.begin_shutdown(), 1);
        assert_eq!(fx.bridge.begin_shutdown(), 0);

        let response = waiter.join().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(fx.bridge.wait_idle(Duration::from_secs(1)));
    }
}
