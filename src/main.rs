//! # HTTP Bridge - Entry Point
//! src/main.rs
//!
//! Levanta el bridge con un handler de eco: cada request se responde con
//! su propio payload en JSON. Sirve para probar el servidor sin un
//! handler real conectado.
//!
//! Ctrl-C detiene el servidor con `stop()`, así que los uploads del
//! directorio temporal se borran antes de salir.

use http_bridge::config::Config;
use http_bridge::{logging, ChannelEmitter, EmittedEvent, Server, ServerHandle};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

fn main() {
    let config = Config::new();
    logging::init(&config.log_level);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        std::process::exit(2);
    }
    config.log_summary();

    let (emitter, events) = ChannelEmitter::new();

    let server = match Server::new(config.clone(), Arc::new(emitter)) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Could not create server");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start(config.port) {
        error!(error = %e, "Could not start server");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    }) {
        error!(error = %e, "Could not install Ctrl-C handler");
        let _ = server.stop();
        std::process::exit(1);
    }

    info!("Echo handler ready; press Ctrl-C to stop");

    match serve_until(&server, events, shutdown_rx) {
        Ok(removed) => info!(removed_files = removed, "Bye"),
        Err(e) => {
            error!(error = %e, "Error while stopping server");
            std::process::exit(1);
        }
    }
}

/// Corre el handler de eco hasta que llega una señal por `shutdown`
///
/// Retorna lo que retorna `Server::stop`.
fn serve_until(
    server: &Server,
    events: Receiver<EmittedEvent>,
    shutdown: Receiver<()>,
) -> http_bridge::Result<usize> {
    let handle = server.handle();
    thread::Builder::new()
        .name("echo-handler".to_string())
        .spawn(move || echo_loop(events, handle))?;

    // Un sender cerrado también cuenta como pedido de shutdown
    let _ = shutdown.recv();
    info!("Shutdown requested");

    server.stop()
}

fn echo_loop(events: Receiver<EmittedEvent>, handle: ServerHandle) {
    for event in events {
        let request_id = event.payload.request_id.clone();
        let body = match event.payload.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Could not serialize event");
                continue;
            }
        };

        if let Err(e) = handle.respond(&request_id, 200, "application/json", &body) {
            warn!(request_id = %request_id, error = %e, "Echo response rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    #[test]
    fn test_shutdown_signal_stops_server_and_removes_uploads() {
        let tmp = tempfile::tempdir().unwrap();
        let upload_dir = tmp.path().join("uploads");
        let config = Config {
            temp_dir: Some(upload_dir.clone()),
            ..Config::default()
        };

        let (emitter, events) = ChannelEmitter::new();
        let server = Server::new(config, Arc::new(emitter)).unwrap();
        let addr = server.start(0).unwrap();

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let runner = thread::spawn(move || {
            let removed = serve_until(&server, events, shutdown_rx);
            (removed, server.is_running())
        });

        let body = b"raw upload";
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "PUT /blob HTTP/1.0\r\nContent-Length: {}\r\n\r\n", body.len()).unwrap();
        stream.write_all(body).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        assert!(response.starts_with("HTTP/1.0 200 OK"));
        assert!(response.contains("\"content\""));
        assert_eq!(fs::read_dir(&upload_dir).unwrap().count(), 1);

        shutdown_tx.send(()).unwrap();
        let (removed, running) = runner.join().unwrap();

        assert_eq!(removed.unwrap(), 1);
        assert!(!running);
        assert_eq!(fs::read_dir(&upload_dir).unwrap().count(), 0);
    }
}
