//! # Errores del Bridge
//! src/error.rs
//!
//! Taxonomía de errores del servidor. Ninguno de estos errores llega al
//! cliente HTTP como tal: el bridge los traduce a respuestas 4xx/5xx con
//! un body de texto plano.

use crate::http::multipart::MultipartError;
use std::path::PathBuf;
use thiserror::Error;

/// Errores del bridge HTTP ↔ handler externo
#[derive(Debug, Error)]
pub enum BridgeError {
    /// El body del request no se pudo parsear (multipart malformado, etc.)
    ///
    /// El mensaje se envía tal cual como body del 500.
    #[error(transparent)]
    RequestParse(#[from] MultipartError),

    /// El archivo de una respuesta no se pudo abrir o leer
    #[error("cannot read response file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// El handler externo no respondió a tiempo
    #[error("request {request_id} timed out after {timeout_ms} ms")]
    Timeout { request_id: String, timeout_ms: u64 },

    /// Código de estado fuera de 100..=599
    #[error("invalid HTTP status code: {0}")]
    InvalidStatus(u16),

    /// `start()` sobre un servidor que ya está escuchando
    #[error("server is already running")]
    AlreadyRunning,

    /// `start()` después de `stop()`: un servidor no se reutiliza
    #[error("server has been stopped")]
    Stopped,

    /// Configuración inválida
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
