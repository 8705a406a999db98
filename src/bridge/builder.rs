//! # Construcción de Respuestas
//! src/bridge/builder.rs
//!
//! Convierte lo que responde el handler externo en un `Response` listo
//! para el listener: texto en memoria o un archivo abierto que se copia
//! al socket.

use crate::bridge::registry::{PendingResponse, ResponseBody};
use crate::error::BridgeError;
use crate::http::{Response, StatusCode};
use std::fs::File;
use std::path::Path;
use tracing::warn;

/// Body fijo cuando el archivo de una respuesta no se puede leer
pub const FILE_READ_FAILED: &str = "Reading file failed";

/// Construye las respuestas salientes
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Respuesta de longitud fija con body en memoria
    pub fn build_inline(status: StatusCode, content_type: &str, body: &str) -> Response {
        Response::new(status)
            .with_header("Content-Type", content_type)
            .with_body(body)
    }

    /// Respuesta cuyo body es el archivo en `path`
    ///
    /// El handle abierto pasa a ser del `Response`. Si el archivo no se
    /// puede abrir se responde 500 con `FILE_READ_FAILED`; la causa solo
    /// se registra en el log.
    pub fn build_file(status: StatusCode, content_type: &str, path: &Path) -> Response {
        match Self::open(path) {
            Ok((file, len)) => Response::new(status)
                .with_header("Content-Type", content_type)
                .with_file_body(file, len),
            Err(e) => {
                warn!(error = %e, "Exception while reading response file");
                Self::build_inline(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", FILE_READ_FAILED)
            }
        }
    }

    /// Construye la respuesta de un `PendingResponse`
    pub fn build(pending: PendingResponse) -> Response {
        match pending.body {
            ResponseBody::Text(text) => Self::build_inline(pending.status, &pending.content_type, &text),
            ResponseBody::File(path) => Self::build_file(pending.status, &pending.content_type, &path),
        }
    }

    fn open(path: &Path) -> Result<(File, u64), BridgeError> {
        let file_read = |source| BridgeError::FileRead {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(file_read)?;
        let metadata = file.metadata().map_err(file_read)?;

        if !metadata.is_file() {
            return Err(file_read(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        Ok((file, metadata.len()))
    }
}
