//! # Respuestas HTTP
//!
//! `Response` es lo que el listener transmite: status, headers y un body
//! que puede estar en memoria o ser un archivo abierto que se copia al
//! socket al escribir.
//!
//! ## Formato de una respuesta HTTP/1.0
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! Content-Type: text/plain\r\n
//! Content-Length: 2\r\n
//! X-Request-Id: 1700000000000:42\r\n
//! \r\n
//! ok
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use http_bridge::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::OK)
//!     .with_header("Content-Type", "text/plain")
//!     .with_body("ok");
//!
//! let mut out = Vec::new();
//! response.write_to(&mut out, true).unwrap();
//! assert!(out.ends_with(b"\r\n\r\nok"));
//! ```

use super::StatusCode;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};

/// Body de una respuesta
#[derive(Debug)]
pub enum Body {
    /// Bytes en memoria
    Bytes(Vec<u8>),

    /// Archivo abierto; la respuesta es dueña del handle hasta escribirse
    File { file: File, len: u64 },
}

impl Body {
    /// Longitud exacta que se anuncia en `Content-Length`
    pub fn len(&self) -> u64 {
        match self {
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Representa una respuesta HTTP completa
#[derive(Debug)]
pub struct Response {
    status: StatusCode,

    /// Headers HTTP; `Content-Length` se mantiene en sincronía con el body
    headers: HashMap<String, String>,

    body: Body,
}

impl Response {
    /// Crea una respuesta sin headers y con body vacío
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Body::Bytes(Vec::new()),
        }
    }

    /// Agrega un header (si ya existe, se sobrescribe)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Versión mutable de `with_header`
    ///
    /// Se descartan `\r` y `\n`: un valor que viene del handler externo no
    /// puede partir el head en dos.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(strip_line_breaks(name), strip_line_breaks(value));
    }

    /// Establece el body desde un string
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece el body desde bytes
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = Body::Bytes(body);
        self.sync_content_length();
        self
    }

    /// Establece un archivo abierto como body
    ///
    /// `len` es la cantidad de bytes que se enviarán desde la posición
    /// actual del archivo.
    pub fn with_file_body(mut self, file: File, len: u64) -> Self {
        self.body = Body::File { file, len };
        self.sync_content_length();
        self
    }

    /// Respuesta de texto plano
    ///
    /// # Ejemplo
    /// ```
    /// use http_bridge::http::{Response, StatusCode};
    ///
    /// let response = Response::text(StatusCode::INTERNAL_SERVER_ERROR, "Reading file failed");
    /// assert_eq!(response.header("Content-Type"), Some("text/plain"));
    /// ```
    pub fn text(status: StatusCode, message: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain")
            .with_body(message)
    }

    fn sync_content_length(&mut self) {
        let len = self.body.len().to_string();
        self.headers.insert("Content-Length".to_string(), len);
    }

    /// Status line + headers + línea vacía
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut result = format!("HTTP/1.0 {}\r\n", self.status).into_bytes();

        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        result.extend_from_slice(b"\r\n");
        result
    }

    /// Escribe la respuesta completa en `out`
    ///
    /// Con `include_body = false` (HEAD) solo se envían status y headers.
    /// Un archivo que se acorta mientras se envía produce
    /// `UnexpectedEof`: el cliente ya recibió un `Content-Length` que no se
    /// puede cumplir.
    pub fn write_to<W: Write>(self, out: &mut W, include_body: bool) -> io::Result<()> {
        out.write_all(&self.head_bytes())?;

        if include_body {
            match self.body {
                Body::Bytes(bytes) => out.write_all(&bytes)?,
                Body::File { file, len } => {
                    let copied = io::copy(&mut file.take(len), out)?;
                    if copied < len {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("file body ended after {} of {} bytes", copied, len),
                        ));
                    }
                }
            }
        }

        out.flush()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Obtiene un header (el nombre no distingue mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Longitud del body, igual al `Content-Length` anunciado
    pub fn content_length(&self) -> u64 {
        self.body.len()
    }

    /// Lee el body completo a memoria (consume la respuesta)
    pub fn into_body_bytes(self) -> io::Result<Vec<u8>> {
        match self.body {
            Body::Bytes(bytes) => Ok(bytes),
            Body::File { file, len } => {
                let mut buf = Vec::with_capacity(len as usize);
                file.take(len).read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

fn strip_line_breaks(s: &str) -> String {
    s.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    #[test]
    fn test_new_response() {
        let response = Response::new(StatusCode::OK);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().is_empty());
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_with_body_sets_content_length() {
        let response = Response::new(StatusCode::OK).with_body("Hello World");

        assert_eq!(response.header("content-length"), Some("11"));
        assert_eq!(response.content_length(), 11);
    }

    #[test]
    fn test_text_response() {
        let response = Response::text(StatusCode::BAD_REQUEST, "Invalid input");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.into_body_bytes().unwrap(), b"Invalid input");
    }

    #[test]
    fn test_write_to() {
        let response = Response::new(StatusCode::OK)
            .with_header("Content-Type", "text/plain")
            .with_body("Test");

        let mut out = Vec::new();
        response.write_to(&mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\nTest"));
    }

    #[test]
    fn test_write_without_body_for_head() {
        let response = Response::new(StatusCode::OK).with_body("Test");

        let mut out = Vec::new();
        response.write_to(&mut out, false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_file_body_streams_contents() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"\x00streamed\xFF").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let response = Response::new(StatusCode::OK).with_file_body(file, 10);
        assert_eq!(response.header("Content-Length"), Some("10"));

        let mut out = Vec::new();
        response.write_to(&mut out, true).unwrap();
        assert!(out.ends_with(b"\r\n\r\n\x00streamed\xFF"));
    }

    #[test]
    fn test_file_body_shorter_than_announced() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"abc").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let response = Response::new(StatusCode::OK).with_file_body(file, 10);
        let err = response.write_to(&mut Vec::new(), true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_header_values_cannot_split_head() {
        let response = Response::new(StatusCode::OK)
            .with_header("Content-Type", "text/plain\r\nX-Injected: 1")
            .with_body("ok");

        assert_eq!(response.header("Content-Type"), Some("text/plainX-Injected: 1"));

        let mut out = Vec::new();
        response.write_to(&mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("\r\nX-Injected"));
    }
}
