//! # Parsing de Requests HTTP
//! src/http/request.rs
//!
//! Parser HTTP/1.x mínimo: request line, headers y body con
//! `Content-Length`. El body se conserva como bytes para que los uploads
//! binarios lleguen intactos al parser de multipart.
//!
//! ## Formato de un Request
//!
//! ```text
//! POST /upload?album=2 HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! Content-Type: multipart/form-data; boundary=XyZ\r\n
//! Content-Length: 123\r\n
//! \r\n
//! <body>
//! ```
//!
//! ## Componentes
//!
//! 1. **Request Line**: `METHOD /path?query HTTP/1.x`
//! 2. **Headers**: Pares `Name: Value` (uno por línea)
//! 3. **Empty Line**: `\r\n` que separa headers del body
//! 4. **Body**: bytes arbitrarios

use crate::http::multipart::{self, MultipartError};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Campo de `ParsedBody::files` que recibe un body que no es formulario
pub const RAW_BODY_FIELD: &str = "content";

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
}

impl Method {
    /// Parsea un método HTTP desde un string
    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "PATCH" => Ok(Method::PATCH),
            "OPTIONS" => Ok(Method::OPTIONS),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::OPTIONS => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errores del request line y los headers
///
/// Estos errores se responden con 400 desde el listener; nunca llegan al
/// bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Incomplete HTTP request")]
    IncompleteRequest,

    #[error("Invalid request line format")]
    InvalidRequestLine,

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("Empty request")]
    EmptyRequest,
}

/// Representa un request HTTP parseado
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,

    /// Path decodificado (ej: "/my files/a.txt")
    path: String,

    /// Query string cruda, sin el '?' (ej: "a=1&b=2")
    query_string: Option<String>,

    /// Query parameters decodificados
    query_params: HashMap<String, String>,

    /// Headers con el nombre en minúsculas
    headers: HashMap<String, String>,

    version: String,

    body: Vec<u8>,
}

/// Resultado de parsear el body de un request
///
/// Los archivos de `files` son temporales de scratch: se borran cuando
/// `ParsedBody` se destruye, así que quien los necesite debe copiarlos.
#[derive(Debug, Default)]
pub struct ParsedBody {
    /// Campo del formulario → archivo temporal con los bytes subidos
    pub files: HashMap<String, NamedTempFile>,

    /// Query params + campos de formulario (el último valor gana)
    pub params: HashMap<String, String>,
}

impl Request {
    /// Parsea un request HTTP desde bytes
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use http_bridge::http::Request;
    ///
    /// let raw = b"GET /foo?a=1&b=2 HTTP/1.0\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/foo");
    /// assert_eq!(request.query_string(), Some("a=1&b=2"));
    /// assert_eq!(request.query_param("b"), Some("2"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        // Separar head y body sobre bytes: el body puede no ser UTF-8
        let (head, body) = match find_header_end(buffer) {
            Some(end) => (&buffer[..end - 4], &buffer[end..]),
            None => (buffer, &[][..]),
        };

        let head = std::str::from_utf8(head).map_err(|_| ParseError::InvalidRequestLine)?;

        if head.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::IncompleteRequest)?;

        let (method, path, query_string, version) = Self::parse_request_line(request_line)?;
        let headers = parse_headers(lines)?;

        let mut body = body.to_vec();
        if let Some(len) = content_length(&headers)? {
            body.truncate(len);
        }

        let query_params = query_string
            .as_deref()
            .map(parse_query_string)
            .unwrap_or_default();

        Ok(Request {
            method,
            path,
            query_string,
            query_params,
            headers,
            version,
            body,
        })
    }

    /// Formato: `GET /path?query HTTP/1.x`
    fn parse_request_line(line: &str) -> Result<(Method, String, Option<String>, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::from_str(parts[0])?;

        let (raw_path, query_string) = match parts[1].split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (parts[1], None),
        };

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((method, percent_decode(raw_path), query_string, version))
    }

    /// Parsea el body según su `Content-Type`
    ///
    /// - `multipart/form-data`: las partes con `filename` se vuelcan a
    ///   archivos temporales, el resto se agrega a `params`
    /// - `application/x-www-form-urlencoded`: los campos van a `params`
    /// - cualquier otro body no vacío (JSON, PUT binario, ...): se vuelca
    ///   entero a un archivo temporal bajo `files["content"]`
    pub fn parse_body(&self) -> Result<ParsedBody, MultipartError> {
        let mut parsed = ParsedBody {
            files: HashMap::new(),
            params: self.query_params.clone(),
        };

        let content_type = self.header("content-type").unwrap_or("");
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "multipart/form-data" => {
                let boundary = multipart::boundary_from_content_type(content_type)
                    .ok_or(MultipartError::MissingBoundary)?;

                for part in multipart::parse_parts(&self.body, &boundary)? {
                    match part.filename {
                        Some(_) => {
                            let mut scratch = NamedTempFile::new()?;
                            scratch.write_all(part.data)?;
                            scratch.flush()?;
                            parsed.files.insert(part.name, scratch);
                        }
                        None => {
                            let value = String::from_utf8_lossy(part.data).into_owned();
                            parsed.params.insert(part.name, value);
                        }
                    }
                }
            }
            "application/x-www-form-urlencoded" => {
                let form = String::from_utf8_lossy(&self.body);
                parsed.params.extend(parse_query_string(&form));
            }
            _ if !self.body.is_empty() => {
                let mut scratch = NamedTempFile::new()?;
                scratch.write_all(&self.body)?;
                scratch.flush()?;
                parsed.files.insert(RAW_BODY_FIELD.to_string(), scratch);
            }
            _ => {}
        }

        Ok(parsed)
    }

    // === Métodos públicos para acceder a los campos ===

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string cruda tal como llegó (sin el '?')
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Obtiene un query parameter específico
    ///
    /// # Ejemplo
    /// ```
    /// use http_bridge::http::Request;
    ///
    /// let raw = b"GET /test?num=42 HTTP/1.0\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.query_param("num"), Some("42"));
    /// assert_eq!(request.query_param("missing"), None);
    /// ```
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Obtiene un header (el nombre no distingue mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Cada header tiene formato: "Name: Value"
///
/// Los nombres quedan en minúsculas. Se detiene en la primera línea vacía.
pub(crate) fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<HashMap<String, String>, ParseError> {
    let mut headers = HashMap::new();

    for line in lines {
        if line.trim().is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;

        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(headers)
}

/// Headers de un head crudo (request line + headers, sin el body)
pub(crate) fn parse_head_headers(head: &[u8]) -> Result<HashMap<String, String>, ParseError> {
    let head = std::str::from_utf8(head).map_err(|_| ParseError::InvalidRequestLine)?;
    parse_headers(head.split("\r\n").skip(1))
}

/// Posición justo después de `\r\n\r\n`, si el head está completo
pub(crate) fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Lee `Content-Length` de un mapa de headers en minúsculas
pub(crate) fn content_length(headers: &HashMap<String, String>) -> Result<Option<usize>, ParseError> {
    match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ParseError::InvalidContentLength(value.clone())),
        None => Ok(None),
    }
}

/// Parsea una query string en un HashMap
///
/// Ejemplo: "num=10&text=hello%20world&debug"
/// Retorna: {"num": "10", "text": "hello world", "debug": ""}
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.split('&') {
        if param.is_empty() {
            continue;
        }

        // Si el nombre se repite, el último valor gana
        match param.split_once('=') {
            Some((key, value)) => {
                params.insert(form_decode(key), form_decode(value));
            }
            None => {
                params.insert(form_decode(param), String::new());
            }
        }
    }

    params
}

/// Decodifica un componente de formulario ('+' es espacio)
fn form_decode(s: &str) -> String {
    percent_decode(&s.replace('+', " "))
}

fn percent_decode(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}
