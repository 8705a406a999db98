//! # Parser de multipart/form-data
//! src/http/multipart.rs
//!
//! Divide un body `multipart/form-data` en sus partes. Trabaja sobre bytes
//! porque las partes con archivos pueden contener cualquier cosa.
//!
//! ```text
//! --BOUNDARY\r\n
//! Content-Disposition: form-data; name="photo"; filename="a.png"\r\n
//! Content-Type: image/png\r\n
//! \r\n
//! <bytes>\r\n
//! --BOUNDARY--\r\n
//! ```

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Errores al parsear un body multipart
#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("Multipart content type is missing a boundary")]
    MissingBoundary,

    #[error("Multipart body does not start with its boundary")]
    MissingOpeningBoundary,

    #[error("Multipart body is missing its closing boundary")]
    MissingClosingBoundary,

    #[error("Multipart part has malformed headers")]
    MalformedPartHeaders,

    #[error("Multipart part has no form field name")]
    MissingFieldName,

    #[error("Cannot buffer uploaded file: {0}")]
    Io(#[from] std::io::Error),
}

/// Una parte del formulario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part<'a> {
    /// Nombre del campo (`name=` de Content-Disposition)
    pub name: String,

    /// Nombre de archivo original; `Some` marca la parte como upload
    pub filename: Option<String>,

    pub content_type: Option<String>,

    pub data: &'a [u8],
}

fn boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)boundary=(?:"([^"]+)"|([^;\s]+))"#).expect("boundary regex is valid")
    })
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|;)\s*name=(?:"([^"]*)"|'([^']*)')"#).expect("name regex is valid")
    })
}

fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i);\s*filename=(?:"([^"]*)"|'([^']*)')"#).expect("filename regex is valid")
    })
}

/// Extrae el boundary de un header `Content-Type`
///
/// # Ejemplo
/// ```
/// use http_bridge::http::multipart::boundary_from_content_type;
///
/// let ct = "multipart/form-data; boundary=----abc123";
/// assert_eq!(boundary_from_content_type(ct).as_deref(), Some("----abc123"));
/// ```
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let caps = boundary_regex().captures(content_type)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Divide el body en partes
///
/// El orden de las partes se conserva, pero quien las consume las trata
/// como un mapa: ningún resultado depende del orden.
pub fn parse_parts<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<Part<'a>>, MultipartError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut separator = b"\r\n".to_vec();
    separator.extend_from_slice(&delimiter);

    let start = find(body, &delimiter, 0).ok_or(MultipartError::MissingOpeningBoundary)?;
    let mut cursor = start + delimiter.len();
    let mut parts = Vec::new();

    loop {
        let rest = &body[cursor..];

        // "--BOUNDARY--" cierra el body
        if rest.starts_with(b"--") {
            return Ok(parts);
        }
        if rest.starts_with(b"\r\n") {
            cursor += 2;
        }

        let end = find(body, &separator, cursor).ok_or(MultipartError::MissingClosingBoundary)?;
        parts.push(parse_part(&body[cursor..end])?);
        cursor = end + separator.len();
    }
}

/// Valor entre comillas dobles (grupo 1) o simples (grupo 2)
fn quoted_value(re: &Regex, disposition: &str) -> Option<String> {
    let caps = re.captures(disposition)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

fn parse_part(raw: &[u8]) -> Result<Part<'_>, MultipartError> {
    // Una parte sin headers empieza directamente con la línea vacía
    let (head, data) = if raw.starts_with(b"\r\n") {
        (&raw[..0], &raw[2..])
    } else {
        let pos = find(raw, b"\r\n\r\n", 0).ok_or(MultipartError::MalformedPartHeaders)?;
        (&raw[..pos], &raw[pos + 4..])
    };

    let head = std::str::from_utf8(head).map_err(|_| MultipartError::MalformedPartHeaders)?;

    let mut disposition = None;
    let mut content_type = None;

    for line in head.split("\r\n").filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or(MultipartError::MalformedPartHeaders)?;

        match name.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => disposition = Some(value.trim()),
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let disposition = disposition.ok_or(MultipartError::MissingFieldName)?;
    let name = quoted_value(name_regex(), disposition).ok_or(MultipartError::MissingFieldName)?;
    let filename = quoted_value(filename_regex(), disposition);

    Ok(Part {
        name,
        filename,
        content_type,
        data,
    })
}

/// Busca `needle` en `haystack` a partir de `from`
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
