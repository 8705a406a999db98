//! # Módulo HTTP
//!
//! La parte "proveída" del servidor: lo mínimo de HTTP/1.x que necesita
//! el bridge para recibir requests ya parseados y devolver respuestas.
//!
//! - Parsing de requests (request line, headers, body con Content-Length)
//! - Parsing de bodies `multipart/form-data` y `x-www-form-urlencoded`
//! - Construcción de responses con body en memoria o desde archivo
//! - Códigos de estado

pub mod multipart;
pub mod request;
pub mod response;
pub mod status;

pub use request::{Method, ParsedBody, Request};
pub use response::{Body, Response};
pub use status::StatusCode;
