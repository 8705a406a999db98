//! # Códigos de Estado HTTP
//!
//! El handler externo puede responder con cualquier código, así que
//! `StatusCode` es un wrapper sobre `u16` validado al rango 100..=599.
//! Las constantes cubren los códigos que el propio servidor genera.
//!
//! - **2xx**: Éxito (200 OK)
//! - **4xx**: Error del cliente (400, 404, 413)
//! - **5xx**: Error del servidor (500, 503, 504)

/// Código de estado HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 200 OK - La petición fue exitosa
    pub const OK: StatusCode = StatusCode(200);

    /// 204 No Content - Petición exitosa sin contenido en el body
    pub const NO_CONTENT: StatusCode = StatusCode(204);

    /// 400 Bad Request - Request HTTP malformado
    pub const BAD_REQUEST: StatusCode = StatusCode(400);

    /// 404 Not Found
    pub const NOT_FOUND: StatusCode = StatusCode(404);

    /// 413 Payload Too Large - Body mayor que `max_body_bytes`
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);

    /// 500 Internal Server Error - Error interno del servidor
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    /// 503 Service Unavailable - El servidor se está deteniendo
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// 504 Gateway Timeout - El handler externo no respondió a tiempo
    pub const GATEWAY_TIMEOUT: StatusCode = StatusCode(504);

    /// Construye un código desde su valor numérico
    ///
    /// Retorna `None` fuera de 100..=599.
    ///
    /// # Ejemplo
    /// ```
    /// use http_bridge::http::StatusCode;
    /// assert_eq!(StatusCode::from_u16(418).map(|s| s.as_u16()), Some(418));
    /// assert!(StatusCode::from_u16(42).is_none());
    /// ```
    pub fn from_u16(code: u16) -> Option<Self> {
        if (100..600).contains(&code) {
            Some(StatusCode(code))
        } else {
            None
        }
    }

    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use http_bridge::http::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Retorna el texto de razón (reason phrase) asociado al código
    ///
    /// Los códigos sin texto conocido usan el genérico de su clase.
    ///
    /// # Ejemplo
    /// ```
    /// use http_bridge::http::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            408 => "Request Timeout",
            409 => "Conflict",
            410 => "Gone",
            411 => "Length Required",
            413 => "Payload Too Large",
            415 => "Unsupported Media Type",
            416 => "Range Not Satisfiable",
            418 => "I'm a teapot",
            422 => "Unprocessable Entity",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            100..=199 => "Informational",
            200..=299 => "Success",
            300..=399 => "Redirection",
            400..=499 => "Client Error",
            _ => "Server Error",
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
