//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del bridge HTTP con soporte para argumentos CLI y
//! variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./http_bridge --port 8080 \
//!   --temp-dir /var/tmp/bridge \
//!   --response-timeout-ms 15000
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 HTTP_HOST=0.0.0.0 RESPONSE_TIMEOUT_MS=5000 ./http_bridge
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Nombre del subdirectorio por defecto dentro del temp dir del sistema
const DEFAULT_TEMP_SUBDIR: &str = "http_bridge";

/// Configuración del bridge HTTP
#[derive(Debug, Clone, Parser)]
#[command(name = "http_bridge")]
#[command(about = "Servidor HTTP embebido que delega cada request a un handler externo")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor (0 = efímero)
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    /// Directorio de los archivos subidos (por defecto `$TMPDIR/http_bridge`)
    #[arg(long = "temp-dir", env = "BRIDGE_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    // === Timeouts ===

    /// Tiempo máximo esperando la respuesta del handler, en milisegundos
    #[arg(long = "response-timeout-ms", default_value = "30000", env = "RESPONSE_TIMEOUT_MS")]
    pub response_timeout_ms: u64,

    /// Timeout de lectura del socket por conexión, en milisegundos
    #[arg(long = "read-timeout-ms", default_value = "10000", env = "READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    /// Tiempo que `stop()` espera a que terminen los requests en curso
    #[arg(long = "shutdown-grace-ms", default_value = "5000", env = "SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: u64,

    // === Límites ===

    /// Tamaño máximo del body de un request (413 si se excede)
    #[arg(long = "max-body-bytes", default_value = "67108864", env = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // === Logging ===

    /// Nivel de log por defecto (RUST_LOG tiene prioridad)
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Dirección completa para bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Directorio efectivo del `TempFileStore`
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_TEMP_SUBDIR))
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host must not be empty".to_string());
        }

        // Validar timeouts
        if self.response_timeout_ms == 0 {
            return Err("Response timeout must be > 0".to_string());
        }
        if self.read_timeout_ms == 0 {
            return Err("Read timeout must be > 0".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("Max body bytes must be >= 1".to_string());
        }

        Ok(())
    }

    /// Registra un resumen de la configuración
    pub fn log_summary(&self) {
        info!(
            address = %self.address(),
            temp_dir = %self.temp_dir().display(),
            response_timeout_ms = self.response_timeout_ms,
            read_timeout_ms = self.read_timeout_ms,
            shutdown_grace_ms = self.shutdown_grace_ms,
            max_body_bytes = self.max_body_bytes,
            "Configuration loaded"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            temp_dir: None,
            response_timeout_ms: 30_000,
            read_timeout_ms: 10_000,
            shutdown_grace_ms: 5_000,
            max_body_bytes: 64 * 1024 * 1024,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_address_custom() {
        let mut config = Config::default();
        config.host = "0.0.0.0".to_string();
        config.port = 3000;
        assert_eq!(config.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_temp_dir_default_and_override() {
        let mut config = Config::default();
        assert_eq!(config.temp_dir(), std::env::temp_dir().join("http_bridge"));

        config.temp_dir = Some(PathBuf::from("/srv/uploads"));
        assert_eq!(config.temp_dir(), PathBuf::from("/srv/uploads"));
    }

    #[test]
    fn test_validate_success() {
        assert!(Config::default().validate().is_ok());
    }

    // ==================== Validation ====================

    #[test]
    fn test_validate_invalid_response_timeout() {
        let mut config = Config::default();
        config.response_timeout_ms = 0;
        let result = config.validate();
        assert!(result.unwrap_err().contains("Response timeout"));
    }

    #[test]
    fn test_validate_invalid_read_timeout() {
        let mut config = Config::default();
        config.read_timeout_ms = 0;
        assert!(config.validate().unwrap_err().contains("Read timeout"));
    }

    #[test]
    fn test_validate_invalid_body_limit() {
        let mut config = Config::default();
        config.max_body_bytes = 0;
        assert!(config.validate().unwrap_err().contains("Max body"));
    }

    #[test]
    fn test_validate_empty_host() {
        let mut config = Config::default();
        config.host = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_grace_is_valid() {
        let mut config = Config::default();
        config.shutdown_grace_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_from_args() {
        let config = Config::parse_from([
            "http_bridge",
            "--port",
            "0",
            "--temp-dir",
            "/tmp/x",
            "--response-timeout-ms",
            "250",
        ]);

        assert_eq!(config.port, 0);
        assert_eq!(config.temp_dir(), PathBuf::from("/tmp/x"));
        assert_eq!(config.response_timeout(), Duration::from_millis(250));
    }
}
