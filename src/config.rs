//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor con soporte para argumentos CLI y variables
//! de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./rawhttp --port 9999 \
//!   --read-timeout-ms 5000 \
//!   --max-body-bytes 1048576
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 HTTP_HOST=127.0.0.1 LOG_LEVEL=debug ./rawhttp
//! ```

use crate::error::ConfigError;
use crate::http::ParseLimits;
use crate::server::ConnectionSettings;
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configuración del servidor HTTP/1.1
#[derive(Debug, Clone, Parser)]
#[command(name = "rawhttp")]
#[command(about = "Servidor HTTP/1.1 minimo sobre TCP con router de patrones")]
#[command(version)]
pub struct Config {
    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "9999", env = "HTTP_PORT")]
    pub port: u16,

    // === Timeouts ===
    /// Tiempo máximo esperando bytes del cliente, en milisegundos
    #[arg(long = "read-timeout-ms", default_value = "5000", env = "READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    /// Tiempo máximo escribiendo la respuesta, en milisegundos
    #[arg(long = "write-timeout-ms", default_value = "5000", env = "WRITE_TIMEOUT_MS")]
    pub write_timeout_ms: u64,

    /// Tiempo total para recibir el request completo, en milisegundos
    #[arg(long = "request-timeout-ms", default_value = "10000", env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    // === Límites del parser ===
    /// Máximo de bytes para request line + headers
    #[arg(long = "max-head-bytes", default_value = "8192", env = "MAX_HEAD_BYTES")]
    pub max_head_bytes: usize,

    /// Máximo `Content-Length` aceptado
    #[arg(long = "max-body-bytes", default_value = "10485760", env = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // === Logging ===
    /// Nivel o filtro de logs (`info`, `rawhttp=debug`, ...). RUST_LOG tiene prioridad
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use rawhttp::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:9999");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("read timeout"));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("write timeout"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("request timeout"));
        }
        if self.max_head_bytes == 0 {
            return Err(ConfigError::ZeroValue("max head bytes"));
        }
        if EnvFilter::try_new(&self.log_level).is_err() {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn limits(&self) -> ParseLimits {
        ParseLimits {
            max_head_bytes: self.max_head_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// Parámetros que usa cada thread de conexión
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            read_timeout: self.read_timeout(),
            write_timeout: self.write_timeout(),
            request_timeout: self.request_timeout(),
            limits: self.limits(),
        }
    }

    /// Loguea un resumen de la configuración
    pub fn print_summary(&self) {
        info!(
            address = %self.address(),
            read_timeout_ms = self.read_timeout_ms,
            write_timeout_ms = self.write_timeout_ms,
            request_timeout_ms = self.request_timeout_ms,
            max_head_bytes = self.max_head_bytes,
            max_body_bytes = self.max_body_bytes,
            log_level = %self.log_level,
            "Configuración cargada"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        let limits = ParseLimits::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            max_head_bytes: limits.max_head_bytes,
            max_body_bytes: limits.max_body_bytes,
            log_level: "info".to_string(),
        }
    }
}
