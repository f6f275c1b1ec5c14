//! # Errores del servidor
//! src/error.rs
//!
//! Taxonomía de errores del núcleo:
//!
//! - [`ParseError`]: el request recibido no es HTTP/1.1 válido
//! - [`RouteError`]: ningún patrón registrado coincide con el path
//! - [`IoError`]: fallos de lectura, escritura, accept o bind
//! - [`PatternError`]: un patrón de ruta mal formado al registrarlo
//! - [`ConfigError`]: configuración inválida
//!
//! Los errores de parsing y routing se resuelven dentro del handler de la
//! conexión (respuesta explícita y cierre). El único error fatal es
//! [`IoError::BindFailed`].

use crate::http::StatusCode;
use std::io;
use thiserror::Error;

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Request line ausente, sin `\r\n`, con un número de tokens distinto
    /// de tres, o con un request-target que no se puede decodificar
    #[error("Invalid request line")]
    BadRequestLine,

    /// Versión distinta de `HTTP/1.1`
    #[error("Unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    /// Línea de header sin `:` (o bloque de headers sin terminar)
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// La conexión se cerró antes de recibir `Content-Length` bytes
    #[error("Truncated body: expected {expected} bytes, received {received}")]
    TruncatedBody { expected: usize, received: usize },

    /// Request line + headers superan el límite configurado
    #[error("Request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    /// `Content-Length` declarado mayor al límite configurado
    #[error("Declared body of {declared} bytes exceeds limit of {limit}")]
    BodyTooLarge { declared: usize, limit: usize },

    /// `Transfer-Encoding` no está soportado (no hay chunked)
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),
}

impl ParseError {
    /// Código de estado con el que se responde a este error
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::BadRequestLine
            | ParseError::MalformedHeader(_)
            | ParseError::TruncatedBody { .. } => StatusCode::BadRequest,
            ParseError::UnsupportedVersion(_) => StatusCode::HttpVersionNotSupported,
            ParseError::HeadTooLarge { .. } => StatusCode::RequestHeaderFieldsTooLarge,
            ParseError::BodyTooLarge { .. } => StatusCode::PayloadTooLarge,
            ParseError::UnsupportedTransferEncoding(_) => StatusCode::NotImplemented,
        }
    }
}

/// Errores de routing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Ningún patrón registrado coincide con el path
    #[error("Route not found: {0}")]
    NoMatch(String),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::NoMatch(_) => StatusCode::NotFound,
        }
    }
}

/// Errores de entrada/salida sobre sockets
#[derive(Debug, Error)]
pub enum IoError {
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// No se pudo abrir el puerto de escucha (fatal)
    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },
}

impl IoError {
    /// `true` si la lectura falló por el timeout del socket
    pub fn is_timeout(&self) -> bool {
        match self {
            IoError::ReadFailed(e) | IoError::WriteFailed(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Patrón de ruta mal formado
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("unclosed '{{' in segment: {0}")]
    UnclosedCapture(String),

    #[error("capture must end its segment: {0}")]
    TrailingText(String),

    #[error("empty capture name in segment: {0}")]
    EmptyName(String),

    #[error("duplicate capture name: {0}")]
    DuplicateName(String),
}

/// Configuración inválida
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be > 0")]
    ZeroValue(&'static str),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Todo lo que puede terminar una conexión antes de tiempo
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Io(#[from] IoError),

    /// El handler registrado devolvió un error
    #[error("handler failed: {0}")]
    Handler(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_status() {
        assert_eq!(ParseError::BadRequestLine.status(), StatusCode::BadRequest);
        assert_eq!(
            ParseError::MalformedHeader("x".into()).status(),
            StatusCode::BadRequest
        );
        assert_eq!(
            ParseError::UnsupportedVersion("HTTP/1.0".into()).status(),
            StatusCode::HttpVersionNotSupported
        );
        assert_eq!(
            ParseError::BodyTooLarge { declared: 10, limit: 1 }.status(),
            StatusCode::PayloadTooLarge
        );
    }

    #[test]
    fn test_route_error_status() {
        assert_eq!(
            RouteError::NoMatch("/x".into()).status(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ParseError::TruncatedBody { expected: 10, received: 3 }.to_string(),
            "Truncated body: expected 10 bytes, received 3"
        );
        assert_eq!(
            RouteError::NoMatch("/unknown".into()).to_string(),
            "Route not found: /unknown"
        );
        assert_eq!(
            PatternError::UnclosedCapture("{id".into()).to_string(),
            "unclosed '{' in segment: {id"
        );
    }

    #[test]
    fn test_io_error_timeout() {
        let err = IoError::ReadFailed(io::Error::new(io::ErrorKind::WouldBlock, "t"));
        assert!(err.is_timeout());
        let err = IoError::ReadFailed(io::Error::new(io::ErrorKind::ConnectionReset, "r"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_connection_error_from() {
        let err: ConnectionError = ParseError::BadRequestLine.into();
        assert!(matches!(err, ConnectionError::Parse(ParseError::BadRequestLine)));
    }
}
