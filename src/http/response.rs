//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! API para construir respuestas HTTP/1.1 y convertirlas a bytes.
//!
//! ## Formato de una respuesta
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 13\r\n
//! Content-Type: application/json\r\n
//! Connection: close\r\n
//! \r\n
//! {"ok": true}
//! ```
//!
//! `Content-Length` se calcula siempre del body real al serializar y
//! `Connection: close` va en todas las respuestas: no hay keep-alive ni
//! chunked encoding.
//!
//! ## Ejemplo de uso
//!
//! ```
//! use rawhttp::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "application/json")
//!     .with_body(r#"{"message": "Hello"}"#);
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\nContent-Length: 20\r\n"));
//! ```

use super::StatusCode;
use serde::Serialize;
use std::io::{self, Write};

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Headers que arma el propio builder y no se pueden sobrescribir
const RESERVED_HEADERS: [&str; 2] = ["Content-Length", "Connection"];

/// Representa una respuesta HTTP/1.1 completa
#[derive(Debug, Clone)]
pub struct Response {
    /// Código de estado HTTP (200, 404, etc.)
    status: StatusCode,

    content_type: String,

    /// Headers extra, en orden de inserción
    headers: Vec<(String, String)>,

    /// Cuerpo de la respuesta (puede ser vacío)
    body: Vec<u8>,
}

impl Response {
    /// Crea una nueva respuesta con el código de estado especificado
    ///
    /// Sin body y con `Content-Type: text/plain; charset=utf-8`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Agrega un header a la respuesta
    ///
    /// Si el header ya existe, se sobrescribe. `Content-Type` reemplaza el
    /// tipo de contenido; `Content-Length` y `Connection` se ignoran.
    ///
    /// # Ejemplo
    /// ```
    /// use rawhttp::http::{Response, StatusCode};
    ///
    /// let response = Response::new(StatusCode::Ok)
    ///     .with_header("X-Request-Id", "abc123");
    /// assert_eq!(response.header("x-request-id"), Some("abc123"));
    /// ```
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Agrega un header a una respuesta existente (versión mutable)
    pub fn add_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("Content-Type") {
            self.content_type = value.to_string();
            return;
        }
        if RESERVED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            return;
        }

        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing_value)) => *existing_value = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// Establece el cuerpo de la respuesta desde un string
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.as_bytes().to_vec();
        self
    }

    /// Establece el cuerpo de la respuesta desde bytes
    ///
    /// Útil para respuestas binarias (imágenes, etc.)
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Respuesta de texto plano
    pub fn text(status: StatusCode, body: &str) -> Self {
        Self::new(status).with_body(body)
    }

    /// Respuesta JSON serializando `value`
    ///
    /// Si la serialización falla se responde 500.
    ///
    /// # Ejemplo
    /// ```
    /// use rawhttp::http::{Response, StatusCode};
    /// use serde_json::json;
    ///
    /// let response = Response::json(StatusCode::Ok, &json!({"status": "ok"}));
    /// assert_eq!(response.content_type(), "application/json");
    /// assert_eq!(response.body(), br#"{"status":"ok"}"#);
    /// ```
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .with_content_type("application/json")
                .with_body_bytes(body),
            Err(e) => Self::error(
                StatusCode::InternalServerError,
                &format!("failed to encode response: {}", e),
            ),
        }
    }

    /// Crea una respuesta de error con mensaje JSON
    ///
    /// Formato del JSON: `{"error": "mensaje"}`
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status)
            .with_content_type("application/json")
            .with_body(&body)
    }

    /// Convierte la respuesta a bytes listos para enviar por el socket
    ///
    /// - Status line: `HTTP/1.1 200 OK\r\n`
    /// - `Content-Length`, `Content-Type`, `Connection: close`
    /// - Headers extra
    /// - Línea vacía y body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: {}\r\nConnection: close\r\n",
            self.status,
            self.body.len(),
            self.content_type
        );

        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        let mut result = Vec::with_capacity(head.len() + self.body.len());
        result.extend_from_slice(head.as_bytes());
        result.extend_from_slice(&self.body);
        result
    }

    /// Obtiene el código de estado de la respuesta
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Headers extra (no incluye los que arma `to_bytes`)
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Obtiene una referencia al body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Handle de escritura sobre la conexión que se entrega a cada handler
///
/// Permite enviar una sola respuesta; la conexión la cierra después el
/// handler de la conexión.
pub struct ResponseWriter<'a> {
    stream: &'a mut dyn Write,
    sent: Option<StatusCode>,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(stream: &'a mut dyn Write) -> Self {
        Self { stream, sent: None }
    }

    /// Escribe la respuesta completa y hace flush
    ///
    /// Falla si ya se envió una respuesta por esta conexión.
    pub fn send(&mut self, response: &Response) -> io::Result<()> {
        if let Some(status) = self.sent {
            return Err(io::Error::other(format!(
                "response already sent ({})",
                status
            )));
        }

        self.stream.write_all(&response.to_bytes())?;
        self.stream.flush()?;
        self.sent = Some(response.status());
        Ok(())
    }

    pub fn is_sent(&self) -> bool {
        self.sent.is_some()
    }

    /// Status de la respuesta enviada, si hubo una
    pub fn sent_status(&self) -> Option<StatusCode> {
        self.sent
    }
}
