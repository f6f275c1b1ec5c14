//! # Módulo HTTP
//!
//! Este módulo implementa el protocolo HTTP/1.1 desde cero, sin usar
//! librerías de alto nivel. Incluye:
//!
//! - Parsing de requests (request line, headers, body con `Content-Length`)
//! - Construcción de responses
//! - Manejo de status codes
//!
//! ## Alcance
//!
//! Solo el subconjunto de HTTP/1.1 que necesita un servidor de una
//! petición por conexión:
//! - Sin keep-alive: toda respuesta lleva `Connection: close`
//! - Sin chunked transfer encoding
//! - Solo se acepta la versión `HTTP/1.1`
//!
//! ### Formato de Request
//!
//! ```text
//! GET /path?query=value HTTP/1.1\r\n
//! Header-Name: Header-Value\r\n
//! \r\n
//! ```

pub mod request;
pub mod response;
pub mod status;

pub use request::{Method, ParseLimits, Request};
pub use response::{Response, ResponseWriter};
pub use status::StatusCode;
