//! # rawhttp
//! src/lib.rs
//!
//! Servidor HTTP/1.1 mínimo implementado desde cero sobre TCP: parser de
//! requests propio, router por patrones con extracción de parámetros y un
//! registro de handlers seguro para uso concurrente.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: Parsing de requests, construcción de responses y status codes
//! - `router`: Patrones de ruta, registro de handlers y despacho
//! - `server`: Listener TCP y manejo de conexiones (un thread por conexión)
//! - `config`: Configuración desde CLI y variables de entorno
//! - `error`: Errores tipados de cada capa
//! - `logging`: Inicialización de `tracing`
//! - `app`: Aplicación de ejemplo (banners) que usa el registro
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use std::sync::Arc;
//! use rawhttp::config::Config;
//! use rawhttp::http::{Response, StatusCode};
//! use rawhttp::router::Registry;
//! use rawhttp::server::Server;
//!
//! let registry = Arc::new(Registry::new());
//! registry
//!     .register("/hello/{name}", |req, w| {
//!         let name = req.path_param("name").unwrap_or_default();
//!         w.send(&Response::text(StatusCode::Ok, &format!("hola {}", name)))
//!     })
//!     .unwrap();
//!
//! let server = Server::new(Config::default(), registry);
//! server.start().expect("Error al iniciar servidor");
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod router;
pub mod server;
