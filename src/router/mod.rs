//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Mapea paths concretos a handlers registrados por patrón.
//!
//! ## Arquitectura
//!
//! ```text
//! Request → Router → Registry (patrones ordenados) → Handler → ResponseWriter
//! ```
//!
//! De todos los patrones que coinciden gana el más específico: menos
//! segmentos de captura, y a igualdad, el menor en orden lexicográfico.
//! Si ninguno coincide, el router devuelve [`RouteError::NoMatch`] y la
//! conexión responde 404.

pub mod pattern;
pub mod registry;

pub use pattern::{RoutePattern, Segment};
pub use registry::Registry;

use crate::error::{ConnectionError, RouteError};
use crate::http::{Request, ResponseWriter};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Tipo de función handler
///
/// Un handler recibe el Request parseado y escribe su respuesta por el
/// `ResponseWriter` de la conexión.
pub type Handler =
    Arc<dyn Fn(&Request, &mut ResponseWriter<'_>) -> io::Result<()> + Send + Sync>;

/// Resultado de un matching exitoso
#[derive(Clone)]
pub struct RouteMatch {
    /// Texto del patrón elegido
    pub pattern: String,

    /// Parámetros ligados por las capturas
    pub params: HashMap<String, String>,

    pub handler: Handler,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Router sobre un [`Registry`] compartido
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Encuentra la ruta para un path
    ///
    /// # Ejemplo
    /// ```
    /// use std::sync::Arc;
    /// use rawhttp::router::{Registry, Router};
    /// use rawhttp::http::{Response, StatusCode};
    ///
    /// let registry = Arc::new(Registry::new());
    /// registry.register("/users", |_, w| w.send(&Response::new(StatusCode::Ok))).unwrap();
    /// registry.register("/{id}", |_, w| w.send(&Response::new(StatusCode::Ok))).unwrap();
    ///
    /// let router = Router::new(registry);
    /// assert_eq!(router.route("/users").unwrap().pattern, "/users");
    /// assert!(router.route("/a/b").is_err());
    /// ```
    pub fn route(&self, path: &str) -> Result<RouteMatch, RouteError> {
        self.registry
            .lookup(path)
            .ok_or_else(|| RouteError::NoMatch(path.to_string()))
    }

    /// Enruta el request y ejecuta su handler
    ///
    /// Instala los parámetros de path en el request antes de llamar al
    /// handler. Un error del handler se devuelve como
    /// [`ConnectionError::Handler`].
    pub fn dispatch(
        &self,
        request: &mut Request,
        writer: &mut ResponseWriter<'_>,
    ) -> Result<String, ConnectionError> {
        let RouteMatch {
            pattern,
            params,
            handler,
        } = self.route(request.path())?;

        request.set_path_params(params);
        handler(request, writer).map_err(ConnectionError::Handler)?;

        Ok(pattern)
    }
}
