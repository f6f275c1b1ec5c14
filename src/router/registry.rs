//! # Registro de Handlers
//! src/router/registry.rs
//!
//! Mapa compartido patrón → handler. Es el único estado mutable que
//! comparten los threads de conexión.
//!
//! - `register` toma el lock de escritura: excluye a lectores y escritores
//! - `lookup` toma el lock de lectura: varios matchings corren en paralelo
//!
//! Las rutas se guardan ordenadas por especificidad (ver
//! [`RoutePattern`]), así que el primer patrón que coincide es el elegido.
//! El costo de un lookup es O(rutas × segmentos); no hay índice porque la
//! cantidad de rutas de una aplicación de este tamaño es chica.

use super::pattern::RoutePattern;
use super::{Handler, RouteMatch};
use crate::error::PatternError;
use crate::http::{Request, ResponseWriter};
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use tracing::debug;

struct Route {
    pattern: RoutePattern,
    handler: Handler,
}

/// Registro thread-safe de rutas
pub struct Registry {
    routes: RwLock<Vec<Route>>,
}

impl Registry {
    /// Crea un registro vacío
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Registra (o reemplaza) el handler de un patrón
    ///
    /// Se puede llamar mientras el servidor atiende conexiones.
    ///
    /// # Ejemplo
    /// ```
    /// use rawhttp::router::Registry;
    /// use rawhttp::http::{Response, StatusCode};
    ///
    /// let registry = Registry::new();
    /// registry
    ///     .register("/payments/{id}", |req, w| {
    ///         let id = req.path_param("id").unwrap_or_default();
    ///         w.send(&Response::text(StatusCode::Ok, id))
    ///     })
    ///     .unwrap();
    /// assert_eq!(registry.len(), 1);
    /// ```
    pub fn register<F>(&self, pattern: &str, handler: F) -> Result<(), PatternError>
    where
        F: Fn(&Request, &mut ResponseWriter<'_>) -> io::Result<()> + Send + Sync + 'static,
    {
        let pattern = RoutePattern::parse(pattern)?;
        let handler: Handler = Arc::new(handler);

        let mut routes = self.routes.write();
        match routes.binary_search_by(|route| route.pattern.cmp(&pattern)) {
            Ok(pos) => {
                debug!(pattern = %pattern, "Reemplazando handler");
                routes[pos].handler = handler;
            }
            Err(pos) => {
                debug!(pattern = %pattern, "Registrando ruta");
                routes.insert(pos, Route { pattern, handler });
            }
        }

        Ok(())
    }

    /// Busca la ruta más específica para `path`
    ///
    /// El handler se clona fuera del lock: el lock de lectura se libera
    /// antes de que corra el handler.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch> {
        let parts: Vec<&str> = path.split('/').collect();
        let routes = self.routes.read();

        routes.iter().find_map(|route| {
            route
                .pattern
                .match_segments(&parts)
                .map(|params| RouteMatch {
                    pattern: route.pattern.as_str().to_string(),
                    params,
                    handler: Arc::clone(&route.handler),
                })
        })
    }

    /// Cantidad de rutas registradas
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Patrones registrados, en orden de selección
    pub fn patterns(&self) -> Vec<String> {
        self.routes
            .read()
            .iter()
            .map(|route| route.pattern.as_str().to_string())
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
