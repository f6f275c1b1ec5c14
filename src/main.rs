//! # rawhttp - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor HTTP/1.1.
//!
//! Lee la configuración (CLI + entorno), instala el logging, registra la
//! aplicación de ejemplo y queda atendiendo conexiones.

use rawhttp::app::{self, BannerStore};
use rawhttp::config::Config;
use rawhttp::logging;
use rawhttp::router::Registry;
use rawhttp::server::Server;
use std::process;
use std::sync::Arc;
use tracing::error;

fn main() {
    let config = Config::new();
    logging::init(&config.log_level);

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuración inválida");
        process::exit(1);
    }

    config.print_summary();

    let registry = Arc::new(Registry::new());
    if let Err(e) = app::register(&registry, Arc::new(BannerStore::new())) {
        error!(error = %e, "No se pudieron registrar las rutas");
        process::exit(1);
    }

    let server = Server::new(config, registry);

    // Bloquea el thread principal mientras el listener esté vivo
    if let Err(e) = server.start() {
        error!(error = %e, "Error fatal");
        process::exit(1);
    }
}
