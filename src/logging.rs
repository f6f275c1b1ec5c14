//! # Logging
//! src/logging.rs
//!
//! Inicializa `tracing-subscriber` con un filtro por nivel. `RUST_LOG`, si
//! está definida, tiene prioridad sobre el nivel configurado.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Instala el subscriber global
///
/// Retorna `false` si ya había uno instalado (p. ej. en tests).
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true))
        .try_init()
        .is_ok()
}
