//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Implementación del listener que acepta conexiones y lanza un thread por
//! cada una. Los threads solo comparten el [`Router`] (y por él, el
//! [`Registry`]); cada socket pertenece en exclusiva a su thread.

use super::connection::{handle_connection, ConnectionSettings};
use crate::config::Config;
use crate::error::IoError;
use crate::router::{Registry, Router};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Pausa tras un accept fallido, para no girar en falso (ej: EMFILE)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Servidor HTTP/1.1 concurrente
pub struct Server {
    config: Config,
    router: Router,
}

impl Server {
    /// Crea un servidor sobre un registro ya construido
    ///
    /// El registro puede seguir recibiendo rutas mientras el servidor corre.
    pub fn new(config: Config, registry: Arc<Registry>) -> Self {
        Self {
            config,
            router: Router::new(registry),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Abre el puerto de escucha sin empezar a aceptar
    pub fn bind(&self) -> Result<Listener, IoError> {
        let address = self.config.address();
        info!(address = %address, "Iniciando servidor");

        let inner = TcpListener::bind(&address).map_err(|source| IoError::BindFailed {
            address: address.clone(),
            source,
        })?;

        if let Ok(local) = inner.local_addr() {
            info!(address = %local, "Servidor escuchando (un thread por conexión)");
        }

        Ok(Listener {
            inner,
            router: self.router.clone(),
            settings: self.config.connection_settings(),
        })
    }

    /// Abre el puerto y atiende conexiones indefinidamente
    ///
    /// Solo retorna si el bind falla.
    pub fn start(&self) -> Result<(), IoError> {
        self.bind()?.serve();
        Ok(())
    }
}

/// Puerto abierto, listo para aceptar conexiones
pub struct Listener {
    inner: TcpListener,
    router: Router,
    settings: ConnectionSettings,
}

impl Listener {
    /// Dirección real del listener (útil con puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Loop de accept: un thread por conexión
    ///
    /// Los errores de accept se loguean y el loop sigue.
    pub fn serve(self) {
        let mut next_id: u64 = 0;

        for stream in self.inner.incoming() {
            match stream {
                Ok(stream) => {
                    next_id += 1;
                    let id = next_id;
                    let router = self.router.clone();
                    let settings = self.settings;

                    let spawned = thread::Builder::new()
                        .name(format!("conn-{}", id))
                        .spawn(move || handle_connection(stream, id, &router, &settings));

                    if let Err(e) = spawned {
                        error!(id, error = %e, "No se pudo lanzar el thread de la conexión");
                    }
                }
                Err(e) => {
                    let err = IoError::AcceptFailed(e);
                    warn!(error = %err, "Error al aceptar conexión");
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Response, StatusCode};
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpStream};

    fn local_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Config::default()
        }
    }

    fn spawn_server(registry: Arc<Registry>) -> SocketAddr {
        let server = Server::new(local_config(), registry);
        let listener = server.bind().unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || listener.serve());
        addr
    }

    fn send(addr: SocketAddr, raw: &[u8]) -> String {
        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.write_all(raw).unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = Config {
            port,
            ..local_config()
        };
        let server = Server::new(config, Arc::new(Registry::new()));

        let err = server.start().unwrap_err();
        assert!(matches!(err, IoError::BindFailed { .. }));
    }

    #[test]
    fn test_serves_registered_route() {
        let registry = Arc::new(Registry::new());
        registry
            .register("/hello/{name}", |req, w| {
                let name = req.path_param("name").unwrap_or_default();
                w.send(&Response::text(StatusCode::Ok, &format!("hola {}", name)))
            })
            .unwrap();

        let addr = spawn_server(registry);
        let text = send(addr, b"GET /hello/mundo HTTP/1.1\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hola mundo"));
    }

    #[test]
    fn test_registration_while_serving() {
        let registry = Arc::new(Registry::new());
        let addr = spawn_server(Arc::clone(&registry));

        let text = send(addr, b"GET /late HTTP/1.1\r\n\r\n");
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));

        registry
            .register("/late", |_req, w| w.send(&Response::text(StatusCode::Ok, "ya")))
            .unwrap();

        let text = send(addr, b"GET /late HTTP/1.1\r\n\r\n");
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn test_peer_closed_immediately() {
        let registry = Arc::new(Registry::new());
        let addr = spawn_server(Arc::clone(&registry));

        // Cliente que conecta y cierra sin mandar datos
        drop(TcpStream::connect(addr).unwrap());

        // El servidor sigue aceptando
        let text = send(addr, b"GET / HTTP/1.1\r\n\r\n");
        assert!(text.contains("404 Not Found"));
    }
}
