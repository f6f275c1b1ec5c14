//! # Manejo de una Conexión
//! src/server/connection.rs
//!
//! Cada conexión aceptada se atiende en su propio thread:
//!
//! 1. Aplicar timeouts de lectura/escritura al socket
//! 2. Leer y parsear **un** request, dentro de un plazo total
//! 3. Enrutar y ejecutar el handler
//! 4. Cerrar la conexión (siempre, en todos los caminos)
//!
//! Los errores de parsing y routing no salen de acá: se responden con un
//! status explícito y se cierra la conexión. Un handler que hace panic
//! también recibe respuesta (500).

use crate::error::{ConnectionError, IoError};
use crate::http::{ParseLimits, Request, Response, ResponseWriter, StatusCode};
use crate::router::Router;
use std::any::Any;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, trace, warn};

/// Tiempo total para drenar el socket antes de cerrarlo
const LINGER_TIMEOUT: Duration = Duration::from_millis(100);

/// Máximo de bytes que se descartan al cerrar
const LINGER_MAX_BYTES: usize = 64 * 1024;

/// Parámetros por conexión, derivados de la configuración
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Espera máxima por cada lectura
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Plazo total para recibir el request completo
    pub request_timeout: Duration,
    pub limits: ParseLimits,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            limits: ParseLimits::default(),
        }
    }
}

/// Dueño exclusivo del socket de una conexión
///
/// Cada lectura espera como mucho `read_timeout`, y nunca más allá del
/// plazo del request: un cliente que manda de a un byte no retiene el
/// thread más que `request_timeout`.
///
/// Al salir de scope cierra la escritura, descarta lo que el cliente haya
/// dejado sin leer (como mucho [`LINGER_TIMEOUT`] en total) y cierra el
/// socket. Así la respuesta llega completa aunque el request no se haya
/// consumido entero.
struct Connection {
    stream: TcpStream,
    read_timeout: Duration,
    deadline: Instant,
}

impl Connection {
    fn new(stream: TcpStream, settings: &ConnectionSettings) -> Self {
        Self {
            stream,
            read_timeout: settings.read_timeout,
            deadline: Instant::now() + settings.request_timeout,
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request deadline exceeded",
            ));
        }

        self.stream
            .set_read_timeout(Some(remaining.min(self.read_timeout)))?;
        self.stream.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Write) {
            trace!(error = %e, "shutdown de escritura falló");
            return;
        }

        let linger_until = Instant::now() + LINGER_TIMEOUT;
        let mut scratch = [0u8; 4096];
        let mut drained = 0;
        while drained < LINGER_MAX_BYTES {
            let remaining = linger_until.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.stream.set_read_timeout(Some(remaining)).is_err() {
                break;
            }
            match self.stream.read(&mut scratch) {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }

        if let Err(e) = self.stream.shutdown(Shutdown::Read) {
            trace!(error = %e, "shutdown de lectura falló");
        }
    }
}

/// Atiende una conexión TCP completa y la cierra
///
/// Corre dentro del thread de la conexión. Nunca propaga errores: todo se
/// loguea dentro del span `conn`.
pub fn handle_connection(
    stream: TcpStream,
    id: u64,
    router: &Router,
    settings: &ConnectionSettings,
) {
    let peer = stream.peer_addr().ok();
    let peer_label = peer
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let span = info_span!("conn", id, peer = %peer_label);
    let _enter = span.enter();

    let start = Instant::now();
    if let Err(e) = stream.set_write_timeout(Some(settings.write_timeout)) {
        warn!(error = %e, "No se pudo configurar el timeout de escritura");
        return;
    }
    let mut connection = Connection::new(stream, settings);

    let status = serve_connection(&mut connection, peer, router, &settings.limits);
    drop(connection);

    debug!(
        status = ?status.map(|s| s.as_u16()),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Conexión cerrada"
    );
}

/// Lee un request de `stream`, lo despacha y escribe la respuesta
///
/// Retorna el status escrito, o `None` si no se escribió nada (peer que
/// cerró sin enviar, o error de lectura que no sea timeout).
pub fn serve_connection<S: Read + Write>(
    stream: &mut S,
    peer: Option<SocketAddr>,
    router: &Router,
    limits: &ParseLimits,
) -> Option<StatusCode> {
    let start = Instant::now();

    let mut request = match Request::read_from(stream, limits) {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!("El cliente cerró sin enviar datos");
            return None;
        }
        Err(ConnectionError::Parse(e)) => {
            warn!(error = %e, "Request inválido");
            let mut writer = ResponseWriter::new(stream);
            send_or_log(&mut writer, &Response::error(e.status(), &e.to_string()));
            return writer.sent_status();
        }
        Err(ConnectionError::Io(e)) if e.is_timeout() => {
            warn!(error = %e, "Timeout leyendo el request");
            let mut writer = ResponseWriter::new(stream);
            send_or_log(
                &mut writer,
                &Response::error(StatusCode::RequestTimeout, "request not received in time"),
            );
            return writer.sent_status();
        }
        Err(e) => {
            warn!(error = %e, "Error leyendo el request");
            return None;
        }
    };

    if let Some(peer) = peer {
        request.set_peer_addr(peer);
    }

    let mut writer = ResponseWriter::new(stream);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        router.dispatch(&mut request, &mut writer)
    }));

    match outcome {
        Ok(Ok(pattern)) => {
            if !writer.is_sent() {
                error!(pattern = %pattern, "El handler terminó sin enviar respuesta");
                send_or_log(
                    &mut writer,
                    &Response::error(StatusCode::InternalServerError, "handler sent no response"),
                );
            }
        }
        Ok(Err(ConnectionError::Route(e))) => {
            debug!(error = %e, "Sin ruta");
            send_or_log(&mut writer, &Response::error(e.status(), &e.to_string()));
        }
        Ok(Err(e)) => {
            error!(error = %e, "Falló el handler");
            if !writer.is_sent() {
                send_or_log(
                    &mut writer,
                    &Response::error(StatusCode::InternalServerError, "internal error"),
                );
            }
        }
        Err(payload) => {
            error!(panic = panic_message(payload.as_ref()), "El handler hizo panic");
            if !writer.is_sent() {
                send_or_log(
                    &mut writer,
                    &Response::error(StatusCode::InternalServerError, "internal error"),
                );
            }
        }
    }

    let status = writer.sent_status();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let code = status.map(|s| s.as_u16());
    match status {
        Some(s) if s.is_server_error() => error!(
            method = %request.method(),
            path = request.path(),
            status = ?code,
            latency_ms,
            "Request atendido"
        ),
        Some(s) if s.is_client_error() => warn!(
            method = %request.method(),
            path = request.path(),
            status = ?code,
            latency_ms,
            "Request atendido"
        ),
        _ => info!(
            method = %request.method(),
            path = request.path(),
            status = ?code,
            latency_ms,
            "Request atendido"
        ),
    }

    status
}

/// Texto del payload de un panic (`&str` o `String`)
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Envía una respuesta generada por el servidor; un fallo solo se loguea
fn send_or_log(writer: &mut ResponseWriter<'_>, response: &Response) {
    if let Err(e) = writer.send(response) {
        let err = IoError::WriteFailed(e);
        warn!(error = %err, status = response.status().as_u16(), "No se pudo escribir la respuesta");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Registry;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Socket en memoria: lee de `input`, escribe en `output`
    struct MockStream {
        input: io::Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl MockStream {
        fn new(input: &[u8]) -> Self {
            Self {
                input: io::Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }

        fn output(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn counting_router(pattern: &str, calls: &Arc<AtomicUsize>) -> Router {
        let registry = Arc::new(Registry::new());
        let calls = Arc::clone(calls);
        registry
            .register(pattern, move |req, w| {
                calls.fetch_add(1, Ordering::SeqCst);
                let id = req.path_param("id").unwrap_or("-");
                w.send(&Response::text(StatusCode::Ok, id))
            })
            .unwrap();
        Router::new(registry)
    }

    fn serve(raw: &[u8], router: &Router) -> (Option<StatusCode>, String) {
        let mut stream = MockStream::new(raw);
        let status = serve_connection(&mut stream, None, router, &ParseLimits::default());
        (status, stream.output())
    }

    #[test]
    fn test_serves_matching_route() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router("/payments/{id}", &calls);

        let (status, out) = serve(b"GET /payments/42 HTTP/1.1\r\nHost: x\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::Ok));
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("\r\n\r\n42"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bad_request_line_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router("/", &calls);

        let (status, out) = serve(b"GET /\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::BadRequest));
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.contains("Invalid request line"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_header_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router("/", &calls);

        let (status, out) = serve(b"GET / HTTP/1.1\r\nHost: x\r\nnocolon\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::BadRequest));
        assert!(out.contains("Malformed header: nocolon"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsupported_version() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router("/", &calls);

        let (status, out) = serve(b"GET / HTTP/1.0\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::HttpVersionNotSupported));
        assert!(out.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_route_writes_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router("/payments/{id}", &calls);

        let (status, out) = serve(b"GET /unknown HTTP/1.1\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::NotFound));
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.contains("/unknown"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_truncated_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router("/", &calls);

        let (status, _) = serve(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc", &router);

        assert_eq!(status, Some(StatusCode::BadRequest));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_connection_writes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = counting_router("/", &calls);

        let (status, out) = serve(b"", &router);

        assert_eq!(status, None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_handler_without_response_gets_500() {
        let registry = Arc::new(Registry::new());
        registry.register("/silent", |_req, _w| Ok(())).unwrap();
        let router = Router::new(registry);

        let (status, out) = serve(b"GET /silent HTTP/1.1\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::InternalServerError));
        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[test]
    fn test_handler_error_after_send_keeps_response() {
        let registry = Arc::new(Registry::new());
        registry
            .register("/partial", |_req, w| {
                w.send(&Response::text(StatusCode::Ok, "done"))?;
                Err(io::Error::other("late failure"))
            })
            .unwrap();
        let router = Router::new(registry);

        let (status, out) = serve(b"GET /partial HTTP/1.1\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::Ok));
        assert_eq!(out.matches("HTTP/1.1").count(), 1);
    }

    #[test]
    fn test_read_timeout_gets_408() {
        struct TimingOut {
            output: Vec<u8>,
        }
        impl Read for TimingOut {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"))
            }
        }
        impl Write for TimingOut {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.output.write(buf)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let router = Router::new(Arc::new(Registry::new()));
        let mut stream = TimingOut { output: Vec::new() };
        let status = serve_connection(&mut stream, None, &router, &ParseLimits::default());

        assert_eq!(status, Some(StatusCode::RequestTimeout));
        assert!(stream.output.starts_with(b"HTTP/1.1 408 Request Timeout\r\n"));
    }

    #[test]
    fn test_panicking_handler_gets_500() {
        let registry = Arc::new(Registry::new());
        registry
            .register("/boom", |_req, _w| panic!("handler exploded"))
            .unwrap();
        let router = Router::new(registry);

        let (status, out) = serve(b"GET /boom HTTP/1.1\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::InternalServerError));
        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert_eq!(out.matches("HTTP/1.1").count(), 1);
    }

    #[test]
    fn test_panic_after_send_keeps_response() {
        let registry = Arc::new(Registry::new());
        registry
            .register("/late-boom", |_req, w| {
                w.send(&Response::text(StatusCode::Ok, "done"))?;
                panic!("after send")
            })
            .unwrap();
        let router = Router::new(registry);

        let (status, out) = serve(b"GET /late-boom HTTP/1.1\r\n\r\n", &router);

        assert_eq!(status, Some(StatusCode::Ok));
        assert_eq!(out.matches("HTTP/1.1").count(), 1);
    }

    /// Par de sockets conectados: (lado servidor, lado cliente)
    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    /// Cliente que manda un byte cada `every`, sin terminar nunca el request
    fn trickle(mut client: TcpStream, every: Duration, total: Duration) {
        let start = Instant::now();
        let _ = client.write_all(b"POST /x HTTP/1.1\r\nContent-Length: 40\r\n\r\n");
        while start.elapsed() < total {
            thread::sleep(every);
            if client.write_all(b"a").is_err() {
                break;
            }
        }
    }

    #[test]
    fn test_trickling_client_hits_request_deadline() {
        let (server, client) = socket_pair();
        let feeder = thread::spawn(move || {
            trickle(client, Duration::from_millis(50), Duration::from_secs(2))
        });

        let settings = ConnectionSettings {
            read_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(300),
            ..ConnectionSettings::default()
        };
        let router = Router::new(Arc::new(Registry::new()));

        let start = Instant::now();
        let mut connection = Connection::new(server, &settings);
        let status = serve_connection(&mut connection, None, &router, &settings.limits);
        let elapsed = start.elapsed();
        drop(connection);

        assert_eq!(status, Some(StatusCode::RequestTimeout));
        assert!(
            elapsed < Duration::from_secs(1),
            "connection held for {:?}",
            elapsed
        );
        feeder.join().unwrap();
    }

    #[test]
    fn test_deadline_error_is_timeout() {
        let (server, client) = socket_pair();
        let feeder = thread::spawn(move || {
            trickle(client, Duration::from_millis(30), Duration::from_millis(800))
        });

        let settings = ConnectionSettings {
            read_timeout: Duration::from_millis(100),
            request_timeout: Duration::from_millis(200),
            ..ConnectionSettings::default()
        };
        let mut connection = Connection::new(server, &settings);

        let err = Request::read_from(&mut connection, &settings.limits).unwrap_err();
        assert!(matches!(err, ConnectionError::Io(ref e) if e.is_timeout()));
        drop(connection);
        feeder.join().unwrap();
    }

    #[test]
    fn test_drain_on_close_is_bounded() {
        let (server, client) = socket_pair();
        let feeder = thread::spawn(move || {
            trickle(client, Duration::from_millis(20), Duration::from_secs(1))
        });

        let connection = Connection::new(server, &ConnectionSettings::default());
        let start = Instant::now();
        drop(connection);

        assert!(start.elapsed() < Duration::from_millis(500));
        feeder.join().unwrap();
    }
}
