//! # Parsing de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Este módulo implementa un parser HTTP/1.1 desde cero, directamente sobre
//! los bytes leídos del socket.
//!
//! ## Formato de un Request HTTP/1.1
//!
//! ```text
//! POST /banners?draft=1 HTTP/1.1\r\n
//! Host: localhost:9999\r\n
//! Content-Length: 13\r\n
//! \r\n
//! {"title":"x"}
//! ```
//!
//! ## Pasos
//!
//! 1. **Request Line**: `METHOD target HTTP/1.1`, exactamente tres tokens
//! 2. **Target**: se decodifica (`%XX`) y se separa en path y query
//! 3. **Headers**: pares `Name: Value` hasta la línea vacía (`\r\n\r\n`)
//! 4. **Body**: exactamente `Content-Length` bytes, leyendo del socket las
//!    veces que haga falta. Sin `Content-Length` el body es vacío.

use crate::error::{ConnectionError, IoError, ParseError};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::SocketAddr;

const CRLF: &[u8] = b"\r\n";
const HEAD_END: &[u8] = b"\r\n\r\n";

/// Headers que determinan dónde termina el body
const FRAMING_HEADERS: [&str; 2] = ["Content-Length", "Transfer-Encoding"];

/// Métodos HTTP
///
/// El parser no rechaza métodos: cualquier token desconocido queda en
/// [`Method::Other`] y es el handler quien decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    PATCH,
    DELETE,
    OPTIONS,
    Other(String),
}

impl Method {
    /// Convierte el método a string
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
            Method::Other(m) => m,
        }
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "PATCH" => Method::PATCH,
            "DELETE" => Method::DELETE,
            "OPTIONS" => Method::OPTIONS,
            other => Method::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Límites aplicados mientras se lee un request del socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Máximo de bytes para request line + headers
    pub max_head_bytes: usize,

    /// Máximo `Content-Length` aceptado
    pub max_body_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_head_bytes: 8 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Representa un request HTTP/1.1 parseado
#[derive(Debug, Clone)]
pub struct Request {
    /// Método HTTP
    method: Method,

    /// Path ya decodificado (ej: "/payments/42")
    path: String,

    /// Versión HTTP (siempre "HTTP/1.1")
    version: String,

    /// Query parameters (ej: {"q": "rust"}); la última ocurrencia gana
    query_params: HashMap<String, String>,

    /// Parámetros extraídos del patrón de ruta (ej: {"id": "42"})
    path_params: HashMap<String, String>,

    /// Headers HTTP, tal como llegaron
    headers: HashMap<String, String>,

    body: Vec<u8>,

    peer_addr: Option<SocketAddr>,
}

/// Request line ya validada
struct RequestLine {
    method: Method,
    path: String,
    query_params: HashMap<String, String>,
    version: String,
}

impl Request {
    /// Parsea un request HTTP/1.1 completo desde un buffer
    ///
    /// A diferencia de [`Request::read_from`], no puede pedir más bytes: si
    /// el `Content-Length` declarado supera lo que hay en el buffer, el
    /// resultado es [`ParseError::TruncatedBody`].
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use rawhttp::http::Request;
    ///
    /// let raw = b"GET /search?q=go&q=rust HTTP/1.1\r\nHost: x\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/search");
    /// assert_eq!(request.query_param("q"), Some("rust"));
    /// assert_eq!(request.header("Host"), Some("x"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let Some(line_end) = find(buffer, CRLF, 0) else {
            return Err(ParseError::BadRequestLine);
        };
        Self::parse_request_line(&buffer[..line_end])?;

        let Some(head_end) = find(buffer, HEAD_END, 0) else {
            return Err(Self::incomplete_head(buffer));
        };

        let mut request = Self::parse_head(&buffer[..head_end])?;
        let expected = request.declared_body_length(usize::MAX)?;
        let available = &buffer[head_end + HEAD_END.len()..];

        if available.len() < expected {
            return Err(ParseError::TruncatedBody {
                expected,
                received: available.len(),
            });
        }
        request.body = available[..expected].to_vec();

        Ok(request)
    }

    /// Lee y parsea un request desde el socket
    ///
    /// Lee hasta encontrar el fin de los headers y luego exactamente
    /// `Content-Length` bytes de body. La request line se valida apenas
    /// llega su `\r\n`, sin esperar al resto del head.
    ///
    /// Retorna `Ok(None)` si el peer cerró sin enviar nada.
    pub fn read_from<R: Read>(
        reader: &mut R,
        limits: &ParseLimits,
    ) -> Result<Option<Self>, ConnectionError> {
        let mut buffer: Vec<u8> = Vec::with_capacity(1024);
        let mut chunk = [0u8; 4096];
        let mut line_checked = false;
        let mut search_from = 0;

        // 1. Head: request line + headers
        let head_end = loop {
            if !line_checked {
                if let Some(line_end) = find(&buffer, CRLF, 0) {
                    Self::parse_request_line(&buffer[..line_end])?;
                    line_checked = true;
                }
            }

            if let Some(pos) = find(&buffer, HEAD_END, search_from) {
                break pos;
            }

            if buffer.len() > limits.max_head_bytes {
                return Err(ParseError::HeadTooLarge {
                    limit: limits.max_head_bytes,
                }
                .into());
            }

            let n = read_chunk(reader, &mut chunk)?;
            if n == 0 {
                if buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Self::incomplete_head(&buffer).into());
            }

            search_from = buffer.len().saturating_sub(HEAD_END.len() - 1);
            buffer.extend_from_slice(&chunk[..n]);
        };

        if head_end > limits.max_head_bytes {
            return Err(ParseError::HeadTooLarge {
                limit: limits.max_head_bytes,
            }
            .into());
        }

        let mut request = Self::parse_head(&buffer[..head_end])?;

        // 2. Body: lo que ya llegó después de \r\n\r\n, y el resto del socket
        let expected = request.declared_body_length(limits.max_body_bytes)?;
        let mut body = buffer.split_off(head_end + HEAD_END.len());
        body.truncate(expected);

        while body.len() < expected {
            let n = read_chunk(reader, &mut chunk)?;
            if n == 0 {
                return Err(ParseError::TruncatedBody {
                    expected,
                    received: body.len(),
                }
                .into());
            }
            let take = n.min(expected - body.len());
            body.extend_from_slice(&chunk[..take]);
        }

        request.body = body;
        Ok(Some(request))
    }

    /// Parsea request line + headers (sin el `\r\n\r\n` final)
    fn parse_head(head: &[u8]) -> Result<Self, ParseError> {
        let (line, header_block) = match find(head, CRLF, 0) {
            Some(pos) => (&head[..pos], &head[pos + CRLF.len()..]),
            None => (head, &[][..]),
        };

        let RequestLine {
            method,
            path,
            query_params,
            version,
        } = Self::parse_request_line(line)?;

        let header_block = std::str::from_utf8(header_block)
            .map_err(|_| ParseError::MalformedHeader("invalid UTF-8".to_string()))?;
        let headers = Self::parse_headers(header_block)?;

        Ok(Request {
            method,
            path,
            version,
            query_params,
            path_params: HashMap::new(),
            headers,
            body: Vec::new(),
            peer_addr: None,
        })
    }

    /// Parsea la request line (primera línea del request)
    ///
    /// Formato: `GET /path?query HTTP/1.1`
    fn parse_request_line(line: &[u8]) -> Result<RequestLine, ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::BadRequestLine)?;
        let parts: Vec<&str> = line.split_whitespace().collect();

        // Debe tener exactamente 3 partes: METHOD TARGET VERSION
        let [method, target, version] = parts[..] else {
            return Err(ParseError::BadRequestLine);
        };

        if version != "HTTP/1.1" {
            return Err(ParseError::UnsupportedVersion(version.to_string()));
        }

        // El target completo se decodifica antes de separar path y query
        let decoded = percent_decode_str(target)
            .decode_utf8()
            .map_err(|_| ParseError::BadRequestLine)?;
        let (path, query) = Self::split_target(&decoded)?;

        Ok(RequestLine {
            method: Method::from(method),
            path,
            query_params: query.map(Self::parse_query_string).unwrap_or_default(),
            version: version.to_string(),
        })
    }

    /// Separa el target en path y query string
    ///
    /// Acepta origin-form (`/path?q`) y absolute-form
    /// (`http://host/path?q`, del que solo se conserva el path).
    fn split_target(target: &str) -> Result<(String, Option<&str>), ParseError> {
        let target = match target.find('#') {
            Some(pos) => &target[..pos],
            None => target,
        };

        let origin = if target.starts_with('/') {
            target
        } else {
            match target.find("://") {
                Some(scheme_end) if scheme_end > 0 => {
                    let after_scheme = &target[scheme_end + 3..];
                    match after_scheme.find(['/', '?']) {
                        Some(pos) => &after_scheme[pos..],
                        None => "",
                    }
                }
                _ => return Err(ParseError::BadRequestLine),
            }
        };

        let (path, query) = match origin.find('?') {
            Some(pos) => (&origin[..pos], Some(&origin[pos + 1..])),
            None => (origin, None),
        };

        let path = if path.is_empty() { "/" } else { path };
        Ok((path.to_string(), query))
    }

    /// Parsea una query string en un HashMap
    ///
    /// Ejemplo: "q=go&q=rust&debug"
    /// Retorna: {"q": "rust", "debug": ""}
    fn parse_query_string(query: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();

        for param in query.split('&') {
            if param.is_empty() {
                continue;
            }

            let (key, value) = match param.find('=') {
                Some(eq_pos) => (&param[..eq_pos], &param[eq_pos + 1..]),
                None => (param, ""),
            };

            // `+` es un espacio en query strings (form encoding)
            params.insert(key.replace('+', " "), value.replace('+', " "));
        }

        params
    }

    /// Parsea los headers HTTP
    ///
    /// Cada línea se corta en su primer `:`. Una línea sin `:` invalida
    /// todo el bloque: nunca se devuelve un mapa a medias.
    ///
    /// Los headers que definen el largo del body (`Content-Length`,
    /// `Transfer-Encoding`) pueden repetirse solo con el mismo valor,
    /// comparando el nombre sin distinguir mayúsculas.
    fn parse_headers(block: &str) -> Result<HashMap<String, String>, ParseError> {
        let mut headers = HashMap::new();

        if block.is_empty() {
            return Ok(headers);
        }

        for line in block.split("\r\n") {
            let Some(colon_pos) = line.find(':') else {
                return Err(ParseError::MalformedHeader(line.to_string()));
            };

            let name = &line[..colon_pos];
            if name.is_empty() {
                return Err(ParseError::MalformedHeader(line.to_string()));
            }

            let value = &line[colon_pos + 1..];
            let value = value.strip_prefix(' ').unwrap_or(value);

            if FRAMING_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                let conflict = headers.iter().any(|(key, previous)| {
                    key.eq_ignore_ascii_case(name) && previous.trim() != value.trim()
                });
                if conflict {
                    return Err(ParseError::MalformedHeader(format!(
                        "conflicting {} values",
                        name
                    )));
                }
            }

            headers.insert(name.to_string(), value.to_string());
        }

        Ok(headers)
    }

    /// Tamaño de body declarado por los headers (0 si no hay `Content-Length`)
    fn declared_body_length(&self, max_body_bytes: usize) -> Result<usize, ParseError> {
        if let Some(encoding) = self.header("Transfer-Encoding") {
            return Err(ParseError::UnsupportedTransferEncoding(encoding.to_string()));
        }

        let Some(raw) = self.header("Content-Length") else {
            return Ok(0);
        };

        let declared: usize = raw
            .trim()
            .parse()
            .map_err(|_| ParseError::MalformedHeader(format!("Content-Length: {}", raw)))?;

        if declared > max_body_bytes {
            return Err(ParseError::BodyTooLarge {
                declared,
                limit: max_body_bytes,
            });
        }

        Ok(declared)
    }

    /// Error para un head que terminó antes de la línea vacía
    fn incomplete_head(buffer: &[u8]) -> ParseError {
        if find(buffer, CRLF, 0).is_some() {
            ParseError::MalformedHeader("unterminated header block".to_string())
        } else {
            ParseError::BadRequestLine
        }
    }

    pub(crate) fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    pub(crate) fn set_peer_addr(&mut self, peer_addr: SocketAddr) {
        self.peer_addr = Some(peer_addr);
    }

    // === Métodos públicos para acceder a los campos ===

    /// Obtiene el método HTTP del request
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Obtiene el path (decodificado) del request
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Obtiene la versión HTTP
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Obtiene todos los query parameters
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Obtiene un query parameter específico
    ///
    /// # Ejemplo
    /// ```
    /// use rawhttp::http::Request;
    ///
    /// let raw = b"GET /test?num=42 HTTP/1.1\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.query_param("num"), Some("42"));
    /// assert_eq!(request.query_param("missing"), None);
    /// ```
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Parámetros ligados por el patrón de ruta
    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(|s| s.as_str())
    }

    /// Obtiene todos los headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Obtiene un header; el nombre se compara sin distinguir mayúsculas
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Obtiene el body del request
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Obtiene el body del request como String
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }

    /// Dirección del cliente, si el request vino de un socket
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

/// Busca `needle` en `haystack` a partir de `from`
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Lee un chunk reintentando ante `Interrupted`
fn read_chunk<R: Read>(reader: &mut R, chunk: &mut [u8]) -> Result<usize, IoError> {
    loop {
        match reader.read(chunk) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IoError::ReadFailed(e)),
        }
    }
}
