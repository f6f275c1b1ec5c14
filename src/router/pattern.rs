//! # Patrones de Ruta
//! src/router/pattern.rs
//!
//! Un patrón es una secuencia de segmentos separados por `/`:
//!
//! | Segmento       | Coincide con                               | Liga          |
//! |----------------|--------------------------------------------|---------------|
//! | `payments`     | exactamente `payments`                     | nada          |
//! | `{id}`         | cualquier segmento                         | `id` = todo   |
//! | `img{name}`    | segmentos que empiezan con `img`           | `name` = resto|
//!
//! El patrón se compila una sola vez al registrarlo y es inmutable.

use crate::error::PatternError;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Un segmento de un patrón compilado
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Texto que debe coincidir exactamente
    Literal(String),

    /// `{name}`: liga el segmento completo
    Capture(String),

    /// `prefix{name}`: el segmento debe empezar con `prefix`, se liga el resto
    PrefixCapture { prefix: String, name: String },
}

impl Segment {
    fn parse(segment: &str) -> Result<Self, PatternError> {
        let Some(open) = segment.find('{') else {
            return Ok(Segment::Literal(segment.to_string()));
        };

        let Some(close) = segment[open..].find('}').map(|pos| pos + open) else {
            return Err(PatternError::UnclosedCapture(segment.to_string()));
        };

        if close != segment.len() - 1 {
            return Err(PatternError::TrailingText(segment.to_string()));
        }

        let name = &segment[open + 1..close];
        if name.is_empty() {
            return Err(PatternError::EmptyName(segment.to_string()));
        }
        if name.contains('{') {
            return Err(PatternError::UnclosedCapture(segment.to_string()));
        }

        let prefix = &segment[..open];
        if prefix.is_empty() {
            Ok(Segment::Capture(name.to_string()))
        } else {
            Ok(Segment::PrefixCapture {
                prefix: prefix.to_string(),
                name: name.to_string(),
            })
        }
    }

    fn capture_name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Capture(name) | Segment::PrefixCapture { name, .. } => Some(name),
        }
    }
}

/// Patrón de ruta compilado
///
/// El orden (`Ord`) es el de especificidad: menos capturas primero, y a
/// igual cantidad, orden lexicográfico del texto del patrón.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    captures: usize,
}

impl RoutePattern {
    /// Compila un patrón
    ///
    /// # Ejemplo
    /// ```
    /// use rawhttp::router::RoutePattern;
    ///
    /// let pattern = RoutePattern::parse("/payments/{id}").unwrap();
    /// let params = pattern.matches("/payments/42").unwrap();
    /// assert_eq!(params.get("id").map(String::as_str), Some("42"));
    /// assert!(pattern.matches("/payments/42/refund").is_none());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(raw.to_string()));
        }

        let segments = raw
            .split('/')
            .map(Segment::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let mut names: Vec<&str> = Vec::new();
        for name in segments.iter().filter_map(Segment::capture_name) {
            if names.contains(&name) {
                return Err(PatternError::DuplicateName(name.to_string()));
            }
            names.push(name);
        }
        let captures = names.len();

        Ok(Self {
            raw: raw.to_string(),
            segments,
            captures,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Cantidad de segmentos que capturan (`{x}` y `prefix{x}`)
    pub fn capture_count(&self) -> usize {
        self.captures
    }

    /// Intenta hacer coincidir un path concreto
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').collect();
        self.match_segments(&parts)
    }

    /// Igual que [`RoutePattern::matches`] pero con el path ya separado
    ///
    /// Compara de izquierda a derecha y corta en el primer segmento que no
    /// coincide. Los largos distintos no son candidatos.
    pub fn match_segments(&self, parts: &[&str]) -> Option<HashMap<String, String>> {
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::with_capacity(self.captures);

        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != *part {
                        return None;
                    }
                }
                Segment::Capture(name) => {
                    params.insert(name.clone(), part.to_string());
                }
                Segment::PrefixCapture { prefix, name } => {
                    let rest = part.strip_prefix(prefix.as_str())?;
                    params.insert(name.clone(), rest.to_string());
                }
            }
        }

        Some(params)
    }
}

impl Ord for RoutePattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.captures
            .cmp(&other.captures)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for RoutePattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for RoutePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_segments() {
        let pattern = RoutePattern::parse("/banners/{id}/img{name}").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Literal(String::new()),
                Segment::Literal("banners".to_string()),
                Segment::Capture("id".to_string()),
                Segment::PrefixCapture {
                    prefix: "img".to_string(),
                    name: "name".to_string()
                },
            ]
        );
        assert_eq!(pattern.capture_count(), 2);
        assert_eq!(pattern.to_string(), "/banners/{id}/img{name}");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            RoutePattern::parse("banners"),
            Err(PatternError::MissingLeadingSlash("banners".to_string()))
        );
        assert_eq!(
            RoutePattern::parse("/a/{id"),
            Err(PatternError::UnclosedCapture("{id".to_string()))
        );
        assert_eq!(
            RoutePattern::parse("/a/{id}.json"),
            Err(PatternError::TrailingText("{id}.json".to_string()))
        );
        assert_eq!(
            RoutePattern::parse("/a/{}"),
            Err(PatternError::EmptyName("{}".to_string()))
        );
        assert_eq!(
            RoutePattern::parse("/{id}/x{id}"),
            Err(PatternError::DuplicateName("id".to_string()))
        );
    }

    #[test]
    fn test_literal_match() {
        let pattern = RoutePattern::parse("/users").unwrap();
        assert_eq!(pattern.matches("/users"), Some(HashMap::new()));
        assert_eq!(pattern.matches("/Users"), None);
        assert_eq!(pattern.matches("/user"), None);
    }

    #[test]
    fn test_root_pattern() {
        let pattern = RoutePattern::parse("/").unwrap();
        assert!(pattern.matches("/").is_some());
        assert!(pattern.matches("/x").is_none());
    }

    #[test]
    fn test_capture_binds_segment_text() {
        let pattern = RoutePattern::parse("/payments/{id}/items/{item}").unwrap();
        assert_eq!(
            pattern.matches("/payments/42/items/abc"),
            Some(params(&[("id", "42"), ("item", "abc")]))
        );
        assert_eq!(pattern.matches("/payments/42/other/abc"), None);
    }

    #[test]
    fn test_segment_count_must_match() {
        let pattern = RoutePattern::parse("/{a}/{b}").unwrap();
        assert!(pattern.matches("/x").is_none());
        assert!(pattern.matches("/x/y/z").is_none());
        assert!(pattern.matches("/x/y").is_some());
    }

    #[test]
    fn test_prefix_capture() {
        let pattern = RoutePattern::parse("/files/img{name}").unwrap();
        assert_eq!(
            pattern.matches("/files/img42.png"),
            Some(params(&[("name", "42.png")]))
        );
        assert_eq!(pattern.matches("/files/img"), Some(params(&[("name", "")])));
        assert_eq!(pattern.matches("/files/pic42.png"), None);
    }

    #[test]
    fn test_trailing_slash_is_extra_segment() {
        let pattern = RoutePattern::parse("/banners").unwrap();
        assert!(pattern.matches("/banners/").is_none());

        let pattern = RoutePattern::parse("/banners/{id}").unwrap();
        assert_eq!(pattern.matches("/banners/"), Some(params(&[("id", "")])));
    }

    #[test]
    fn test_specificity_ordering() {
        let literal = RoutePattern::parse("/users").unwrap();
        let capture = RoutePattern::parse("/{id}").unwrap();
        let prefix = RoutePattern::parse("/u{rest}").unwrap();

        assert!(literal < capture);
        assert!(literal < prefix);
        // Misma cantidad de capturas: orden lexicográfico ('u' < '{')
        assert!(prefix < capture);
    }
}
