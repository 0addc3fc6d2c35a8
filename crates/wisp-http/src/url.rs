//! [`Url`] — a minimal absolute-URL parser for
//! `scheme://host[:port]/path[?query]`, split by delimiter search rather
//! than a full RFC 3986 grammar, plus percent-encoding helpers and
//! redirect-target resolution. Encoding/decoding goes through the
//! `percent-encoding` crate rather than a hand-rolled escape loop.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use wisp_core::error::{categories, Code, Error};
use wisp_core::Result;

/// Bytes left unescaped: alphanumerics plus `-._~` (RFC 3986 unreserved).
/// `percent_encoding::NON_ALPHANUMERIC` escapes everything outside
/// `[A-Za-z0-9]`, so punch back the four characters that should stay
/// unescaped.
const SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes `component`'s unsafe bytes as uppercase `%HH`.
pub fn encode_component(component: &str) -> String {
    utf8_percent_encode(component, SAFE).to_string()
}

/// Percent-decodes `component`. Invalid UTF-8 after decoding is replaced
/// losslessly rather than rejected, matching the permissive style of the
/// rest of this parser.
pub fn decode_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// An absolute URL: `scheme://host[:port]/path[?query]`. Parsed by
/// delimiter search, not a full URI grammar — the same tradeoff the
/// source makes, since every caller in this stack constructs URLs from
/// known-good strings or request headers, not untrusted free text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: String,
}

impl Url {
    pub fn parse(s: &str) -> Result<Self> {
        let scheme = parse_scheme(s);
        if scheme.is_empty() {
            return Err(bad_url("missing scheme"));
        }
        let host = parse_host(s);
        if host.is_empty() {
            return Err(bad_url("missing host"));
        }
        Ok(Url {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port: parse_port(s)?,
            path: parse_path(s).to_string(),
            query: parse_query(s).to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Defaults to `"/"` when the parsed URL had no path, matching the
    /// source's `Url::path()`.
    pub fn path(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            &self.path
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Resolves `location` (a `Location` header value, possibly relative)
    /// against `self`, for the redirect loop in `HttpSession::send_request`.
    /// Absolute locations (containing `://`) are parsed standalone;
    /// root-relative locations (`/path`) keep this URL's scheme/host/port;
    /// anything else is resolved against this URL's path directory.
    pub fn resolve(&self, location: &str) -> Result<Url> {
        if location.contains("://") {
            return Url::parse(location);
        }
        if let Some(rest) = location.strip_prefix('/') {
            let (path, query) = split_path_query(rest);
            return Ok(Url {
                scheme: self.scheme.clone(),
                host: self.host.clone(),
                port: self.port,
                path: format!("/{path}"),
                query: query.to_string(),
            });
        }
        let base_dir = match self.path().rfind('/') {
            Some(idx) => &self.path()[..=idx],
            None => "/",
        };
        let (path, query) = split_path_query(location);
        Ok(Url {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port,
            path: format!("{base_dir}{path}"),
            query: query.to_string(),
        })
    }
}

fn split_path_query(s: &str) -> (&str, &str) {
    match s.find('?') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

fn bad_url(message: &str) -> Error {
    Error::new(categories::GENERIC, Code::InvalidArgument).with_message(format!("malformed URL: {message}"))
}

fn parse_scheme(s: &str) -> &str {
    match s.find("://") {
        Some(idx) => &s[..idx],
        None => "",
    }
}

fn after_scheme(s: &str) -> &str {
    match s.find("://") {
        Some(idx) => &s[idx + 3..],
        None => s,
    }
}

fn parse_host(s: &str) -> &str {
    let rest = after_scheme(s);
    let rest = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    match rest.find(':') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

fn parse_port(s: &str) -> Result<Option<u16>> {
    let rest = after_scheme(s);
    let rest = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    match rest.find(':') {
        None => Ok(None),
        Some(idx) => rest[idx + 1..]
            .parse::<u16>()
            .map(Some)
            .map_err(|_| bad_url("invalid port")),
    }
}

fn parse_path(s: &str) -> &str {
    let rest = after_scheme(s);
    let rest = match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => return "",
    };
    match rest.find('?') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

fn parse_query(s: &str) -> &str {
    match s.find('?') {
        Some(idx) => &s[idx + 1..],
        None => "",
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{}", self.path())?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_port_path_query() {
        let url = Url::parse("https://example.com:8443/a/b?x=1").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.port(), Some(8443));
        assert_eq!(url.path(), "/a/b");
        assert_eq!(url.query(), "x=1");
    }

    #[test]
    fn path_defaults_to_root() {
        let url = Url::parse("http://example.com").unwrap();
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn resolves_root_relative_location() {
        let base = Url::parse("http://example.com/a/b").unwrap();
        let next = base.resolve("/c?x=1").unwrap();
        assert_eq!(next.to_string(), "http://example.com/c?x=1");
    }

    #[test]
    fn resolves_relative_location_against_directory() {
        let base = Url::parse("http://example.com/a/b").unwrap();
        let next = base.resolve("c").unwrap();
        assert_eq!(next.path(), "/a/c");
    }

    #[test]
    fn encode_decode_round_trips() {
        let encoded = encode_component("a b/c");
        assert_eq!(encoded, "a%20b%2Fc");
        assert_eq!(decode_component(&encoded), "a b/c");
    }
}
