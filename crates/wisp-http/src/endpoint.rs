//! [`HttpEndpoint`] — the connection-pool dedup key:
//! `{ scheme, host, port, optional proxy }`.

use std::fmt;

use crate::url::Url;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// `Some(proxy_url)` when the session has a proxy configured; part of
    /// the dedup key so traffic through different proxies never shares a
    /// worker.
    pub proxy: Option<String>,
}

impl HttpEndpoint {
    /// Resolves the port from `url.port()`, falling back to the scheme's
    /// well-known port (80/443 for http/https; 1080 for socks5, used when
    /// resolving the proxy's own endpoint).
    pub fn from_url(url: &Url, proxy: Option<&Url>) -> Option<Self> {
        let port = match url.port() {
            Some(p) => p,
            None => default_port(url.scheme())?,
        };
        Some(HttpEndpoint {
            scheme: url.scheme().to_string(),
            host: url.host().to_string(),
            port,
            proxy: proxy.map(|p| p.to_string()),
        })
    }

    pub fn is_tls(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }
}

pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" => Some(80),
        "https" => Some(443),
        "socks5" => Some(1080),
        _ => None,
    }
}

impl fmt::Display for HttpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        if let Some(proxy) = &self.proxy {
            write!(f, " via {proxy}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_port_from_scheme() {
        let url = Url::parse("https://example.com/").unwrap();
        let endpoint = HttpEndpoint::from_url(&url, None).unwrap();
        assert_eq!(endpoint.port, 443);
    }

    #[test]
    fn explicit_port_wins() {
        let url = Url::parse("https://example.com:9443/").unwrap();
        let endpoint = HttpEndpoint::from_url(&url, None).unwrap();
        assert_eq!(endpoint.port, 9443);
    }
}
