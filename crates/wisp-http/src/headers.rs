//! [`HttpHeaders`] — an ordered, case-insensitive multimap. An
//! insertion-ordered `Vec` rather than a `HashMap`, since header *send
//! order* matters for the wire format and Rust's stdlib has no
//! case-insensitive ordered map.

use std::fmt;

/// Case-insensitively compares two header names.
fn names_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        HttpHeaders::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| names_eq(k, key))
    }

    /// The first value for `key`, or `""` if absent — matching the
    /// source's `value()`, which returns an empty `string_view` rather
    /// than an `Option`.
    pub fn value(&self, key: &str) -> &str {
        self.entries
            .iter()
            .find(|(k, _)| names_eq(k, key))
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn values(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| names_eq(k, key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| !names_eq(k, key));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for HttpHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            write!(f, "{key}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a HttpHeaders {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Well-known header names, spelled out here as plain `&'static str`
/// constants rather than an enum, since Rust callers just pass `&str`
/// to `append`/`value` directly.
pub mod well_known {
    pub const USER_AGENT: &str = "User-Agent";
    pub const ACCEPT: &str = "Accept";
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    pub const SET_COOKIE: &str = "Set-Cookie";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONNECTION: &str = "Connection";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
    pub const LOCATION: &str = "Location";
    pub const ORIGIN: &str = "Origin";
    pub const COOKIE: &str = "Cookie";
    pub const HOST: &str = "Host";
    pub const RANGE: &str = "Range";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HttpHeaders::new();
        headers.append("Content-Type", "text/plain");
        assert_eq!(headers.value("content-type"), "text/plain");
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn values_collects_every_match_in_order() {
        let mut headers = HttpHeaders::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        assert_eq!(headers.values("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn remove_drops_every_match() {
        let mut headers = HttpHeaders::new();
        headers.append("X-Foo", "1");
        headers.append("x-foo", "2");
        headers.remove("X-FOO");
        assert!(headers.is_empty());
    }
}
