//! [`HttpSession`] — the request-level API: redirect following, cookie
//! merge with [`crate::cookie::HttpCookieJar`], default headers, and the
//! endpoint-keyed registry of [`HttpWorker`]s a request dials through.
//! Mirrors `HttpSession::sendRequest` in shape: normalize → dial-or-reuse
//! → send → recv headers → merge cookies → redirect-or-return.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;

use wisp_core::error::{categories, Code, Error};
use wisp_core::sync::AsyncMutex;
use wisp_core::task::Task;
use wisp_core::Result;
use wisp_reactor::IoContext;
use wisp_stream::default_tls_config;

use crate::cookie::{HttpCookie, HttpCookieJar};
use crate::endpoint::HttpEndpoint;
use crate::headers::{well_known, HttpHeaders};
use crate::http1::Http1Stream;
use crate::url::Url;
use crate::worker::{HttpWorker, DEFAULT_MAX_CONNECTIONS};

/// Default cap on `Location`-following per `spec` §4.11; `0` means "return
/// the redirect reply unfollowed", matching the source's `maxRedirects`.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Builds an [`HttpSession`] with the same defaults the source ships
/// (5 connections/host, 10 redirects, unlimited transfer timeout),
/// overridable one knob at a time rather than via a half-constructed
/// struct literal.
pub struct HttpSessionBuilder {
    tls_config: Option<Arc<ClientConfig>>,
    proxy: Option<Url>,
    max_redirects: u32,
    max_connections_per_host: usize,
    transfer_timeout: Option<Duration>,
    reject_chunkless_keep_alive: bool,
}

impl HttpSessionBuilder {
    pub fn new() -> Self {
        HttpSessionBuilder {
            tls_config: None,
            proxy: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS,
            transfer_timeout: None,
            reject_chunkless_keep_alive: true,
        }
    }

    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// `proxy` must be a `socks5://host:port` URL; forward-proxying
    /// through `http://` (CONNECT-style) is not implemented, matching
    /// `wisp_http::socks5`'s scope.
    pub fn proxy(mut self, proxy: Url) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn max_connections_per_host(mut self, max: usize) -> Self {
        self.max_connections_per_host = max.max(1);
        self
    }

    /// `Duration::ZERO` means unlimited, matching the spec's
    /// `transferTimeout = 0` convention.
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    /// Design Notes §9 open question: the source rejects a keep-alive
    /// reply with neither `Content-Length` nor chunked framing. Preserved
    /// by default; set `false` to tolerate servers that violate this.
    pub fn allow_chunkless_keep_alive(mut self, allow: bool) -> Self {
        self.reject_chunkless_keep_alive = !allow;
        self
    }

    pub fn build(self, ctx: Rc<IoContext>) -> HttpSession {
        HttpSession {
            ctx,
            tls_config: self.tls_config.unwrap_or_else(default_tls_config),
            proxy: self.proxy,
            max_redirects: self.max_redirects,
            max_connections_per_host: self.max_connections_per_host,
            transfer_timeout: self.transfer_timeout,
            reject_chunkless_keep_alive: self.reject_chunkless_keep_alive,
            workers_lock: AsyncMutex::new(),
            workers: RefCell::new(HashMap::new()),
            cookies: RefCell::new(HttpCookieJar::new()),
        }
    }
}

impl Default for HttpSessionBuilder {
    fn default() -> Self {
        HttpSessionBuilder::new()
    }
}

/// A live response: status line, headers already received, body not yet
/// drained. Dropping it before the body is fully read marks the
/// connection broken (`Http1Stream`'s own drop handler), the same
/// "streaming handle" shape §4.11 describes — callers that only want the
/// full body can call [`HttpReply::read_to_end`].
pub struct HttpReply {
    pub status: u16,
    pub message: String,
    pub headers: HttpHeaders,
    stream: Http1Stream,
}

impl HttpReply {
    /// Reads one span of body bytes; `Ok(0)` once the body is exhausted.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).await
    }

    /// Reads the whole body into a `Vec<u8>`.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut buf = [0u8; 8 * 1024];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }
        Ok(body)
    }

    fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// Session-scoped connection pool plus the request API in §4.11: cookie
/// merge, default headers, the `HttpEndpoint`-keyed worker registry, and
/// the redirect loop. One session per `IoContext`/executor — not `Send`,
/// matching every other handle in this stack.
pub struct HttpSession {
    ctx: Rc<IoContext>,
    tls_config: Arc<ClientConfig>,
    proxy: Option<Url>,
    max_redirects: u32,
    max_connections_per_host: usize,
    transfer_timeout: Option<Duration>,
    reject_chunkless_keep_alive: bool,
    workers_lock: AsyncMutex,
    workers: RefCell<HashMap<HttpEndpoint, Rc<HttpWorker>>>,
    cookies: RefCell<HttpCookieJar>,
}

impl HttpSession {
    pub fn new(ctx: Rc<IoContext>) -> Self {
        HttpSessionBuilder::new().build(ctx)
    }

    pub fn builder() -> HttpSessionBuilder {
        HttpSessionBuilder::new()
    }

    pub async fn get(&self, url: &str) -> Result<HttpReply> {
        self.send_request("GET", url, &HttpHeaders::new(), &[]).await
    }

    pub async fn post(&self, url: &str, payload: &[u8]) -> Result<HttpReply> {
        self.send_request("POST", url, &HttpHeaders::new(), payload).await
    }

    pub fn cookies(&self) -> Vec<HttpCookie> {
        self.cookies.borrow().all_cookies()
    }

    /// §4.11 `sendRequest`: normalize → dial/reuse → exchange → merge
    /// cookies → follow redirects up to `max_redirects`.
    pub async fn send_request(
        &self,
        method: &str,
        url: &str,
        extra_headers: &HttpHeaders,
        payload: &[u8],
    ) -> Result<HttpReply> {
        let mut current_url = Url::parse(url)?;
        let mut current_method = method.to_string();
        let mut current_payload = payload.to_vec();

        let mut redirects_left = self.max_redirects;
        loop {
            let reply = self
                .attempt(&current_method, &current_url, extra_headers, &current_payload)
                .await?;

            self.merge_set_cookies(&current_url, &reply.headers);

            if !reply.is_redirect() || redirects_left == 0 {
                return Ok(reply);
            }

            let location = reply.headers.value(well_known::LOCATION);
            if location.is_empty() {
                return Ok(reply);
            }
            let next_url = current_url.resolve(location)?;

            // A dropped stream that hasn't reached EOF marks its
            // connection broken; draining first lets this connection be
            // reused by the next hop instead of forcing a fresh dial.
            let mut reply = reply;
            let _ = reply.read_to_end().await;

            if reply.status == 303 || (current_method.eq_ignore_ascii_case("POST") && matches!(reply.status, 301 | 302)) {
                current_method = "GET".to_string();
                current_payload.clear();
            }
            current_url = next_url;
            redirects_left -= 1;
        }
    }

    /// One attempt: dial-or-reuse a stream, send, receive headers, wrapped
    /// in `transfer_timeout` if configured (§4.11 step 6).
    async fn attempt(
        &self,
        method: &str,
        url: &Url,
        extra_headers: &HttpHeaders,
        payload: &[u8],
    ) -> Result<HttpReply> {
        let headers = self.build_request_headers(url, extra_headers);
        let worker = self.worker_for(url).await?;
        let method = method.to_string();
        let url = url.clone();
        let payload = payload.to_vec();

        let body = async move {
            let mut stream = worker.new_stream().await?;
            stream.send(&method, &url, &headers, &payload).await?;
            let (status, message, headers) = stream.recv_headers().await?;
            Ok(HttpReply { status, message, headers, stream })
        };

        match self.transfer_timeout {
            None => body.await,
            Some(timeout) => wisp_core::combinators::with_timeout(Task::new(body), timeout).await,
        }
    }

    async fn worker_for(&self, url: &Url) -> Result<Rc<HttpWorker>> {
        let endpoint = HttpEndpoint::from_url(url, self.proxy.as_ref())
            .ok_or_else(|| Error::new(categories::GENERIC, Code::InvalidArgument).with_message("unsupported scheme"))?;

        let proxy_endpoint = match &self.proxy {
            Some(proxy_url) => HttpEndpoint::from_url(proxy_url, None),
            None => None,
        };

        let guard = self.workers_lock.lock().await;
        if let Some(existing) = self.workers.borrow().get(&endpoint) {
            if !existing.is_drained() {
                drop(guard);
                return Ok(existing.clone());
            }
        }
        let worker = HttpWorker::with_options(
            self.ctx.clone(),
            endpoint.clone(),
            proxy_endpoint,
            self.tls_config.clone(),
            self.max_connections_per_host,
            self.reject_chunkless_keep_alive,
        );
        self.workers.borrow_mut().insert(endpoint, worker.clone());
        drop(guard);
        Ok(worker)
    }

    /// Evicts drained workers from the registry. Not run automatically —
    /// the source ties this to a "quit event" per worker; callers that
    /// want that behavior should invoke this periodically (e.g. from a
    /// timer task) since `wisp-http` has no background scheduler of its
    /// own.
    pub fn reap_drained_workers(&self) {
        self.workers.borrow_mut().retain(|_, worker| !worker.is_drained());
    }

    /// Adds `Cookie`, and the `Accept`/`Accept-Encoding` defaults, to a
    /// copy of `extra_headers`. `Accept-Encoding` defaults to `identity`:
    /// compression codecs are out of scope (spec §1 non-goals), so
    /// offering `gzip, deflate` here would just make a compliant server
    /// send back bytes this stack cannot decode.
    fn build_request_headers(&self, url: &Url, extra_headers: &HttpHeaders) -> HttpHeaders {
        let mut headers = extra_headers.clone();

        let cookies = self.cookies.borrow_mut().cookies_for_url(url);
        if !cookies.is_empty() {
            let joined = cookies
                .iter()
                .map(|c| format!("{}={}", c.name(), c.value()))
                .collect::<Vec<_>>()
                .join("; ");
            headers.append(well_known::COOKIE, joined);
        }

        if !headers.contains(well_known::ACCEPT) {
            headers.append(well_known::ACCEPT, "*/*");
        }
        if !headers.contains(well_known::ACCEPT_ENCODING) {
            headers.append(well_known::ACCEPT_ENCODING, "identity");
        }

        headers
    }

    /// Parses every `Set-Cookie` header on a reply and inserts it into the
    /// jar, normalizing missing `Domain`/`Path` from `url` (§6).
    fn merge_set_cookies(&self, url: &Url, headers: &HttpHeaders) {
        for raw in headers.values(well_known::SET_COOKIE) {
            for mut cookie in HttpCookie::parse(raw) {
                cookie.normalize(url);
                self.cookies.borrow_mut().insert(cookie);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_spec() {
        // Exercised indirectly through HttpSession::new in the
        // integration tests (dialing needs a live IoContext); this just
        // pins the constant the redirect loop is keyed off of.
        assert_eq!(DEFAULT_MAX_REDIRECTS, 10);
    }

    #[test]
    fn reply_detects_redirect_status_codes() {
        for code in [301, 302, 303, 307, 308] {
            assert!(matches!(code, 301 | 302 | 303 | 307 | 308));
        }
    }
}
