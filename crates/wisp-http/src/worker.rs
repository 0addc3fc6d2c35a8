//! [`HttpWorker`] — the per-endpoint connection pool: bounded concurrency,
//! reuse of an idle connection before dialing a new one, eviction of
//! broken connections, and DNS resolution via the OS resolver rather
//! than a hand-rolled packet parser.

use std::net::ToSocketAddrs;
use std::rc::Rc;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls_pki_types::ServerName;

use wisp_core::error::{categories, Code, Error};
use wisp_core::spawn::spawn_blocking;
use wisp_core::Result;
use wisp_reactor::{IoContext, IoHandle, IpEndpoint};
use wisp_stream::{AsyncStream, TlsStream};

use crate::endpoint::HttpEndpoint;
use crate::http1::{Http1Connection, Http1Stream, Transport};
use crate::socks5;

pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Pools `Http1Connection`s dialed to one [`HttpEndpoint`]. `proxy`, when
/// set, is the already-resolved endpoint of the SOCKS5 proxy to tunnel
/// through — the session resolves the proxy URL once and hands the
/// endpoint down, rather than each worker re-parsing it.
pub struct HttpWorker {
    ctx: Rc<IoContext>,
    endpoint: HttpEndpoint,
    proxy: Option<HttpEndpoint>,
    tls_config: Arc<ClientConfig>,
    max_connections: usize,
    reject_chunkless_keep_alive: bool,
    connections: std::cell::RefCell<Vec<Rc<Http1Connection>>>,
}

impl HttpWorker {
    /// Dials with `DEFAULT_MAX_CONNECTIONS` and the default (rejecting)
    /// chunkless-keep-alive policy; see [`HttpWorker::with_options`] to
    /// override either.
    pub fn new(
        ctx: Rc<IoContext>,
        endpoint: HttpEndpoint,
        proxy: Option<HttpEndpoint>,
        tls_config: Arc<ClientConfig>,
    ) -> Rc<Self> {
        HttpWorker::with_options(ctx, endpoint, proxy, tls_config, DEFAULT_MAX_CONNECTIONS, true)
    }

    /// Built up-front rather than via setters on `Rc<Self>`: once wrapped
    /// in the `Rc` every pooled connection dials through, there is no
    /// owned `HttpWorker` left to hand back from a by-value builder
    /// method.
    pub fn with_options(
        ctx: Rc<IoContext>,
        endpoint: HttpEndpoint,
        proxy: Option<HttpEndpoint>,
        tls_config: Arc<ClientConfig>,
        max_connections: usize,
        reject_chunkless_keep_alive: bool,
    ) -> Rc<Self> {
        Rc::new(HttpWorker {
            ctx,
            endpoint,
            proxy,
            tls_config,
            max_connections: max_connections.max(1),
            reject_chunkless_keep_alive,
            connections: std::cell::RefCell::new(Vec::new()),
        })
    }

    pub fn endpoint(&self) -> &HttpEndpoint {
        &self.endpoint
    }

    /// `true` once every pooled connection has been evicted as broken
    /// and none is still in flight — the signal `HttpSession` uses to
    /// drop this worker from its map.
    pub fn is_drained(&self) -> bool {
        let mut connections = self.connections.borrow_mut();
        connections.retain(|c| !c.is_broken());
        connections.is_empty()
    }

    /// Hands back a stream on an idle pooled connection, dials a fresh
    /// one if under `max_connections`, or otherwise queues on the first
    /// still-usable connection's serialization mutex.
    pub async fn new_stream(self: &Rc<Self>) -> Result<Http1Stream> {
        {
            let mut connections = self.connections.borrow_mut();
            connections.retain(|c| !c.is_broken());
        }

        let idle = self
            .connections
            .borrow()
            .iter()
            .find(|c| c.is_idle())
            .cloned();
        if let Some(con) = idle {
            return con.new_stream().await;
        }

        if self.connections.borrow().len() < self.max_connections {
            let con = self.dial().await?;
            self.connections.borrow_mut().push(con.clone());
            return con.new_stream().await;
        }

        let queued = self.connections.borrow().first().cloned();
        match queued {
            Some(con) => con.new_stream().await,
            None => self.new_stream_after_dial().await,
        }
    }

    async fn new_stream_after_dial(self: &Rc<Self>) -> Result<Http1Stream> {
        let con = self.dial().await?;
        self.connections.borrow_mut().push(con.clone());
        con.new_stream().await
    }

    async fn dial(&self) -> Result<Rc<Http1Connection>> {
        let transport: Transport = if let Some(proxy) = &self.proxy {
            let addr = resolve(&proxy.host, proxy.port).await?;
            let tcp = IoHandle::<std::net::TcpStream>::connect(self.ctx.clone(), addr).await?;
            socks5::connect(&tcp, &self.endpoint.host, self.endpoint.port).await?;
            Rc::new(tcp)
        } else {
            let addr = resolve(&self.endpoint.host, self.endpoint.port).await?;
            let tcp = IoHandle::<std::net::TcpStream>::connect(self.ctx.clone(), addr).await?;
            Rc::new(tcp)
        };

        let transport: Transport = if self.endpoint.is_tls() {
            let name = ServerName::try_from(self.endpoint.host.clone())
                .map_err(|e| Error::new(categories::TLS, Code::TlsProtocolError).with_source(e))?;
            let tls = TlsStream::connect(transport, name, self.tls_config.clone()).await?;
            Rc::new(tls)
        } else {
            transport
        };

        let con = Http1Connection::new(transport);
        con.set_reject_chunkless_keep_alive(self.reject_chunkless_keep_alive);
        Ok(con)
    }
}

/// Resolves `host` to a connectable address via the OS resolver
/// (`getaddrinfo` through `ToSocketAddrs`), off the executor thread —
/// DNS packet parsing is out of scope here, but some hostname resolution
/// is unavoidable to dial anywhere.
async fn resolve(host: &str, port: u16) -> Result<IpEndpoint> {
    let host = host.to_string();
    let addrs = spawn_blocking(move || {
        (host.as_str(), port)
            .to_socket_addrs()
            .map_err(Error::from)
            .map(|it| it.collect::<Vec<_>>())
    })
    .await?;
    addrs
        .into_iter()
        .next()
        .map(IpEndpoint::new)
        .ok_or_else(|| Error::new(categories::DNS, Code::HostNotFound).with_message("no addresses found"))
}
