//! The HTTP/1.1 client core: the protocol state machine
//! ([`http1::Http1Connection`]/[`http1::Http1Stream`]), the per-endpoint
//! connection pool ([`worker::HttpWorker`]), and the request-level API
//! ([`session::HttpSession`]), plus the minimal collaborator types the
//! session needs ([`url::Url`], [`headers::HttpHeaders`],
//! [`cookie::HttpCookieJar`], [`endpoint::HttpEndpoint`]) and SOCKS5
//! proxy dialing ([`socks5`]).

pub mod cookie;
pub mod endpoint;
pub mod headers;
pub mod http1;
pub mod session;
pub mod socks5;
pub mod url;
pub mod worker;

pub use cookie::{HttpCookie, HttpCookieJar, SameSite};
pub use endpoint::HttpEndpoint;
pub use headers::HttpHeaders;
pub use http1::{Http1Connection, Http1Stream};
pub use session::{HttpReply, HttpSession, HttpSessionBuilder};
pub use url::Url;
pub use worker::HttpWorker;
