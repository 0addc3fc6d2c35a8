//! Stream-layer plumbing shared by the HTTP stack: the [`AsyncStream`]
//! capability trait, a buffering wrapper over it, and a `rustls`-backed
//! TLS adapter.

pub mod buffer;
pub mod stream;
pub mod tls;

pub use buffer::{BufferedStream, StreamBuffer};
pub use stream::AsyncStream;
pub use tls::{default_config as default_tls_config, TlsStream};
