//! The error taxonomy shared by every layer of the runtime.
//!
//! Mirrors the "category + numeric code" shape used throughout the
//! reactor and HTTP stack: a [`Category`] is an interned, pointer-compared
//! tag (two errors are equal only if both their code and their category
//! agree the categories are the same instance), and [`Error`] pairs a
//! category with a code and an optional human-readable message.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Identifies the subsystem an [`Error`] originated from.
///
/// Categories are `&'static` singletons; comparison is by pointer identity,
/// not by name, so two categories with the same `name()` but built in
/// different places never compare equal — the same comparison rule
/// `std::error_category` uses in C++'s `<system_error>`.
#[derive(Clone, Copy)]
pub struct Category(&'static CategoryDescriptor);

struct CategoryDescriptor {
    name: &'static str,
}

impl Category {
    pub const fn name(&self) -> &'static str {
        self.0.name
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}
impl Eq for Category {}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

macro_rules! category {
    ($ident:ident, $name:expr) => {
        static $ident: CategoryDescriptor = CategoryDescriptor { name: $name };
    };
}

category!(GENERIC, "generic");
category!(SOCKET, "socket");
category!(DNS, "dns");
category!(TLS, "tls");
category!(HTTP, "http");
category!(WEBSOCKET, "websocket");
category!(SOCKS5, "socks5");
category!(CHANNEL, "channel");
category!(RUNTIME, "runtime");
category!(USER, "user");

pub mod categories {
    use super::*;
    pub const GENERIC: Category = Category(&super::GENERIC);
    pub const SOCKET: Category = Category(&super::SOCKET);
    pub const DNS: Category = Category(&super::DNS);
    pub const TLS: Category = Category(&super::TLS);
    pub const HTTP: Category = Category(&super::HTTP);
    pub const WEBSOCKET: Category = Category(&super::WEBSOCKET);
    pub const SOCKS5: Category = Category(&super::SOCKS5);
    pub const CHANNEL: Category = Category(&super::CHANNEL);
    pub const RUNTIME: Category = Category(&super::RUNTIME);
    pub const USER: Category = Category(&super::USER);
}

/// Stable numeric codes. `User` is the start of the user-defined space;
/// callers constructing their own errors should add to it rather than
/// reusing a lower value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i64)]
#[non_exhaustive]
pub enum Code {
    Ok = 0,
    Unknown = 1,

    Canceled = 2,
    Pending = 3,

    ChannelBroken = 10,
    ChannelEmpty = 11,
    ChannelFull = 12,

    AccessDenied = 20,
    AddressInUse = 21,
    AddressNotAvailable = 22,
    ConnectionAborted = 23,
    ConnectionRefused = 24,
    ConnectionReset = 25,
    HostUnreachable = 26,
    InvalidArgument = 27,
    NetworkUnreachable = 28,
    NotConnected = 29,
    TimedOut = 30,
    TooManyOpenFiles = 31,
    WouldBlock = 32,
    BadFileDescriptor = 33,

    HostNotFound = 40,

    TlsHandshakeFailed = 50,
    TlsProtocolError = 51,

    HttpBadReply = 60,
    HttpBadRequest = 61,
    HttpTooManyRedirects = 62,

    WebSocketBadHandshake = 70,
    WebSocketBadFrame = 71,

    Socks5AuthenticationFailed = 80,
    Socks5Unknown = 81,

    RuntimeShutdown = 90,

    User = 1000,
}

/// The error type threaded through every fallible operation in the stack.
///
/// Deliberately not an enum: new categories (a new backend, a new
/// protocol) should not be a breaking change to match on. Code using this
/// crate is expected to match on [`Error::category`]/[`Error::code`], not
/// on a closed set of variants.
#[derive(Clone)]
pub struct Error {
    category: Category,
    code: Code,
    message: Option<Arc<str>>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(category: Category, code: Code) -> Self {
        Error {
            category,
            code,
            message: None,
            source: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<Arc<str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn canceled() -> Self {
        Error::new(categories::RUNTIME, Code::Canceled)
    }

    pub fn is_canceled(&self) -> bool {
        self.code == Code::Canceled
    }

    pub fn timed_out() -> Self {
        Error::new(categories::SOCKET, Code::TimedOut)
    }

    pub fn user(message: impl Into<Arc<str>>) -> Self {
        Error::new(categories::USER, Code::User).with_message(message)
    }

    pub fn http_bad_reply(message: impl Into<Arc<str>>) -> Self {
        Error::new(categories::HTTP, Code::HttpBadReply).with_message(message)
    }

    pub fn http_bad_request(message: impl Into<Arc<str>>) -> Self {
        Error::new(categories::HTTP, Code::HttpBadRequest).with_message(message)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.code == other.code
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("category", &self.category.name())
            .field("code", &self.code)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "[{}] {:?}: {}", self.category.name(), self.code, message),
            None => write!(f, "[{}] {:?}", self.category.name(), self.code),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::ConnectionRefused => Code::ConnectionRefused,
            io::ErrorKind::ConnectionReset => Code::ConnectionReset,
            io::ErrorKind::ConnectionAborted => Code::ConnectionAborted,
            io::ErrorKind::NotConnected => Code::NotConnected,
            io::ErrorKind::AddrInUse => Code::AddressInUse,
            io::ErrorKind::AddrNotAvailable => Code::AddressNotAvailable,
            io::ErrorKind::PermissionDenied => Code::AccessDenied,
            io::ErrorKind::WouldBlock => Code::WouldBlock,
            io::ErrorKind::TimedOut => Code::TimedOut,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Code::InvalidArgument,
            _ => {
                if let Some(raw) = err.raw_os_error() {
                    match raw {
                        libc::EMFILE | libc::ENFILE => Code::TooManyOpenFiles,
                        libc::EBADF => Code::BadFileDescriptor,
                        libc::EHOSTUNREACH => Code::HostUnreachable,
                        libc::ENETUNREACH => Code::NetworkUnreachable,
                        _ => Code::Unknown,
                    }
                } else {
                    Code::Unknown
                }
            }
        };
        Error::new(categories::SOCKET, code).with_message(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_compare_by_identity_not_name() {
        assert_eq!(categories::SOCKET, categories::SOCKET);
        assert_ne!(categories::SOCKET, categories::HTTP);
    }

    #[test]
    fn io_error_would_block_maps_to_would_block() {
        let err: Error = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err.code(), Code::WouldBlock);
    }

    #[test]
    fn errors_with_same_code_and_category_are_equal_regardless_of_message() {
        let a = Error::new(categories::HTTP, Code::HttpBadReply).with_message("a");
        let b = Error::new(categories::HTTP, Code::HttpBadReply).with_message("b");
        assert_eq!(a, b);
    }
}
