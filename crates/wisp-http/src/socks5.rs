//! SOCKS5 `CONNECT` tunneling for proxy support: method negotiation,
//! no-auth only, `CONNECT` with IPv4/IPv6/domain address types (RFC 1928).

use wisp_core::error::{categories, Code, Error};
use wisp_core::Result;
use wisp_stream::AsyncStream;

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NONE_ACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// The RFC 1928 §6 `REP` reply-code taxonomy, named rather than surfaced
/// as a bare byte so a caller inspecting an error can tell "the proxy is
/// unreachable" from "the proxy reached the target and the target
/// refused". Converts into [`wisp_core::Error`] at the one boundary this
/// module has with the rest of the stack ([`Socks5ReplyError::into_error`]).
#[derive(Debug, thiserror::Error)]
enum Socks5ReplyError {
    #[error("SOCKS5 proxy reported a general server failure")]
    GeneralFailure,
    #[error("SOCKS5 proxy denied the connection by ruleset")]
    ConnectionNotAllowed,
    #[error("SOCKS5 proxy could not reach the target network")]
    NetworkUnreachable,
    #[error("SOCKS5 proxy could not reach the target host")]
    HostUnreachable,
    #[error("SOCKS5 proxy reports the target connection was refused")]
    ConnectionRefused,
    #[error("SOCKS5 proxy reports the target TTL expired")]
    TtlExpired,
    #[error("SOCKS5 proxy does not support this command")]
    CommandNotSupported,
    #[error("SOCKS5 proxy does not support this address type")]
    AddressTypeNotSupported,
    #[error("SOCKS5 proxy returned unrecognized reply code {0:#04x}")]
    Unrecognized(u8),
}

impl Socks5ReplyError {
    fn from_reply_code(code: u8) -> Self {
        match code {
            0x01 => Socks5ReplyError::GeneralFailure,
            0x02 => Socks5ReplyError::ConnectionNotAllowed,
            0x03 => Socks5ReplyError::NetworkUnreachable,
            0x04 => Socks5ReplyError::HostUnreachable,
            0x05 => Socks5ReplyError::ConnectionRefused,
            0x06 => Socks5ReplyError::TtlExpired,
            0x07 => Socks5ReplyError::CommandNotSupported,
            0x08 => Socks5ReplyError::AddressTypeNotSupported,
            other => Socks5ReplyError::Unrecognized(other),
        }
    }

    /// Most RFC 1928 failure reasons are network-shaped (the proxy
    /// relayed a connect failure on our behalf), not a SOCKS protocol
    /// violation; only the handful that mean the proxy itself refused to
    /// cooperate map to [`categories::SOCKS5`].
    fn into_error(self) -> Error {
        let code = match &self {
            Socks5ReplyError::NetworkUnreachable => Code::NetworkUnreachable,
            Socks5ReplyError::HostUnreachable => Code::HostUnreachable,
            Socks5ReplyError::ConnectionRefused => Code::ConnectionRefused,
            _ => Code::Socks5Unknown,
        };
        let category = if code == Code::Socks5Unknown { categories::SOCKS5 } else { categories::SOCKET };
        Error::new(category, code).with_source(self)
    }
}

/// Negotiates no-auth and issues a `CONNECT` for `(host, port)` over
/// `transport`, matching `Socks5Client::connectProxy`/`_connect`. On
/// success the caller's transport is a raw byte pipe to the target,
/// ready to be wrapped in `wisp_stream::TlsStream` if the endpoint is
/// `https`.
pub async fn connect<S: AsyncStream>(transport: &S, host: &str, port: u16) -> Result<()> {
    negotiate_method(transport).await?;
    send_connect_request(transport, host, port).await?;
    read_connect_reply(transport).await?;
    Ok(())
}

async fn negotiate_method<S: AsyncStream>(transport: &S) -> Result<()> {
    let request = [VERSION, 1, METHOD_NO_AUTH];
    write_all(transport, &request).await?;

    let mut reply = [0u8; 2];
    read_exact(transport, &mut reply).await?;
    if reply[0] != VERSION {
        return Err(socks5_error("unexpected SOCKS version in method reply"));
    }
    if reply[1] == METHOD_NONE_ACCEPTABLE {
        return Err(Error::new(categories::SOCKS5, Code::Socks5AuthenticationFailed)
            .with_message("proxy rejected no-auth method"));
    }
    if reply[1] != METHOD_NO_AUTH {
        return Err(socks5_error("proxy selected an unsupported auth method"));
    }
    Ok(())
}

async fn send_connect_request<S: AsyncStream>(transport: &S, host: &str, port: u16) -> Result<()> {
    let mut request = vec![VERSION, CMD_CONNECT, 0x00];
    if let Ok(ipv4) = host.parse::<std::net::Ipv4Addr>() {
        request.push(ATYP_IPV4);
        request.extend_from_slice(&ipv4.octets());
    } else if let Ok(ipv6) = host.parse::<std::net::Ipv6Addr>() {
        request.push(ATYP_IPV6);
        request.extend_from_slice(&ipv6.octets());
    } else {
        if host.len() > 255 {
            return Err(socks5_error("hostname too long for SOCKS5 domain address"));
        }
        request.push(ATYP_DOMAIN);
        request.push(host.len() as u8);
        request.extend_from_slice(host.as_bytes());
    }
    request.extend_from_slice(&port.to_be_bytes());
    write_all(transport, &request).await
}

async fn read_connect_reply<S: AsyncStream>(transport: &S) -> Result<()> {
    let mut head = [0u8; 4];
    read_exact(transport, &mut head).await?;
    if head[0] != VERSION {
        return Err(socks5_error("unexpected SOCKS version in connect reply"));
    }
    if head[1] != 0x00 {
        return Err(Socks5ReplyError::from_reply_code(head[1]).into_error());
    }

    // The bound address the proxy reports is discarded, matching
    // `Socks5Client::_connect` — callers already know the real target.
    let addr_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len_byte = [0u8; 1];
            read_exact(transport, &mut len_byte).await?;
            len_byte[0] as usize
        }
        _ => return Err(socks5_error("unrecognized address type in connect reply")),
    };
    let mut discard = vec![0u8; addr_len + 2];
    read_exact(transport, &mut discard).await?;
    Ok(())
}

async fn write_all<S: AsyncStream>(transport: &S, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = transport.write(buf).await?;
        buf = &buf[n..];
    }
    Ok(())
}

async fn read_exact<S: AsyncStream>(transport: &S, mut buf: &mut [u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = transport.read(buf).await?;
        if n == 0 {
            return Err(socks5_error("connection closed mid-handshake"));
        }
        buf = &mut buf[n..];
    }
    Ok(())
}

fn socks5_error(message: &'static str) -> Error {
    Error::new(categories::SOCKS5, Code::Socks5Unknown).with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use wisp_core::executor::LocalExecutor;
    use wisp_core::future::LocalBoxFuture;

    struct ScriptedStream {
        read_data: RefCell<VecDeque<u8>>,
        written: RefCell<Vec<u8>>,
    }

    impl ScriptedStream {
        fn new(data: &[u8]) -> Self {
            ScriptedStream {
                read_data: RefCell::new(data.iter().copied().collect()),
                written: RefCell::new(Vec::new()),
            }
        }
    }

    impl AsyncStream for ScriptedStream {
        fn read<'a>(&'a self, buf: &'a mut [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                let mut data = self.read_data.borrow_mut();
                let n = buf.len().min(data.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = data.pop_front().unwrap();
                }
                Ok(n)
            })
        }

        fn write<'a>(&'a self, buf: &'a [u8]) -> LocalBoxFuture<'a, Result<usize>> {
            Box::pin(async move {
                self.written.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            })
        }

        fn flush<'a>(&'a self) -> LocalBoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn connects_through_a_no_auth_proxy_to_an_ipv4_target() {
        let exec = LocalExecutor::new();
        // method-select reply: version 5, no-auth chosen
        // connect reply: version 5, succeeded, rsv, atyp=ipv4, 4 addr bytes, 2 port bytes
        let mut script = vec![0x05, 0x00];
        script.extend_from_slice(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
        let stream = ScriptedStream::new(&script);

        let result = exec.block_on(async { connect(&stream, "93.184.216.34", 443).await });
        assert!(result.is_ok());

        let written = stream.written.borrow();
        assert_eq!(&written[..3], &[0x05, 0x01, 0x00]);
        assert_eq!(written[3], ATYP_IPV4);
    }

    #[test]
    fn rejects_a_domain_that_does_not_fit_in_one_byte_length() {
        let exec = LocalExecutor::new();
        // only the method-select reply; the domain-length check should
        // fail before any connect request is ever written.
        let stream = ScriptedStream::new(&[0x05, 0x00]);
        let host = "a".repeat(256);
        let result = exec.block_on(async { connect(&stream, &host, 80).await });
        assert!(result.is_err());
        assert!(stream.written.borrow().is_empty());
    }
}
