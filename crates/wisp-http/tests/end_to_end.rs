//! End-to-end scenarios exercising `HttpSession` against a real loopback
//! TCP listener: chunked-encoding GET (spec §8 scenario 3) and a redirect
//! chain, both followed and unfollowed (scenario 4).

use std::rc::Rc;

use wisp_core::executor::LocalExecutor;
use wisp_http::HttpSession;
use wisp_reactor::backend::epoll::EpollBackend;
use wisp_reactor::{IoHandle, IpEndpoint};

fn new_context(exec: &Rc<LocalExecutor>) -> Rc<wisp_reactor::IoContext> {
    let backend = EpollBackend::new().expect("epoll_create1 failed");
    wisp_reactor::install(exec, backend)
}

/// Accepts one connection, ignores the request line and headers, writes
/// `response` verbatim, then closes. Good enough for a test double: the
/// client under test never pipelines.
async fn serve_once(listener: &IoHandle<std::net::TcpListener>, response: &[u8]) {
    let (conn, _peer) = listener.accept().await.unwrap();
    drain_request(&conn).await;
    conn.write_all(response).await.unwrap();
}

async fn drain_request(conn: &IoHandle<std::net::TcpStream>) {
    let mut buf = [0u8; 4096];
    let mut seen = Vec::new();
    loop {
        let n = conn.read(&mut buf).await.unwrap();
        seen.extend_from_slice(&buf[..n]);
        if seen.windows(4).any(|w| w == b"\r\n\r\n") || n == 0 {
            break;
        }
    }
}

#[test]
fn chunked_get_returns_reassembled_body() {
    let exec = LocalExecutor::new();
    let ctx = new_context(&exec);

    let body = exec.block_on(async move {
        let listener = IoHandle::bind(ctx.clone(), IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap();
        let local = listener.local_addr().unwrap();

        let server = wisp_core::spawn::spawn(async move {
            let reply = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n7\r\n, World\r\n1\r\n!\r\n0\r\n\r\n";
            serve_once(&listener, reply).await;
            Ok(())
        });

        let session = HttpSession::new(ctx.clone());
        let mut got = session
            .get(&format!("http://127.0.0.1:{}/", local.as_socket_addr().port()))
            .await
            .unwrap();
        assert_eq!(got.status, 200);
        let body = got.read_to_end().await.unwrap();
        server.await.unwrap();
        body
    });

    assert_eq!(body, b"Hello, World!".to_vec());
}

#[test]
fn redirect_chain_is_followed_by_default() {
    let exec = LocalExecutor::new();
    let ctx = new_context(&exec);

    let (status, body) = exec.block_on(async move {
        let listener = IoHandle::bind(ctx.clone(), IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap();
        let local = listener.local_addr().unwrap();
        let port = local.as_socket_addr().port();

        let server = wisp_core::spawn::spawn(async move {
            let redirect =
                format!("HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:{port}/b\r\nContent-Length: 0\r\n\r\n");
            serve_once(&listener, redirect.as_bytes()).await;
            serve_once(&listener, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
            Ok(())
        });

        let session = HttpSession::new(ctx.clone());
        let mut got = session.get(&format!("http://127.0.0.1:{port}/a")).await.unwrap();
        let status = got.status;
        let body = got.read_to_end().await.unwrap();
        server.await.unwrap();
        (status, body)
    });

    assert_eq!(status, 200);
    assert_eq!(body, b"ok".to_vec());
}

#[test]
fn redirect_is_returned_unfollowed_when_budget_is_zero() {
    let exec = LocalExecutor::new();
    let ctx = new_context(&exec);

    let status = exec.block_on(async move {
        let listener = IoHandle::bind(ctx.clone(), IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap();
        let local = listener.local_addr().unwrap();
        let port = local.as_socket_addr().port();

        let server = wisp_core::spawn::spawn(async move {
            let redirect =
                format!("HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:{port}/b\r\nContent-Length: 0\r\n\r\n");
            serve_once(&listener, redirect.as_bytes()).await;
            Ok(())
        });

        let session = HttpSession::builder().max_redirects(0).build(ctx.clone());
        let got = session.get(&format!("http://127.0.0.1:{port}/a")).await.unwrap();
        let status = got.status;
        server.await.unwrap();
        status
    });

    assert_eq!(status, 302);
}
