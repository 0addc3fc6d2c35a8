//! End-to-end scenarios: echo over TCP, UDP send/recv,
//! cancellation of an in-flight `accept`, and a timed-out `recvfrom`.

use std::rc::Rc;
use std::time::Duration;

use wisp_core::combinators::with_timeout;
use wisp_core::executor::LocalExecutor;
use wisp_core::task::Task;
use wisp_reactor::backend::epoll::EpollBackend;
use wisp_reactor::{DescriptorKind, IoHandle, IpEndpoint};

fn new_context(exec: &Rc<LocalExecutor>) -> Rc<wisp_reactor::IoContext> {
    let backend = EpollBackend::new().expect("epoll_create1 failed");
    wisp_reactor::install(exec, backend)
}

#[test]
fn echo_over_tcp() {
    let exec = LocalExecutor::new();
    let ctx = new_context(&exec);

    let result = exec.block_on(async move {
        let listener = IoHandle::bind(ctx.clone(), IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap();
        let local = listener.local_addr().unwrap();

        let server = wisp_core::spawn::spawn(async move {
            let (stream, _peer) = listener.accept().await?;
            let mut buf = [0u8; 64];
            let mut total = Vec::new();
            loop {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                total.extend_from_slice(&buf[..n]);
            }
            Ok(total)
        });

        let client = IoHandle::<std::net::TcpStream>::connect(ctx.clone(), local).await.unwrap();
        client.write_all(b"Hello, World!").await.unwrap();
        client.shutdown().unwrap();
        drop(client);

        server.await
    });

    assert_eq!(result.unwrap(), b"Hello, World!".to_vec());
}

#[test]
fn udp_send_recv() {
    let exec = LocalExecutor::new();
    let ctx = new_context(&exec);

    let (received, from) = exec.block_on(async move {
        let a = IoHandle::<std::net::UdpSocket>::bind(ctx.clone(), IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap();
        let b = IoHandle::<std::net::UdpSocket>::bind(ctx.clone(), IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();

        a.sendto(b"Hello, World!", b_addr).await.unwrap();
        let mut buf = [0u8; 64];
        let (n, from) = b.recvfrom(&mut buf).await.unwrap();
        let _ = a_addr;
        (buf[..n].to_vec(), from)
    });

    assert_eq!(received, b"Hello, World!".to_vec());
    let _ = from;
}

#[test]
fn accept_cancellation_resolves_stopped() {
    let exec = LocalExecutor::new();
    let ctx = new_context(&exec);

    let stopped = exec.block_on(async move {
        let listener = Rc::new(IoHandle::bind(ctx, IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap());
        let listener_for_task = listener.clone();
        let handle = wisp_core::spawn::spawn(async move {
            listener_for_task.accept().await.map(|_| ())
        });
        handle.request_stop();
        handle.await
    });

    assert!(stopped.is_err());
    assert!(stopped.unwrap_err().is_canceled());
}

#[test]
fn recv_timeout_fires() {
    let exec = LocalExecutor::new();
    let ctx = new_context(&exec);

    let result = exec.block_on(async move {
        let socket = IoHandle::<std::net::UdpSocket>::bind(ctx, IpEndpoint::from_str("127.0.0.1:0").unwrap()).unwrap();
        let task = Task::new(async move {
            let mut buf = [0u8; 16];
            socket.recvfrom(&mut buf).await.map(|(n, _)| n)
        });
        with_timeout(task, Duration::from_millis(20)).await
    });

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().code(), wisp_core::error::Code::TimedOut);
}
