//! Tiny HTTP server for testing
//!
//! Lives in the library rather than a test module so that unit tests, integration tests
//! and benches can all share it.
use std::net::{SocketAddr, TcpListener as StdListener};
use std::thread;
use std::time::Duration;

use async_std::io;
use async_std::net::{TcpListener, TcpStream};
use async_std::prelude::*;
use async_std::task;
use log::debug;

/// How the server answers each request.
#[derive(Debug, Copy, Clone)]
struct Reply {
    status: u16,
    delay: Duration,
    /// Advertise more body than is sent, then hang up.
    truncate: bool,
}

async fn process(mut stream: TcpStream, reply: Reply) -> io::Result<()> {
    let mut request = Vec::with_capacity(512);
    let mut buf = [0_u8; 1024];

    // read until the end of the request head; GETs carry no body
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    if reply.delay > Duration::default() {
        task::sleep(reply.delay).await;
    }

    let body = b"ok";
    let content_length = if reply.truncate { body.len() + 100 } else { body.len() };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n",
        reply.status,
        reason(reply.status),
        content_length
    );

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;

    Ok(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        301 => "Moved Permanently",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Starts a server on an OS-assigned localhost port that answers every request with
/// `status` after waiting `delay`. Runs until the process exits.
pub fn http_server(status: u16, delay: Duration) -> io::Result<SocketAddr> {
    serve(Reply {
        status,
        delay,
        truncate: false,
    })
}

/// Like `http_server`, but every response promises a longer body than it delivers, so
/// clients see the status and then fail while reading the body.
pub fn truncating_server(status: u16) -> io::Result<SocketAddr> {
    serve(Reply {
        status,
        delay: Duration::default(),
        truncate: true,
    })
}

fn serve(reply: Reply) -> io::Result<SocketAddr> {
    // bind, return the port that the OS auto-assigns
    let listener: TcpListener = task::block_on(async { TcpListener::bind("127.0.0.1:0").await })?;

    let addr = listener.local_addr()?;

    // spin off a thread to start listening
    thread::spawn(move || {
        task::block_on(async move {
            let mut incoming = listener.incoming();
            while let Some(stream) = incoming.next().await {
                match stream {
                    Ok(stream) => {
                        task::spawn(async move {
                            if let Err(e) = process(stream, reply).await {
                                debug!("test server connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => debug!("test server accept error: {}", e),
                }
            }
        })
    });

    Ok(addr)
}

/// A localhost address with nothing listening on it, so connecting is refused.
pub fn unused_addr() -> io::Result<SocketAddr> {
    let listener = StdListener::bind("127.0.0.1:0")?;
    listener.local_addr()
}
