use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use http::{Method, StatusCode};
use hypersession::client::conn::transport::tcp::TcpTransport;
use hypersession::client::{Builder, ClientSession, Error};
use hypersession::message::{Request, Response};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A request as seen by the test server.
#[derive(Debug)]
struct Received {
    head: String,
    body: Vec<u8>,
}

impl Received {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }
}

fn read_request(reader: &mut BufReader<TcpStream>) -> io::Result<Option<Received>> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        head.push_str(&line);
        if line == "\r\n" {
            break;
        }
    }

    let lower = head.to_ascii_lowercase();
    let mut body = Vec::new();
    if lower.contains("transfer-encoding: chunked") {
        loop {
            let mut size = String::new();
            reader.read_line(&mut size)?;
            let size = usize::from_str_radix(size.trim(), 16).map_err(io::Error::other)?;
            let mut chunk = vec![0; size + 2];
            reader.read_exact(&mut chunk)?;
            if size == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..size]);
        }
    } else if let Some(length) = lower
        .lines()
        .find_map(|line| line.strip_prefix("content-length: "))
    {
        let length: usize = length.trim().parse().map_err(io::Error::other)?;
        body.resize(length, 0);
        reader.read_exact(&mut body)?;
    }

    Ok(Some(Received { head, body }))
}

/// Serve `connections` connections, answering each request with `respond`.
fn serve<F>(
    connections: usize,
    respond: F,
) -> Result<(SocketAddr, JoinHandle<Vec<Vec<Received>>>), BoxError>
where
    F: Fn(&Received) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..connections {
            let (stream, _) = listener.accept().expect("accept");
            let mut writer = stream.try_clone().expect("clone stream");
            let mut reader = BufReader::new(stream);
            let mut requests = Vec::new();
            while let Ok(Some(request)) = read_request(&mut reader) {
                let response = respond(&request);
                writer.write_all(response.as_bytes()).expect("write response");
                requests.push(request);
                if response.contains("Connection: close") {
                    break;
                }
            }
            seen.push(requests);
        }
        seen
    });

    Ok((addr, handle))
}

fn session(addr: SocketAddr) -> ClientSession<TcpTransport> {
    Builder::new()
        .with_host(addr.ip().to_string())
        .with_port(addr.port())
        .with_keep_alive(true)
        .with_timeout(Duration::from_secs(5))
        .build(TcpTransport::default())
}

fn ok(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

#[test]
fn keep_alive_reuses_connection() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let (addr, server) = serve(1, |request| ok(request.request_line()))?;
    let mut session = session(addr);

    for path in ["/one", "/two"] {
        let mut request = Request::new(Method::GET, path);
        session.send_request(&mut request)?;

        let mut response = Response::default();
        let mut body = String::new();
        session
            .receive_response(&mut response)?
            .read_to_string(&mut body)?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body, format!("GET {path} HTTP/1.1"));
    }

    session.reset();
    let seen = server.join().expect("server thread");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 2);
    Ok(())
}

#[test]
fn keep_alive_timeout_opens_new_connection() -> Result<(), BoxError> {
    let (addr, server) = serve(2, |_| ok("fresh"))?;
    let mut session = session(addr);
    session.set_keep_alive_timeout(Duration::ZERO);

    for _ in 0..2 {
        session.send_request(&mut Request::default())?;
        let mut body = String::new();
        session
            .receive_response(&mut Response::default())?
            .read_to_string(&mut body)?;
        assert_eq!(body, "fresh");
    }

    session.reset();
    let seen = server.join().expect("server thread");
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|requests| requests.len() == 1));
    Ok(())
}

#[test]
fn fixed_length_upload() -> Result<(), BoxError> {
    let (addr, server) = serve(1, |request| ok(&format!("{} bytes", request.body.len())))?;
    let mut session = session(addr);

    let mut request = Request::new(Method::POST, "/upload");
    request.set_content_length(11);
    session.send_request(&mut request)?.write_all(b"hello world")?;

    let mut body = String::new();
    session
        .receive_response(&mut Response::default())?
        .read_to_string(&mut body)?;
    assert_eq!(body, "11 bytes");

    session.reset();
    let seen = server.join().expect("server thread");
    assert_eq!(seen[0][0].body, b"hello world");
    Ok(())
}

#[test]
fn chunked_upload() -> Result<(), BoxError> {
    let (addr, server) = serve(1, |request| ok(&String::from_utf8_lossy(&request.body)))?;
    let mut session = session(addr);

    let mut request = Request::new(Method::PUT, "/stream");
    request.set_chunked_transfer_encoding(true);
    {
        let mut body = session.send_request(&mut request)?;
        body.write_all(b"first ")?;
        body.write_all(b"second")?;
        body.finish()?;
    }

    let mut body = String::new();
    session
        .receive_response(&mut Response::default())?
        .read_to_string(&mut body)?;
    assert_eq!(body, "first second");

    session.reset();
    server.join().expect("server thread");
    Ok(())
}

#[test]
fn chunked_download() -> Result<(), BoxError> {
    let (addr, server) = serve(1, |_| {
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"
            .to_owned()
    })?;
    let mut session = session(addr);

    session.send_request(&mut Request::default())?;
    let mut body = String::new();
    session
        .receive_response(&mut Response::default())?
        .read_to_string(&mut body)?;
    assert_eq!(body, "Wikipedia");
    assert!(!session.must_reconnect());

    session.reset();
    server.join().expect("server thread");
    Ok(())
}

#[test]
fn close_delimited_download() -> Result<(), BoxError> {
    let (addr, server) = serve(1, |_| {
        "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nall of it".to_owned()
    })?;
    let mut session = session(addr);

    session.send_request(&mut Request::default())?;
    let mut body = String::new();
    session
        .receive_response(&mut Response::default())?
        .read_to_string(&mut body)?;
    assert_eq!(body, "all of it");
    assert!(session.must_reconnect());

    server.join().expect("server thread");
    Ok(())
}

#[test]
fn head_ignores_content_length() -> Result<(), BoxError> {
    let (addr, server) = serve(1, |_| {
        "HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n".to_owned()
    })?;
    let mut session = session(addr);

    session.send_request(&mut Request::new(Method::HEAD, "/"))?;
    let mut response = Response::default();
    let mut body = Vec::new();
    session
        .receive_response(&mut response)?
        .read_to_end(&mut body)?;

    assert_eq!(response.content_length(), Some(500));
    assert!(body.is_empty());

    session.reset();
    server.join().expect("server thread");
    Ok(())
}

#[test]
fn connection_refused() -> Result<(), BoxError> {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };

    let mut session = session(addr);
    let err = session.send_request(&mut Request::default()).unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(!session.connected());
    Ok(())
}

#[test]
fn server_closes_before_responding() -> Result<(), BoxError> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream);
        let _ = read_request(&mut reader);
    });

    let mut session = session(addr);
    session.send_request(&mut Request::default())?;
    server.join().expect("server thread");

    let err = session
        .receive_response(&mut Response::default())
        .unwrap_err();
    assert!(err.is_network());
    assert!(!session.connected());
    Ok(())
}
