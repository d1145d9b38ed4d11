use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use http::StatusCode;
use hypersession::client::conn::transport::tcp::TcpTransport;
use hypersession::client::{Builder, ClientSession, Error, ProxyConfig, SessionFactory};
use hypersession::message::{Request, Response};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn read_head(reader: &mut BufReader<TcpStream>) -> std::io::Result<String> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            return Ok(head);
        }
        head.push_str(&line);
    }
}

/// Accept one connection and run `script` on it, returning every request head it read.
fn one_connection<F>(script: F) -> Result<(SocketAddr, JoinHandle<Vec<String>>), BoxError>
where
    F: FnOnce(&mut BufReader<TcpStream>, &mut TcpStream) -> Vec<String> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut writer = stream.try_clone().expect("clone stream");
        let mut reader = BufReader::new(stream);
        script(&mut reader, &mut writer)
    });
    Ok((addr, handle))
}

fn session(host: &str, port: u16, proxy: ProxyConfig) -> ClientSession<TcpTransport> {
    Builder::new()
        .with_host(host)
        .with_port(port)
        .with_proxy(proxy)
        .with_timeout(Duration::from_secs(5))
        .build(TcpTransport::default())
}

#[test]
fn forward_proxy_receives_absolute_target() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let (proxy, server) = one_connection(|reader, writer| {
        let head = read_head(reader).expect("request head");
        writer
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nproxied")
            .expect("write response");
        vec![head]
    })?;

    let config = ProxyConfig::new(proxy.ip().to_string(), proxy.port())
        .with_credentials("user", "secret")
        .with_non_proxy_hosts(r"internal\.example\.com")?;
    let mut session = session("public.example.com", 80, config);

    session.send_request(&mut Request::new(http::Method::GET, "/path"))?;
    let mut body = String::new();
    session
        .receive_response(&mut Response::default())?
        .read_to_string(&mut body)?;
    assert_eq!(body, "proxied");

    let heads = server.join().expect("proxy thread");
    assert!(heads[0].starts_with("GET http://public.example.com:80/path HTTP/1.1\r\n"));
    assert!(heads[0].contains("proxy-authorization: Basic dXNlcjpzZWNyZXQ=\r\n"));
    assert!(heads[0].contains("host: public.example.com\r\n"));
    Ok(())
}

#[test]
fn bypassed_host_is_reached_directly() -> Result<(), BoxError> {
    let (origin, server) = one_connection(|reader, writer| {
        let head = read_head(reader).expect("request head");
        writer
            .write_all(b"HTTP/1.1 204 No Content\r\n\r\n")
            .expect("write response");
        vec![head]
    })?;

    let unused = {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };
    let config = ProxyConfig::new(unused.ip().to_string(), unused.port())
        .with_credentials("user", "secret")
        .with_non_proxy_hosts(r"127\.0\.0\.1")?;
    let mut session = session(&origin.ip().to_string(), origin.port(), config);
    assert!(session.bypass_proxy());

    session.send_request(&mut Request::new(http::Method::GET, "/path"))?;
    let mut response = Response::default();
    session.receive_response(&mut response)?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let heads = server.join().expect("origin thread");
    assert!(heads[0].starts_with("GET /path HTTP/1.1\r\n"));
    assert!(!heads[0].contains("proxy-authorization"));
    Ok(())
}

#[test]
fn connect_tunnel_carries_requests() -> Result<(), BoxError> {
    let (proxy, server) = one_connection(|reader, writer| {
        let connect = read_head(reader).expect("connect head");
        writer
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .expect("write tunnel response");

        let request = read_head(reader).expect("tunnelled head");
        writer
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\ntunnelled")
            .expect("write response");
        vec![connect, request]
    })?;

    let config = ProxyConfig::new(proxy.ip().to_string(), proxy.port());
    let mut session = Builder::new()
        .with_host("target.example.com")
        .with_port(443)
        .with_proxy(config)
        .with_tunnel(true)
        .build(TcpTransport::default());

    session.send_request(&mut Request::new(http::Method::GET, "/secret"))?;
    let mut body = String::new();
    session
        .receive_response(&mut Response::default())?
        .read_to_string(&mut body)?;
    assert_eq!(body, "tunnelled");

    let heads = server.join().expect("proxy thread");
    assert!(heads[0].starts_with("CONNECT target.example.com:443 HTTP/1.1\r\n"));
    assert!(heads[0].contains("proxy-connection: keep-alive\r\n"));
    assert!(heads[1].starts_with("GET /secret HTTP/1.1\r\n"));
    assert!(heads[1].contains("host: target.example.com:443\r\n"));
    Ok(())
}

#[test]
fn rejected_tunnel_is_a_proxy_error() -> Result<(), BoxError> {
    let (proxy, server) = one_connection(|reader, writer| {
        let connect = read_head(reader).expect("connect head");
        writer
            .write_all(
                b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n",
            )
            .expect("write response");
        vec![connect]
    })?;

    let factory = SessionFactory::with_proxy(ProxyConfig::new(
        proxy.ip().to_string(),
        proxy.port(),
    ));
    let mut session = factory.session(TcpTransport::default(), "target.example.com", 443);

    let err = session.proxy_tunnel().unwrap_err();
    match err {
        Error::Proxy { status, reason } => {
            assert_eq!(status, StatusCode::PROXY_AUTHENTICATION_REQUIRED);
            assert_eq!(reason, "Proxy Authentication Required");
        }
        other => return Err(other.into()),
    }
    assert!(!session.connected());

    server.join().expect("proxy thread");
    Ok(())
}
