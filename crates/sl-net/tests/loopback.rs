use sl_net::ProxyClient;
use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::thread;

/// Serves one canned response and hands back the raw request head.
fn serve_once(response: Vec<u8>) -> (String, thread::JoinHandle<String>) {
    let listener = match TcpListener::bind("127.0.0.1:0") {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    };
    let address = match listener.local_addr() {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    };

    let handle = thread::spawn(move || {
        let (mut socket, _) = match listener.accept() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let mut head = Vec::new();
        let mut byte = [0_u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match socket.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => head.push(byte[0]),
                Err(error) => panic!("{error}"),
            }
        }
        if let Err(error) = socket.write_all(&response) {
            panic!("{error}");
        }
        String::from_utf8_lossy(&head).into_owned()
    });

    (format!("http://{address}"), handle)
}

#[test]
fn fetches_page_from_loopback_proxy() {
    let body = "<html><body><h1>Hi</h1></body></html>";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let (origin, handle) = serve_once(response.into_bytes());

    let client = ProxyClient::default();
    let fetched = match client.get(&format!("{origin}/site/index.html?t=42")) {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    };
    let head = match handle.join() {
        Ok(value) => value,
        Err(_) => panic!("server thread panicked"),
    };

    assert!(fetched.status.is_success());
    assert_eq!(fetched.text(), body);
    assert!(head.starts_with("GET /site/index.html?t=42 HTTP/1.1\r\n"));
    assert!(head.contains("Connection: close\r\n"));
}

#[test]
fn surfaces_non_success_status() {
    let (origin, handle) =
        serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found".to_vec());

    let client = ProxyClient::default();
    let fetched = match client.get(&format!("{origin}/site/missing.html")) {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    };
    let _ = handle.join();

    assert_eq!(fetched.status.as_u16(), 404);
    match fetched.error_for_status() {
        Ok(_) => panic!("404 treated as success"),
        Err(error) => assert_eq!(error.code, "net.http.status"),
    }
}

#[test]
fn refused_connection_is_a_transport_error() {
    let address = match TcpListener::bind("127.0.0.1:0").and_then(|listener| listener.local_addr()) {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    };

    let client = ProxyClient::default();
    match client.get(&format!("http://{address}/site/index.html")) {
        Ok(_) => panic!("request to a closed port succeeded"),
        Err(error) => assert!(error.is_within("net.transport"), "{error}"),
    }
}
