#![allow(clippy::unwrap_used)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use super::*;

fn test_config(base_url: &str, api_key: Option<&str>, timeout: Duration) -> CompletionConfig {
    CompletionConfig {
        base_url: base_url.to_string(),
        model: "test-model".into(),
        api_key: api_key.map(str::to_string),
        timeout,
        temperature: 0.7,
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let body_len = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve exactly one canned HTTP response; the handle yields the raw request.
///
/// The client is blocking and the crate has no async runtime, so this is a
/// plain std listener on its own thread rather than an axum mock server.
fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        request
    });
    (format!("http://{addr}"), handle)
}

const OK_BODY: &str =
    r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"  Cuisinez plus.  "}}]}"#;

// ── parse_completion ──────────────────────────────────────────

#[test]
fn test_parse_completion_takes_first_choice() {
    let body = r#"{"choices":[{"message":{"content":"first"}},{"message":{"content":"second"}}]}"#;
    assert_eq!(parse_completion(body).unwrap(), "first");
}

#[test]
fn test_parse_completion_trims() {
    assert_eq!(parse_completion(OK_BODY).unwrap(), "Cuisinez plus.");
}

#[test]
fn test_parse_completion_malformed_json() {
    let err = parse_completion("<html>oops</html>").unwrap_err();
    assert!(matches!(err, CompletionError::Malformed(_)));
}

#[test]
fn test_parse_completion_no_choices() {
    let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
    assert!(matches!(err, CompletionError::Malformed(_)));
}

#[test]
fn test_parse_completion_null_or_blank_content() {
    let err = parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap_err();
    assert!(matches!(err, CompletionError::Empty));
    let err = parse_completion(r#"{"choices":[{"message":{"content":"   "}}]}"#).unwrap_err();
    assert!(matches!(err, CompletionError::Empty));
}

// ── Request shape ─────────────────────────────────────────────

#[test]
fn test_request_body_shape() {
    let client = OpenAiClient::new(&test_config("http://localhost", None, Duration::from_secs(1))).unwrap();
    let value = serde_json::to_value(client.request_for("Bonjour")).unwrap();
    assert_eq!(value["model"], "test-model");
    assert_eq!(value["messages"][0]["role"], "user");
    assert_eq!(value["messages"][0]["content"], "Bonjour");
    assert!((value["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
}

#[test]
fn test_endpoint_strips_trailing_slash() {
    let client = OpenAiClient::new(&test_config("http://localhost:8080/", None, Duration::from_secs(1))).unwrap();
    assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
}

// ── Round trips against a local server ────────────────────────

#[test]
fn test_complete_success() {
    let (url, server) = serve_once("200 OK", OK_BODY);
    let client = OpenAiClient::new(&test_config(&url, Some("sk-test"), Duration::from_secs(5))).unwrap();

    let text = client.complete("Give me tips").unwrap();
    assert_eq!(text, "Cuisinez plus.");

    let request = server.join().unwrap();
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
    assert!(request.contains("Give me tips"));
}

#[test]
fn test_complete_without_key_sends_no_auth_header() {
    let (url, server) = serve_once("200 OK", OK_BODY);
    let client = OpenAiClient::new(&test_config(&url, None, Duration::from_secs(5))).unwrap();
    client.complete("hi").unwrap();
    let request = server.join().unwrap();
    assert!(!request.to_lowercase().contains("authorization:"));
}

#[test]
fn test_complete_error_status() {
    let (url, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#);
    let client = OpenAiClient::new(&test_config(&url, None, Duration::from_secs(5))).unwrap();

    match client.complete("hi").unwrap_err() {
        CompletionError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }
    server.join().unwrap();
}

#[test]
fn test_complete_malformed_body() {
    let (url, server) = serve_once("200 OK", "not json");
    let client = OpenAiClient::new(&test_config(&url, None, Duration::from_secs(5))).unwrap();
    assert!(matches!(
        client.complete("hi").unwrap_err(),
        CompletionError::Malformed(_)
    ));
    server.join().unwrap();
}

#[test]
fn test_complete_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = OpenAiClient::new(&test_config(
        &format!("http://127.0.0.1:{port}"),
        None,
        Duration::from_secs(2),
    ))
    .unwrap();
    assert!(matches!(
        client.complete("hi").unwrap_err(),
        CompletionError::Http(_)
    ));
}

#[test]
fn test_complete_times_out() {
    // Connections queue in the backlog but nothing ever answers.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let client = OpenAiClient::new(&test_config(&url, None, Duration::from_millis(500))).unwrap();

    match client.complete("hi").unwrap_err() {
        CompletionError::Http(e) => assert!(e.is_timeout()),
        other => panic!("unexpected error: {other}"),
    }
    drop(listener);
}
