// ===========================================================================
// Test Support - Minimal Connect/HTTP server
// ===========================================================================

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

pub const CHANGE_ID: &str = "7f1c3d3e-6a52-4c38-9a3f-2b2f1c0d9e11";
pub const CHANGE_ID_B64: &str = "fxw9PmpSTDiaPysvHA2eEQ==";

pub fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ovm-cli"))
}

/// The binary with a private HOME and no inherited settings
pub fn command(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(binary());
    cmd.env("HOME", home).env_remove("RUST_LOG");
    for var in [
        "OVM_URL",
        "OVM_FRONTEND",
        "OVM_API_KEY",
        "OVM_LOG",
        "OVM_BOOKMARK_URL",
        "OVM_AUTH0_DOMAIN",
        "OVM_AUTH0_CLIENT_ID",
        "OVM_AUTH0_AUDIENCE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Unsigned JWT carrying `scope`
pub fn jwt(scope: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": "api-key|test", "scope": scope }).to_string(),
    );
    format!("{header}.{payload}.c2ln")
}

pub fn uuid_b64(id: &str) -> String {
    let id = uuid::Uuid::parse_str(id).unwrap();
    STANDARD.encode(id.as_bytes())
}

/// One Connect envelope
pub fn envelope(flags: u8, json: &str) -> Vec<u8> {
    let mut out = vec![flags];
    out.extend_from_slice(&(json.len() as u32).to_be_bytes());
    out.extend_from_slice(json.as_bytes());
    out
}

// ---------------------------------------------------------------------------
// Mock Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum Reply {
    /// Status code and JSON body
    Json(u16, String),
    /// Streaming response made of pre-encoded envelopes
    Stream(Vec<Vec<u8>>),
    /// Send streaming headers and then nothing for a long time
    Hang,
    /// Serve these in order; the last one repeats
    Sequence(Vec<Reply>),
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// JSON payload of the first envelope of a streaming request
    pub fn envelope_json(&self) -> serde_json::Value {
        assert!(self.body.len() >= 5, "body too short for an envelope");
        serde_json::from_slice(&self.body[5..]).unwrap()
    }
}

pub struct MockServer {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// Serve `routes` (request path to reply) on an ephemeral port
    pub fn start(routes: Vec<(&str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Mutex<HashMap<String, Reply>>> = Arc::new(Mutex::new(
            routes
                .into_iter()
                .map(|(path, reply)| (path.to_string(), reply))
                .collect(),
        ));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                std::thread::spawn(move || handle(stream, &routes, &recorded));
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_to(&self, path: &str) -> Option<Recorded> {
        self.requests().into_iter().find(|r| r.path == path)
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    /// Poll until a request to `path` arrives
    pub fn wait_for(&self, path: &str, timeout: Duration) -> Option<Recorded> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(found) = self.request_to(path) {
                return Some(found);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }
}

/// Next reply for `path`, advancing sequences
fn next_reply(routes: &Mutex<HashMap<String, Reply>>, path: &str) -> Option<Reply> {
    let mut routes = routes.lock().unwrap();
    match routes.get_mut(path)? {
        Reply::Sequence(replies) if replies.len() > 1 => Some(replies.remove(0)),
        Reply::Sequence(replies) => replies.first().cloned(),
        reply => Some(reply.clone()),
    }
}

fn handle(stream: TcpStream, routes: &Mutex<HashMap<String, Reply>>, recorded: &Mutex<Vec<Recorded>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }

    recorded.lock().unwrap().push(Recorded {
        path: path.clone(),
        headers,
        body,
    });

    let mut stream = stream;
    let reply = next_reply(routes, &path).unwrap_or_else(|| {
        Reply::Json(
            404,
            r#"{"code":"unimplemented","message":"no such procedure"}"#.to_string(),
        )
    });

    match reply {
        Reply::Json(status, body) => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reason(status),
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(body.as_bytes());
        }
        Reply::Stream(frames) => {
            let body: Vec<u8> = frames.concat();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/connect+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
        Reply::Hang => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/connect+json\r\nConnection: close\r\n\r\n";
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.flush();
            std::thread::sleep(Duration::from_secs(30));
        }
        Reply::Sequence(_) => {
            let head = "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            let _ = stream.write_all(head.as_bytes());
        }
    }
    let _ = stream.flush();
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Error",
    }
}
