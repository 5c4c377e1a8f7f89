// ===========================================================================
// rpc - Connect Protocol Client over HTTP
// ===========================================================================
//
// Unary calls POST a JSON message and read a JSON message back. Server
// streaming calls POST one enveloped message and read envelopes until the
// end-of-stream frame. Blocking HTTP runs on a worker thread so that the
// caller can give up as soon as the context is canceled or expires.

pub mod clients;
pub mod envelope;
pub mod messages;

use std::fmt;
use std::marker::PhantomData;
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::{self, Context};
use envelope::{read_envelope, Envelope};

pub use clients::{ApiKeyClient, BookmarksClient, ChangesClient};

pub type Result<T> = std::result::Result<T, Error>;

const UNARY_CONTENT_TYPE: &str = "application/json";
const STREAM_CONTENT_TYPE: &str = "application/connect+json";
const PROTOCOL_VERSION: &str = "1";
const USER_AGENT: &str = concat!("ovm-cli/", env!("CARGO_PKG_VERSION"));

/// Path prefix the API serves its RPC handlers under
const API_PATH: &str = "/api";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Context(#[from] context::Error),

    #[error("{code}: {message}")]
    Status { code: Code, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an error from a non-200 HTTP response.
    ///
    /// Connect servers send `{"code", "message"}` bodies. Anything else
    /// (a proxy page, an empty body) falls back to a code derived from the
    /// HTTP status.
    pub fn from_http(status: u16, body: &str) -> Self {
        if let Ok(wire) = serde_json::from_str::<WireError>(body) {
            if let Some(code) = wire.code {
                return Error::Status {
                    code,
                    message: wire.message.unwrap_or_default(),
                };
            }
        }

        let snippet: String = body.trim().chars().take(200).collect();
        let message = if snippet.is_empty() {
            format!("HTTP status {status}")
        } else {
            format!("HTTP status {status}: {snippet}")
        };
        Error::Status {
            code: Code::from_http_status(status),
            message,
        }
    }

    #[cfg(test)]
    pub(crate) fn code(&self) -> Option<Code> {
        match self {
            Error::Status { code, .. } => Some(*code),
            Error::Context(context::Error::Canceled) => Some(Code::Canceled),
            Error::Context(context::Error::DeadlineExceeded) => Some(Code::DeadlineExceeded),
            _ => None,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => Error::Context(context::Error::DeadlineExceeded),
            ureq::Error::Io(e) => Error::Io(e),
            other => Error::Transport(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Error Codes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Canceled,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
    #[serde(other)]
    Unknown,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
            Code::Unknown => "unknown",
        }
    }

    /// Code implied by an HTTP status when the body carries no error
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Code::Internal,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::Unimplemented,
            429 | 502 | 503 | 504 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: Option<Code>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EndStreamMessage {
    error: Option<WireError>,
}

fn parse_end_stream(data: &[u8]) -> Result<()> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let end: EndStreamMessage = serde_json::from_slice(data)?;
    match end.error {
        Some(err) => Err(Error::Status {
            code: err.code.unwrap_or(Code::Unknown),
            message: err.message.unwrap_or_default(),
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Base URL of the RPC handlers for an API root such as
/// `https://api.prod.overmind.tech`
pub fn api_base(url: &str) -> String {
    format!("{}{}", url.trim_end_matches('/'), API_PATH)
}

#[derive(Debug, Clone)]
pub struct Transport {
    base_url: String,
    token: Option<String>,
}

impl Transport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, procedure: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), procedure)
    }

    fn agent(ctx: &Context) -> ureq::Agent {
        ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_global(ctx.remaining())
                .http_status_as_error(false)
                .build(),
        )
    }

    fn headers(&self, ctx: &Context, content_type: &str) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", content_type.to_string()),
            ("User-Agent", USER_AGENT.to_string()),
        ];
        if content_type == UNARY_CONTENT_TYPE {
            headers.push(("Connect-Protocol-Version", PROTOCOL_VERSION.to_string()));
        }
        if let Some(left) = ctx.remaining() {
            headers.push(("Connect-Timeout-Ms", timeout_ms(left).to_string()));
        }
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("Bearer {token}")));
        }
        headers
    }

    fn post(
        agent: &ureq::Agent,
        url: &str,
        headers: &[(&'static str, String)],
        body: &[u8],
    ) -> Result<ureq::http::Response<ureq::Body>> {
        let mut request = agent.post(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        Ok(request.send(body)?)
    }

    /// Call a unary procedure, e.g. `changes.ChangesService/ListChangesByStatus`
    pub fn unary<Req, Resp>(&self, ctx: &Context, procedure: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        ctx.check()?;
        let body = serde_json::to_vec(request)?;
        let agent = Self::agent(ctx);
        let url = self.endpoint(procedure);
        let headers = self.headers(ctx, UNARY_CONTENT_TYPE);

        tracing::debug!(url = %url, "unary call");

        let outcome = ctx.run_blocking(move || -> Result<(u16, String)> {
            let mut response = Self::post(&agent, &url, &headers, &body)?;
            let status = response.status().as_u16();
            let text = response.body_mut().read_to_string()?;
            Ok((status, text))
        })?;

        let (status, text) = outcome
            .ok_or_else(|| Error::Transport("request worker exited without a response".into()))??;

        if status != 200 {
            return Err(Error::from_http(status, &text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Open a server streaming call. Returns once the response headers have
    /// arrived; messages are then pulled through the returned iterator.
    pub fn server_stream<Req, Resp>(
        &self,
        ctx: &Context,
        procedure: &str,
        request: &Req,
    ) -> Result<ServerStream<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        ctx.check()?;
        let body = Envelope::message(serde_json::to_vec(request)?).encode();
        let agent = Self::agent(ctx);
        let url = self.endpoint(procedure);
        let headers = self.headers(ctx, STREAM_CONTENT_TYPE);

        tracing::debug!(url = %url, "server stream call");

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || pump_stream(&agent, &url, &headers, &body, &tx));

        let stream = ServerStream {
            ctx: ctx.clone(),
            rx,
            done: false,
            _message: PhantomData,
        };

        match ctx.recv(&stream.rx)? {
            Some(StreamEvent::Opened) => Ok(stream),
            Some(StreamEvent::End(Err(e))) => Err(e),
            Some(StreamEvent::End(Ok(()))) | Some(StreamEvent::Message(_)) | None => Err(
                Error::Transport("stream worker exited before the call was opened".into()),
            ),
        }
    }
}

fn timeout_ms(left: Duration) -> u128 {
    // A zero header would be rejected; the context check catches real expiry
    left.as_millis().max(1)
}

enum StreamEvent {
    Opened,
    Message(Vec<u8>),
    End(Result<()>),
}

fn pump_stream(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&'static str, String)],
    body: &[u8],
    tx: &Sender<StreamEvent>,
) {
    let mut response = match Transport::post(agent, url, headers, body) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(StreamEvent::End(Err(e)));
            return;
        }
    };

    let status = response.status().as_u16();
    if status != 200 {
        let text = response.body_mut().read_to_string().unwrap_or_default();
        let _ = tx.send(StreamEvent::End(Err(Error::from_http(status, &text))));
        return;
    }
    if tx.send(StreamEvent::Opened).is_err() {
        return;
    }

    let mut reader = response.into_body().into_reader();
    loop {
        let event = match read_envelope(&mut reader) {
            Ok(Some(env)) if env.is_compressed() => StreamEvent::End(Err(Error::Protocol(
                "received a compressed message but no compression was negotiated".into(),
            ))),
            Ok(Some(env)) if env.is_end_stream() => StreamEvent::End(parse_end_stream(&env.data)),
            Ok(Some(env)) => StreamEvent::Message(env.data),
            Ok(None) => StreamEvent::End(Err(Error::Protocol(
                "stream closed without an end-of-stream message".into(),
            ))),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                StreamEvent::End(Err(Error::Context(context::Error::DeadlineExceeded)))
            }
            Err(e) => StreamEvent::End(Err(e)),
        };

        let finished = matches!(event, StreamEvent::End(_));
        if tx.send(event).is_err() || finished {
            return;
        }
    }
}

/// Messages of a server streaming call.
///
/// Yields `Ok(message)` until the server ends the stream. A failed stream
/// yields one `Err` and then stops.
pub struct ServerStream<T> {
    ctx: Context,
    rx: mpsc::Receiver<StreamEvent>,
    done: bool,
    _message: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for ServerStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = match self.ctx.recv(&self.rx) {
            Ok(Some(StreamEvent::Message(data))) => {
                return match serde_json::from_slice(&data) {
                    Ok(msg) => Some(Ok(msg)),
                    Err(e) => {
                        self.done = true;
                        Some(Err(e.into()))
                    }
                };
            }
            Ok(Some(StreamEvent::Opened)) => Some(Err(Error::Protocol(
                "stream opened twice".into(),
            ))),
            Ok(Some(StreamEvent::End(Ok(())))) => None,
            Ok(Some(StreamEvent::End(Err(e)))) => Some(Err(e)),
            Ok(None) => Some(Err(Error::Transport(
                "stream worker exited unexpectedly".into(),
            ))),
            Err(e) => Some(Err(e.into())),
        };

        self.done = true;
        item
    }
}
