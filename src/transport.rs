//! Streaming transports for export jobs.
//!
//! Two interchangeable strategies consume the same progress stream. The
//! credential-free strategy mirrors a native event-source connection: it
//! cannot attach an authorization header, and an error before any event has
//! arrived is reported as a failure to connect at all. The authenticated
//! strategy assembles its bearer header manually and decodes the response
//! body chunk by chunk. Both feed one shared frame decoder, so event
//! interpretation cannot drift between them.

use std::time::Duration;

use futures::StreamExt;

use crate::auth::AuthSession;
use crate::error::{SvgmotionError, SvgmotionResult};
use crate::sse::{FrameDecoder, SseEvent};

/// How a request authorizes itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// No credentials; only valid against publicly-reachable resources.
    Public,
    /// `Authorization: Bearer` from the persisted session, when present.
    Bearer,
}

/// One endpoint to try, in the orchestrator's fallback order.
#[derive(Clone, Debug)]
pub struct StreamAttempt {
    /// Short name for downgrade logging ("public", "private").
    pub label: &'static str,
    pub url: reqwest::Url,
    pub auth: AuthMode,
}

/// Handler verdict for one decoded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventFlow {
    Continue,
    /// A terminal event was consumed; the stream is done.
    Complete,
}

/// Network seam between the export orchestrator and the wire.
///
/// `stream` resolves only after the handler reports [`EventFlow::Complete`];
/// a stream that ends any other way is an error. `fetch_binary` is the
/// blocking single-request path.
#[allow(async_fn_in_trait)]
pub trait ExportBackend {
    async fn stream(
        &self,
        attempt: &StreamAttempt,
        on_event: &mut dyn FnMut(SseEvent) -> SvgmotionResult<EventFlow>,
    ) -> SvgmotionResult<()>;

    async fn fetch_binary(
        &self,
        attempt: &StreamAttempt,
        timeout: Duration,
    ) -> SvgmotionResult<Vec<u8>>;
}

/// [`ExportBackend`] over a shared HTTP client.
///
/// Streaming requests carry no timeout; long renders are legitimate and the
/// connection-drop detection below is the only watchdog. The blocking path
/// gets the caller's per-request timeout.
pub struct HttpBackend {
    http: reqwest::Client,
    auth: AuthSession,
}

impl HttpBackend {
    pub fn new(auth: AuthSession) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth,
        }
    }

    /// Reuse an existing client (connection pooling across consumers).
    pub fn with_client(http: reqwest::Client, auth: AuthSession) -> Self {
        Self { http, auth }
    }

    async fn stream_event_source(
        &self,
        attempt: &StreamAttempt,
        on_event: &mut dyn FnMut(SseEvent) -> SvgmotionResult<EventFlow>,
    ) -> SvgmotionResult<()> {
        let response = self
            .http
            .get(attempt.url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| SvgmotionError::transport(format!("connection failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            // Refused outright; indistinguishable from an auth wall here
            // because this strategy cannot present credentials.
            return Err(SvgmotionError::transport(format!(
                "connection failed (HTTP {})",
                status.as_u16()
            )));
        }

        pump(response, on_event).await
    }

    async fn stream_authorized(
        &self,
        attempt: &StreamAttempt,
        on_event: &mut dyn FnMut(SseEvent) -> SvgmotionResult<EventFlow>,
    ) -> SvgmotionResult<()> {
        let mut request = self
            .http
            .get(attempt.url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = self.auth.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SvgmotionError::http(
                status.as_u16(),
                "export stream rejected",
            ));
        }

        pump(response, on_event).await
    }
}

impl ExportBackend for HttpBackend {
    async fn stream(
        &self,
        attempt: &StreamAttempt,
        on_event: &mut dyn FnMut(SseEvent) -> SvgmotionResult<EventFlow>,
    ) -> SvgmotionResult<()> {
        match attempt.auth {
            AuthMode::Public => self.stream_event_source(attempt, on_event).await,
            AuthMode::Bearer => self.stream_authorized(attempt, on_event).await,
        }
    }

    async fn fetch_binary(
        &self,
        attempt: &StreamAttempt,
        timeout: Duration,
    ) -> SvgmotionResult<Vec<u8>> {
        let mut request = self.http.get(attempt.url.clone()).timeout(timeout);
        if attempt.auth == AuthMode::Bearer {
            if let Some(token) = self.auth.token() {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SvgmotionError::http(status.as_u16(), truncate(&body, 200)));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

async fn pump(
    response: reqwest::Response,
    on_event: &mut dyn FnMut(SseEvent) -> SvgmotionResult<EventFlow>,
) -> SvgmotionResult<()> {
    drain_frames(Box::pin(response.bytes_stream()), on_event).await
}

/// Read chunks, decode frames, and hand events to the handler in arrival
/// order. Ends successfully only on a handler-confirmed terminal event; a
/// stream that runs dry any other way is a transport failure. Chunk errors
/// before the first event are classified as a failure to connect.
pub async fn drain_frames<S, B, E>(
    mut stream: S,
    on_event: &mut dyn FnMut(SseEvent) -> SvgmotionResult<EventFlow>,
) -> SvgmotionResult<()>
where
    S: futures::Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = FrameDecoder::new();
    let mut received_any = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| {
            if received_any {
                SvgmotionError::transport(format!("connection interrupted: {err}"))
            } else {
                SvgmotionError::transport(format!("connection failed: {err}"))
            }
        })?;
        for event in decoder.push(chunk.as_ref()) {
            received_any = true;
            if on_event(event)? == EventFlow::Complete {
                return Ok(());
            }
        }
    }

    Err(SvgmotionError::transport("connection closed unexpectedly"))
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}
