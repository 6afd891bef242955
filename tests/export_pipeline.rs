//! The export fallback chain end to end, with the network scripted.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use reqwest::Url;
use svgmotion::error::{SvgmotionError, SvgmotionResult};
use svgmotion::export::{DownloadSink, Exporter};
use svgmotion::model::{BackgroundColor, ExportFormat, ExportRequest};
use svgmotion::sse::SseEvent;
use svgmotion::transport::{EventFlow, ExportBackend, StreamAttempt, drain_frames};

enum StreamScript {
    /// Transport-level failure before any event.
    Refuse(&'static str),
    /// Feed these events; if none is terminal the stream just closes.
    Events(Vec<SseEvent>),
}

enum FetchScript {
    Ok(Vec<u8>),
    Http(u16),
}

#[derive(Default)]
struct FakeBackend {
    streams: RefCell<VecDeque<StreamScript>>,
    fetches: RefCell<VecDeque<FetchScript>>,
    log: RefCell<Vec<String>>,
}

impl FakeBackend {
    fn with_streams(scripts: Vec<StreamScript>) -> Self {
        Self {
            streams: RefCell::new(scripts.into()),
            ..Self::default()
        }
    }

    fn and_fetches(self, scripts: Vec<FetchScript>) -> Self {
        *self.fetches.borrow_mut() = scripts.into();
        self
    }

    fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl ExportBackend for FakeBackend {
    async fn stream(
        &self,
        attempt: &StreamAttempt,
        on_event: &mut dyn FnMut(SseEvent) -> SvgmotionResult<EventFlow>,
    ) -> SvgmotionResult<()> {
        self.log
            .borrow_mut()
            .push(format!("stream:{}", attempt.label));
        let script = self
            .streams
            .borrow_mut()
            .pop_front()
            .expect("unexpected stream attempt");
        match script {
            StreamScript::Refuse(msg) => Err(SvgmotionError::transport(msg)),
            StreamScript::Events(events) => {
                for event in events {
                    if on_event(event)? == EventFlow::Complete {
                        return Ok(());
                    }
                }
                Err(SvgmotionError::transport("connection closed unexpectedly"))
            }
        }
    }

    async fn fetch_binary(
        &self,
        attempt: &StreamAttempt,
        _timeout: Duration,
    ) -> SvgmotionResult<Vec<u8>> {
        self.log
            .borrow_mut()
            .push(format!("fetch:{}", attempt.label));
        let script = self
            .fetches
            .borrow_mut()
            .pop_front()
            .expect("unexpected blocking attempt");
        match script {
            FetchScript::Ok(bytes) => Ok(bytes),
            FetchScript::Http(status) => Err(SvgmotionError::http(status, "scripted")),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    files: Vec<(String, String, Vec<u8>)>,
}

impl DownloadSink for RecordingSink {
    fn save(&mut self, bytes: &[u8], filename: &str, mimetype: &str) -> SvgmotionResult<()> {
        self.files
            .push((filename.to_string(), mimetype.to_string(), bytes.to_vec()));
        Ok(())
    }
}

fn progress(percent: f32, message: &str) -> SseEvent {
    SseEvent::Progress {
        percent,
        message: message.to_string(),
    }
}

fn complete_hello() -> SseEvent {
    SseEvent::Complete {
        data: "aGVsbG8=".to_string(),
        mimetype: "image/gif".to_string(),
        filename: Some("x.gif".to_string()),
    }
}

fn gif_request() -> ExportRequest {
    ExportRequest::new(7, ExportFormat::Gif).with_filename_base("demo")
}

fn exporter(backend: FakeBackend) -> Exporter<FakeBackend, RecordingSink> {
    Exporter::new(
        Url::parse("http://localhost:5000/api").unwrap(),
        backend,
        RecordingSink::default(),
    )
}

async fn run(
    exporter: &mut Exporter<FakeBackend, RecordingSink>,
    request: &ExportRequest,
) -> (SvgmotionResult<()>, Vec<(f32, String)>) {
    let mut seen = Vec::new();
    let result = exporter
        .export_animation(request, None, |percent, message| {
            seen.push((percent, message.to_string()));
        })
        .await;
    (result, seen)
}

#[tokio::test]
async fn public_stream_happy_path_downloads_once() {
    let backend = FakeBackend::with_streams(vec![StreamScript::Events(vec![
        progress(30.0, "rendering"),
        progress(70.0, "encoding"),
        complete_hello(),
    ])]);
    let mut exporter = exporter(backend);

    let (result, seen) = run(&mut exporter, &gif_request()).await;
    result.unwrap();

    assert_eq!(exporter.backend().log(), vec!["stream:public"]);
    assert_eq!(
        seen,
        vec![(30.0, "rendering".to_string()), (70.0, "encoding".to_string())]
    );
    assert_eq!(
        exporter.sink().files,
        vec![("x.gif".to_string(), "image/gif".to_string(), b"hello".to_vec())]
    );
}

#[tokio::test]
async fn keepalive_frames_do_not_reach_the_progress_callback() {
    let backend = FakeBackend::with_streams(vec![StreamScript::Events(vec![
        progress(-1.0, "working"),
        progress(40.0, "rendering"),
        complete_hello(),
    ])]);
    let mut exporter = exporter(backend);

    let (result, seen) = run(&mut exporter, &gif_request()).await;
    result.unwrap();
    assert_eq!(seen, vec![(40.0, "rendering".to_string())]);
}

#[tokio::test]
async fn refused_public_stream_downgrades_to_private_silently() {
    let backend = FakeBackend::with_streams(vec![
        StreamScript::Refuse("connection failed (HTTP 403)"),
        StreamScript::Events(vec![complete_hello()]),
    ]);
    let mut exporter = exporter(backend);

    let (result, _) = run(&mut exporter, &gif_request()).await;
    result.unwrap();
    assert_eq!(
        exporter.backend().log(),
        vec!["stream:public", "stream:private"]
    );
    assert_eq!(exporter.sink().files.len(), 1);
}

#[tokio::test]
async fn server_error_event_still_falls_through_the_chain() {
    let backend = FakeBackend::with_streams(vec![
        StreamScript::Refuse("connection failed"),
        StreamScript::Events(vec![SseEvent::Error {
            message: "render queue full".to_string(),
        }]),
    ])
    .and_fetches(vec![FetchScript::Ok(b"fallback-bytes".to_vec())]);
    let mut exporter = exporter(backend);

    let (result, seen) = run(&mut exporter, &gif_request()).await;
    result.unwrap();

    assert_eq!(
        exporter.backend().log(),
        vec!["stream:public", "stream:private", "fetch:community"]
    );
    // synthetic progress from the blocking path only
    assert_eq!(seen.first().map(|p| p.0), Some(10.0));
    assert_eq!(seen.last().map(|p| p.0), Some(100.0));
    let (name, mimetype, bytes) = &exporter.sink().files[0];
    assert_eq!(name, "demo.gif");
    assert_eq!(mimetype, "image/gif");
    assert_eq!(bytes, b"fallback-bytes");
}

#[tokio::test]
async fn blocking_fallback_retries_the_owner_path_on_403() {
    let backend = FakeBackend::with_streams(vec![
        StreamScript::Refuse("connection failed"),
        StreamScript::Refuse("connection failed"),
    ])
    .and_fetches(vec![
        FetchScript::Http(403),
        FetchScript::Ok(b"owner-bytes".to_vec()),
    ]);
    let mut exporter = exporter(backend);

    let (result, _) = run(&mut exporter, &gif_request()).await;
    result.unwrap();
    assert_eq!(
        exporter.backend().log(),
        vec![
            "stream:public",
            "stream:private",
            "fetch:community",
            "fetch:owner"
        ]
    );
}

#[tokio::test]
async fn blocking_fallback_does_not_retry_server_errors() {
    let backend = FakeBackend::with_streams(vec![
        StreamScript::Refuse("connection failed"),
        StreamScript::Refuse("connection failed"),
    ])
    .and_fetches(vec![FetchScript::Http(500)]);
    let mut exporter = exporter(backend);

    let (result, _) = run(&mut exporter, &gif_request()).await;
    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(exporter.sink().files.is_empty());
}

#[tokio::test]
async fn corrupt_completion_payload_surfaces_as_decode_error() {
    let backend = FakeBackend::with_streams(vec![
        StreamScript::Events(vec![SseEvent::Complete {
            data: "@@definitely not base64@@".to_string(),
            mimetype: "image/gif".to_string(),
            filename: None,
        }]),
        StreamScript::Refuse("connection failed"),
    ])
    .and_fetches(vec![FetchScript::Http(500)]);
    let mut exporter = exporter(backend);

    let (result, _) = run(&mut exporter, &gif_request()).await;
    assert!(result.is_err());
    assert!(exporter.sink().files.is_empty());
}

#[tokio::test]
async fn stream_that_closes_without_a_terminal_event_rejects() {
    let chunks: Vec<Result<Vec<u8>, std::convert::Infallible>> = vec![
        Ok(b"data: {\"type\":\"progress\",\"percent\":30,\"message\":\"m\"}\n\n".to_vec()),
        Ok(b"data: {\"type\":\"progress\",\"percent\":70,\"message\":\"m\"}\n\n".to_vec()),
    ];
    let mut events = Vec::new();
    let err = drain_frames(futures::stream::iter(chunks), &mut |event| {
        events.push(event);
        Ok(EventFlow::Continue)
    })
    .await
    .unwrap_err();

    assert!(err.to_string().contains("connection closed unexpectedly"));
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn frames_split_across_chunks_still_complete() {
    let chunks: Vec<Result<Vec<u8>, std::convert::Infallible>> = vec![
        Ok(b"data: {\"type\":\"complete\",\"data\":\"aGVs".to_vec()),
        Ok(b"bG8=\",\"mimetype\":\"image/gif\",\"filename\":\"x.gif\"}\n\n".to_vec()),
    ];
    let mut completions = 0;
    drain_frames(futures::stream::iter(chunks), &mut |event| {
        if let SseEvent::Complete { data, .. } = &event {
            assert_eq!(svgmotion::sse::decode_completion(data).unwrap(), b"hello");
            completions += 1;
        }
        Ok(EventFlow::Complete)
    })
    .await
    .unwrap();
    assert_eq!(completions, 1);
}
