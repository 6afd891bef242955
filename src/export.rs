//! Export orchestration.
//!
//! `svg` exports are local: the live preview markup (optionally recolored)
//! goes straight to the download sink. `gif`/`mp4` are server-rendered jobs
//! consumed over the progress stream, with an ordered transport fallback:
//! the public stream first, the authenticated stream next, and finally a
//! single blocking request with coarse synthetic progress. Transport
//! downgrades are logged, never surfaced; only the failure of the last tier
//! reaches the caller.
//!
//! One exporter instance runs one job at a time: `export_animation` takes
//! `&mut self`, so a second invocation cannot start while a job's future is
//! unsettled. Dropping that future abandons the job; no callback can fire
//! afterwards.

use std::path::PathBuf;

use reqwest::Url;

use crate::background::rewrite_background;
use crate::error::{SvgmotionError, SvgmotionResult};
use crate::model::{ExportFormat, ExportRequest};
use crate::sse::{SseEvent, decode_completion};
use crate::transport::{AuthMode, EventFlow, ExportBackend, StreamAttempt};

/// Where finished export bytes land — the stand-in for the browser's native
/// download mechanism.
pub trait DownloadSink {
    fn save(&mut self, bytes: &[u8], filename: &str, mimetype: &str) -> SvgmotionResult<()>;
}

/// Sink writing each export into a directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn target_path(&self, filename: &str) -> PathBuf {
        self.dir.join(safe_filename(filename))
    }
}

impl DownloadSink for DirectorySink {
    fn save(&mut self, bytes: &[u8], filename: &str, mimetype: &str) -> SvgmotionResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.target_path(filename);
        std::fs::write(&path, bytes)?;
        tracing::info!(path = %path.display(), mimetype, size = bytes.len(), "saved export");
        Ok(())
    }
}

/// Server-supplied names are authoritative for the file name, but only the
/// final path component is honored.
fn safe_filename(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if base.is_empty() { "download" } else { base }
}

/// Format-agnostic export driver.
pub struct Exporter<B: ExportBackend, S: DownloadSink> {
    base_url: Url,
    backend: B,
    sink: S,
}

impl<B: ExportBackend, S: DownloadSink> Exporter<B, S> {
    pub fn new(base_url: Url, backend: B, sink: S) -> Self {
        Self {
            base_url: ensure_trailing_slash(base_url),
            backend,
            sink,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one export to completion.
    ///
    /// `live_markup` is the preview subtree's current markup; required for
    /// `svg`, ignored for server-rendered formats. `on_progress` receives
    /// `(percent, message)` in arrival order.
    pub async fn export_animation(
        &mut self,
        request: &ExportRequest,
        live_markup: Option<&str>,
        mut on_progress: impl FnMut(f32, &str),
    ) -> SvgmotionResult<()> {
        request.validate()?;
        match request.format {
            ExportFormat::Svg => self.export_markup(request, live_markup),
            ExportFormat::Gif | ExportFormat::Mp4 => {
                self.export_rendered(request, &mut on_progress).await
            }
        }
    }

    fn export_markup(
        &mut self,
        request: &ExportRequest,
        live_markup: Option<&str>,
    ) -> SvgmotionResult<()> {
        let markup = live_markup.ok_or_else(|| {
            SvgmotionError::precondition("no rendered markup available for an svg export")
        })?;
        let data = match &request.background {
            Some(color) => rewrite_background(markup, color),
            None => markup.to_string(),
        };
        self.sink
            .save(data.as_bytes(), &request.filename(), ExportFormat::Svg.mimetype())
    }

    async fn export_rendered(
        &mut self,
        request: &ExportRequest,
        on_progress: &mut dyn FnMut(f32, &str),
    ) -> SvgmotionResult<()> {
        for attempt in self.stream_attempts(request)? {
            match self.run_stream(&attempt, request, on_progress).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(endpoint = attempt.label, %err, "streaming export failed");
                }
            }
        }

        tracing::warn!("all streaming transports failed; falling back to a blocking request");
        self.export_blocking(request, on_progress).await
    }

    async fn run_stream(
        &mut self,
        attempt: &StreamAttempt,
        request: &ExportRequest,
        on_progress: &mut dyn FnMut(f32, &str),
    ) -> SvgmotionResult<()> {
        let Self { backend, sink, .. } = self;
        let default_name = request.filename();

        backend
            .stream(attempt, &mut |event| match event {
                SseEvent::Progress { percent, message } => {
                    // Negative percent is a keepalive frame, not progress.
                    if percent >= 0.0 {
                        on_progress(percent, &message);
                    }
                    Ok(EventFlow::Continue)
                }
                SseEvent::Complete {
                    data,
                    mimetype,
                    filename,
                } => {
                    let bytes = decode_completion(&data)?;
                    let name = filename.unwrap_or_else(|| default_name.clone());
                    sink.save(&bytes, &name, &mimetype)?;
                    Ok(EventFlow::Complete)
                }
                SseEvent::Error { message } => Err(SvgmotionError::protocol(message)),
            })
            .await
    }

    async fn export_blocking(
        &mut self,
        request: &ExportRequest,
        on_progress: &mut dyn FnMut(f32, &str),
    ) -> SvgmotionResult<()> {
        // No event granularity on this path; report a coarse start/finish.
        on_progress(10.0, "Exporting...");

        let timeout = request.fallback_timeout();
        let [community, owner] = self.blocking_attempts(request)?;
        let bytes = match self.backend.fetch_binary(&community, timeout).await {
            Ok(bytes) => bytes,
            Err(err) if matches!(err.status(), Some(403 | 404)) => {
                // Visibility decides which base path is authoritative, and
                // the client cannot know it in advance.
                tracing::warn!(status = ?err.status(), "community export path rejected; retrying owner path");
                self.backend.fetch_binary(&owner, timeout).await?
            }
            Err(err) => return Err(err),
        };

        on_progress(100.0, "Export complete");
        self.sink
            .save(&bytes, &request.filename(), request.format.mimetype())
    }

    fn stream_attempts(&self, request: &ExportRequest) -> SvgmotionResult<[StreamAttempt; 2]> {
        Ok([
            StreamAttempt {
                label: "public",
                url: endpoint_url(&self.base_url, request, true, true)?,
                auth: AuthMode::Public,
            },
            StreamAttempt {
                label: "private",
                url: endpoint_url(&self.base_url, request, false, true)?,
                auth: AuthMode::Bearer,
            },
        ])
    }

    fn blocking_attempts(&self, request: &ExportRequest) -> SvgmotionResult<[StreamAttempt; 2]> {
        Ok([
            StreamAttempt {
                label: "community",
                url: endpoint_url(&self.base_url, request, true, false)?,
                auth: AuthMode::Bearer,
            },
            StreamAttempt {
                label: "owner",
                url: endpoint_url(&self.base_url, request, false, false)?,
                auth: AuthMode::Bearer,
            },
        ])
    }
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn endpoint_url(
    base: &Url,
    request: &ExportRequest,
    public: bool,
    streaming: bool,
) -> SvgmotionResult<Url> {
    let scope = if public { "community/" } else { "" };
    let op = if streaming { "export-stream" } else { "export" };
    let path = format!(
        "{scope}animations/{id}/{op}/{format}",
        id = request.animation_id,
        format = request.format
    );
    let mut url = base
        .join(&path)
        .map_err(|err| SvgmotionError::precondition(format!("invalid endpoint url: {err}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("duration", &request.duration_secs.to_string());
        if let Some(background) = &request.background {
            query.append_pair("bgColor", background.as_css());
        }
    }
    Ok(url)
}
