#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod background;
pub mod dom;
pub mod error;
pub mod export;
pub mod model;
pub mod playback;
pub mod sse;
pub mod style;
pub mod surface;
pub mod transport;

pub use api::ApiClient;
pub use auth::AuthSession;
pub use background::rewrite_background;
pub use error::{SvgmotionError, SvgmotionResult};
pub use export::{DirectorySink, DownloadSink, Exporter};
pub use model::{Animation, BackgroundColor, ExportFormat, ExportRequest};
pub use playback::PlaybackController;
pub use surface::{AnimationSurface, DomSurface, PlayState};
pub use transport::{AuthMode, ExportBackend, HttpBackend, StreamAttempt};
