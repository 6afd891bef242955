use std::{fmt, str::FromStr, time::Duration};

use crate::error::{SvgmotionError, SvgmotionResult};

/// Canvas dimensions the generation backend renders at.
pub const CANVAS_WIDTH: u32 = 800;
pub const CANVAS_HEIGHT: u32 = 600;

/// One generated animation as returned by the REST layer.
///
/// `svg_content` is an immutable snapshot produced at generation time; the
/// client only derives transformed copies from it or reloads it to reset the
/// rendered view.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Animation {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub svg_content: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub favorites_count: u32,
    #[serde(default)]
    pub duration: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Svg,
    Gif,
    Mp4,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
        }
    }

    pub fn mimetype(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Gif => "image/gif",
            Self::Mp4 => "video/mp4",
        }
    }

    /// Whether this format is produced by a server-side render job rather
    /// than locally from the preview markup.
    pub fn is_server_rendered(self) -> bool {
        matches!(self, Self::Gif | Self::Mp4)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = SvgmotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "gif" => Ok(Self::Gif),
            "mp4" => Ok(Self::Mp4),
            other => Err(SvgmotionError::precondition(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

/// Requested backdrop for an export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackgroundColor {
    Transparent,
    Solid(String),
}

impl BackgroundColor {
    pub fn as_css(&self) -> &str {
        match self {
            Self::Transparent => "transparent",
            Self::Solid(color) => color,
        }
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::Transparent)
    }
}

impl From<&str> for BackgroundColor {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("transparent") {
            Self::Transparent
        } else {
            Self::Solid(s.to_string())
        }
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_css())
    }
}

/// One export invocation. Created when the user confirms an export choice;
/// never persisted.
#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub animation_id: u64,
    pub format: ExportFormat,
    pub filename_base: String,
    pub duration_secs: u32,
    pub background: Option<BackgroundColor>,
}

impl ExportRequest {
    pub fn new(animation_id: u64, format: ExportFormat) -> Self {
        Self {
            animation_id,
            format,
            filename_base: String::new(),
            duration_secs: 5,
            background: None,
        }
    }

    pub fn with_filename_base(mut self, base: impl Into<String>) -> Self {
        self.filename_base = base.into();
        self
    }

    pub fn with_duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_background(mut self, background: Option<BackgroundColor>) -> Self {
        self.background = background;
        self
    }

    /// Checks rejected before any I/O is issued.
    pub fn validate(&self) -> SvgmotionResult<()> {
        if self.format == ExportFormat::Mp4
            && self.background.as_ref().is_some_and(|b| b.is_transparent())
        {
            return Err(SvgmotionError::precondition(
                "mp4 has no alpha channel; a transparent background cannot be rendered",
            ));
        }
        if self.format.is_server_rendered() && self.animation_id == 0 {
            return Err(SvgmotionError::precondition(
                "a stored animation id is required for server-rendered exports",
            ));
        }
        Ok(())
    }

    /// Name the saved file gets when the server does not supply one.
    pub fn filename(&self) -> String {
        let base = if self.filename_base.trim().is_empty() {
            "animation"
        } else {
            self.filename_base.trim()
        };
        format!("{base}.{}", self.format)
    }

    /// Timeout for the blocking-fallback request, scaled to the requested
    /// clip length.
    pub fn fallback_timeout(&self) -> Duration {
        let scaled = 30 + 15 * u64::from(self.duration_secs);
        Duration::from_secs(scaled.max(240))
    }
}
