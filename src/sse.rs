//! Wire model and frame decoder for the export progress stream.
//!
//! The server pushes newline-delimited `data: {json}` frames over a
//! long-lived HTTP response. Exactly one `complete` or `error` event
//! terminates a job; any number of `progress` events may precede it.

use base64::Engine as _;

use crate::error::{SvgmotionError, SvgmotionResult};

/// Prefix of a payload-carrying SSE line.
const DATA_PREFIX: &str = "data: ";

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SseEvent {
    /// Latest known completion percentage. Keepalive frames carry a
    /// negative percent and no usable progress.
    Progress {
        #[serde(default)]
        percent: f32,
        #[serde(default)]
        message: String,
    },
    /// Terminal success: base64-encoded file bytes plus the authoritative
    /// MIME type and (optional) filename.
    Complete {
        data: String,
        mimetype: String,
        #[serde(default)]
        filename: Option<String>,
    },
    /// Terminal failure reported by the server.
    Error { message: String },
}

/// Incremental SSE frame decoder.
///
/// Network chunks may split a frame anywhere, including mid-character;
/// bytes are buffered until a full line is available and only complete
/// lines are parsed. Lines that are not valid event frames are skipped,
/// not surfaced — the terminal events are the protocol's source of truth.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = Self::parse_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    fn parse_line(line: &str) -> Option<SseEvent> {
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();
        if payload.is_empty() {
            return None;
        }
        match serde_json::from_str(payload) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::debug!(%err, "skipping malformed event frame");
                None
            }
        }
    }
}

/// Decode the binary payload of a `complete` event.
pub fn decode_completion(data: &str) -> SvgmotionResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|err| SvgmotionError::decode(format!("completion payload is not valid base64: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_full_frame() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"progress\",\"percent\":30,\"message\":\"rendering\"}\n\n");
        assert_eq!(
            events,
            vec![SseEvent::Progress {
                percent: 30.0,
                message: "rendering".to_string(),
            }]
        );
    }

    #[test]
    fn buffers_a_line_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"progress\",\"per").is_empty());
        let events = decoder.push(b"cent\":70,\"message\":\"\"}\n");
        assert_eq!(
            events,
            vec![SseEvent::Progress {
                percent: 70.0,
                message: String::new(),
            }]
        );
    }

    #[test]
    fn skips_malformed_and_non_data_lines() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(
            b": comment\nretry: 500\ndata: not json\ndata: \ndata: {\"type\":\"error\",\"message\":\"boom\"}\n",
        );
        assert_eq!(
            events,
            vec![SseEvent::Error {
                message: "boom".to_string(),
            }]
        );
    }

    #[test]
    fn parses_complete_with_optional_filename() {
        let mut decoder = FrameDecoder::new();
        let events = decoder
            .push(b"data: {\"type\":\"complete\",\"data\":\"aGVsbG8=\",\"mimetype\":\"image/gif\"}\n");
        match &events[0] {
            SseEvent::Complete {
                data,
                mimetype,
                filename,
            } => {
                assert_eq!(data, "aGVsbG8=");
                assert_eq!(mimetype, "image/gif");
                assert!(filename.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn completion_payload_decodes_to_bytes() {
        assert_eq!(decode_completion("aGVsbG8=").unwrap(), b"hello");
        assert!(decode_completion("@@not-base64@@").is_err());
    }

    #[test]
    fn crlf_lines_are_tolerated() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"progress\",\"percent\":5,\"message\":\"m\"}\r\n");
        assert_eq!(events.len(), 1);
    }
}
