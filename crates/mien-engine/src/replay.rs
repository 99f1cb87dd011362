//! Recorded frame streams.
//!
//! A replay file holds one JSON array of detections per line (a frame with
//! no faces is `[]`; blank lines are skipped). Replay sources power the
//! diagnostic CLI and the engine integration tests: the same enrollment and
//! verification loops run against a recording instead of a live pipeline.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use mien_core::{Detection, FrameSource, SourceError};

/// Finite frame source backed by a recorded JSONL file.
#[derive(Debug)]
pub struct ReplaySource {
    frames: VecDeque<Vec<Detection>>,
}

impl ReplaySource {
    /// Load and parse a whole recording up front, failing fast on bad data.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;
        let source = Self::from_jsonl(&text)?;
        tracing::info!(
            path = %path.display(),
            frames = source.frames.len(),
            "replay recording loaded"
        );
        Ok(source)
    }

    /// Parse JSONL text: one frame per non-blank line.
    pub fn from_jsonl(text: &str) -> Result<Self, SourceError> {
        let mut frames = VecDeque::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: Vec<Detection> = serde_json::from_str(line)
                .map_err(|e| SourceError::Unavailable(format!("line {}: {e}", lineno + 1)))?;
            frames.push_back(frame);
        }
        Ok(Self { frames })
    }

    /// Build a source from already constructed frames (tests).
    pub fn from_frames(frames: Vec<Vec<Detection>>) -> Self {
        Self { frames: frames.into() }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Vec<Detection>, SourceError> {
        self.frames.pop_front().ok_or(SourceError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_frames_and_skips_blank_lines() {
        let text = r#"
[]

[{"bbox":{"x":0,"y":0,"width":10,"height":10,"confidence":0.9},"landmarks":null,"embedding":[1.0,2.0]}]
"#;
        let mut source = ReplaySource::from_jsonl(text).unwrap();
        assert_eq!(source.remaining(), 2);

        assert!(source.next_frame().unwrap().is_empty());
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].embedding.values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_exhaustion_is_an_error_not_an_empty_frame() {
        let mut source = ReplaySource::from_jsonl("[]").unwrap();
        assert!(source.next_frame().is_ok());
        assert!(matches!(source.next_frame(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn test_bad_line_fails_fast_with_line_number() {
        let err = ReplaySource::from_jsonl("[]\nnot json\n").unwrap_err();
        match err {
            SourceError::Unavailable(msg) => assert!(msg.contains("line 2")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = ReplaySource::from_path("/nonexistent/recording.jsonl").unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
