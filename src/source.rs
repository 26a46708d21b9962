//! Frame sources, detectors and the headless replay format.

use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{detection::RawDetection, session::Command};

/// Produces frames on demand. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    type Frame;

    fn next_frame(&mut self) -> Result<Option<Self::Frame>>;

    /// Commands that arrived with the frame just read.
    fn pending_commands(&mut self) -> Vec<Command> {
        Vec::new()
    }

    fn describe(&self) -> String;
}

/// Turns one frame into raw boxes.
pub trait Detector<F> {
    fn detect(&mut self, frame: &F) -> Result<Vec<RawDetection>>;
}

/// One line of a replay file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
}

/// Reads recorded detector output, one JSON object per line. Blank lines are
/// skipped; a line that does not parse ends the stream with an error.
pub struct ReplaySource {
    label: String,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    pending: Vec<Command>,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open replay file {}", path.display()))?;
        Ok(Self {
            label: path.display().to_string(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            pending: Vec::new(),
        })
    }
}

impl FrameSource for ReplaySource {
    type Frame = ReplayFrame;

    fn next_frame(&mut self) -> Result<Option<ReplayFrame>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.with_context(|| format!("Failed to read {}", self.label))?;
            if line.trim().is_empty() {
                continue;
            }
            let mut frame: ReplayFrame = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: malformed frame", self.label, self.line_no))?;
            self.pending = std::mem::take(&mut frame.commands);
            return Ok(Some(frame));
        }
        Ok(None)
    }

    fn pending_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.pending)
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.label)
    }
}

/// Detector for replayed frames: the boxes are already in the frame.
#[derive(Debug, Default)]
pub struct RecordedDetections;

impl Detector<ReplayFrame> for RecordedDetections {
    fn detect(&mut self, frame: &ReplayFrame) -> Result<Vec<RawDetection>> {
        Ok(frame.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replay_yields_frames_and_commands() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"detections":[{{"class_id":0,"confidence":0.9,"bbox":[0,0,10,10]}}],"commands":[{{"command":"clear_zones"}}]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"detections":[]}}"#).unwrap();

        let mut source = ReplaySource::open(file.path()).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.detections.len(), 1);
        assert_eq!(source.pending_commands(), vec![Command::ClearZones]);
        assert!(source.pending_commands().is_empty());

        let second = source.next_frame().unwrap().unwrap();
        assert!(second.detections.is_empty());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let mut source = ReplaySource::open(file.path()).unwrap();
        let err = source.next_frame().unwrap_err();
        assert!(err.to_string().contains(":1: malformed frame"));
    }
}
