//! Session totals log and the optional JSON-lines event stream.

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::counting::CrossingTotals;

/// Appends one `entry,exit` line to the totals log when a session ends.
#[derive(Debug)]
pub struct SessionReporter {
    path: PathBuf,
    written: bool,
}

impl SessionReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: false,
        }
    }

    /// Append the final totals. Only the first call per session writes.
    pub fn finish(&mut self, totals: CrossingTotals) -> Result<()> {
        if self.written {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(format!("{},{}\n", totals.entry, totals.exit).as_bytes())
            .with_context(|| format!("Failed to append totals to {}", self.path.display()))?;
        self.written = true;
        tracing::info!(
            "Session totals entry={} exit={} appended to {}",
            totals.entry,
            totals.exit,
            self.path.display()
        );
        Ok(())
    }
}

/// Per-interval aggregates for the periodic summary event.
#[derive(Debug, Default, Clone)]
pub struct IntervalCounters {
    pub frames: u64,
    pub detections: u64,
    pub new_tracks: u64,
}

impl IntervalCounters {
    pub fn update(&mut self, detections: usize, new_tracks: usize) {
        self.frames += 1;
        self.detections += detections as u64;
        self.new_tracks += new_tracks as u64;
    }

    pub fn reset(&mut self) {
        *self = IntervalCounters::default();
    }
}

#[derive(Serialize)]
pub struct SessionLog {
    pub event: &'static str,
    pub timestamp: String,
    pub source: String,
    pub line_y: f32,
    pub match_distance: f32,
    pub person_class: i32,
    pub zones: usize,
}

#[derive(Serialize)]
pub struct FrameLog {
    pub event: &'static str,
    pub timestamp: String,
    pub frame_index: u64,
    pub detections: usize,
    pub active_tracks: usize,
    pub new_tracks: usize,
    pub dropped_tracks: usize,
    pub entry: u64,
    pub exit: u64,
    pub zone_tallies: Vec<u64>,
}

#[derive(Serialize)]
pub struct SummaryLog {
    pub event: &'static str,
    pub timestamp: String,
    pub frame_index: u64,
    pub interval_seconds: u64,
    pub interval_frames: u64,
    pub interval_detections: u64,
    pub interval_new_tracks: u64,
    pub total_unique: u64,
    pub entry: u64,
    pub exit: u64,
}

#[derive(Serialize)]
pub struct SessionEndLog {
    pub event: &'static str,
    pub timestamp: String,
    pub frames: u64,
    pub reason: String,
    pub entry: u64,
    pub exit: u64,
    pub zone_tallies: Vec<u64>,
}

pub struct JsonLogger {
    writer: BufWriter<File>,
}

impl JsonLogger {
    pub fn new(path: &Path) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn write_event<T: Serialize>(&mut self, event: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_appends_and_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("count_data.csv");
        std::fs::write(&path, "1,2\n").unwrap();

        let mut reporter = SessionReporter::new(&path);
        reporter.finish(CrossingTotals { entry: 3, exit: 4 }).unwrap();
        reporter.finish(CrossingTotals { entry: 9, exit: 9 }).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1,2\n3,4\n");
    }

    #[test]
    fn logger_writes_one_event_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut logger = JsonLogger::new(&path).unwrap();
        for frame_index in 1..=2 {
            logger
                .write_event(&FrameLog {
                    event: "frame",
                    timestamp: timestamp_now(),
                    frame_index,
                    detections: 1,
                    active_tracks: 1,
                    new_tracks: 0,
                    dropped_tracks: 0,
                    entry: 1,
                    exit: 0,
                    zone_tallies: vec![frame_index],
                })
                .unwrap();
        }
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["frame_index"], 2);
        assert_eq!(lines[1]["zone_tallies"], serde_json::json!([2]));
    }
}
