//! The synchronous per-frame loop: read, detect, count, present.

use std::{fmt, path::PathBuf, time::Instant};

use anyhow::Result;

use crate::{
    counting::CrossingTotals,
    report::{
        timestamp_now, FrameLog, IntervalCounters, JsonLogger, SessionEndLog, SessionLog,
        SummaryLog,
    },
    session::{Command, Control, FrameOutcome, Session},
    source::{Detector, FrameSource},
};

/// Receives each processed frame, e.g. a display window. Returns any commands
/// the user issued while the frame was shown.
pub trait FrameSink<F> {
    fn present(&mut self, frame: &mut F, outcome: &FrameOutcome) -> Result<Vec<Command>>;
}

/// Sink for headless runs.
#[derive(Debug, Default)]
pub struct Headless;

impl<F> FrameSink<F> for Headless {
    fn present(&mut self, _frame: &mut F, outcome: &FrameOutcome) -> Result<Vec<Command>> {
        if let Some((entry, exit, active)) = outcome.overlay.dashboard() {
            tracing::trace!(
                "frame={} entry={} exit={} active={}",
                outcome.frame_index,
                entry,
                exit,
                active
            );
        }
        Ok(Vec::new())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    SourceFailed(String),
    Failed(String),
    Quit,
    FrameLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "end of stream"),
            Self::SourceFailed(err) => write!(f, "frame source failed: {err}"),
            Self::Failed(err) => write!(f, "aborted: {err}"),
            Self::Quit => write!(f, "quit"),
            Self::FrameLimit => write!(f, "frame limit reached"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub max_frames: Option<u64>,
    pub log_json: Option<PathBuf>,
    pub log_interval_seconds: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub totals: CrossingTotals,
    pub zone_tallies: Vec<u64>,
    pub reason: StopReason,
}

/// Drive `session` until the source ends, a quit command arrives or the
/// frame limit is hit. The session totals are appended on every exit path,
/// including event log and sink failures. When several things fail, the first
/// error is returned and the later ones are logged.
pub fn run<S, D, K>(
    session: &mut Session,
    source: &mut S,
    detector: &mut D,
    sink: &mut K,
    options: &RunOptions,
) -> Result<RunSummary>
where
    S: FrameSource,
    D: Detector<S::Frame>,
    K: FrameSink<S::Frame>,
{
    let mut json_logger = None;
    let outcome = match open_event_log(session, source, options) {
        Ok(logger) => {
            json_logger = logger;
            drive(session, source, detector, sink, options, &mut json_logger)
        }
        Err(err) => Err(err),
    };

    let (reason, mut failure) = match outcome {
        Ok(reason) => (reason, None),
        Err(err) => (StopReason::Failed(format!("{err:#}")), Some(err)),
    };
    let totals = match session.finish() {
        Ok(totals) => totals,
        Err(err) => {
            keep_first(&mut failure, err.context("Failed to report session totals"));
            session.totals()
        }
    };
    let summary = RunSummary {
        frames: session.frame_index(),
        totals,
        zone_tallies: session.zone_tallies(),
        reason,
    };
    if let Some(logger) = json_logger.as_mut() {
        let written = logger
            .write_event(&SessionEndLog {
                event: "session_end",
                timestamp: timestamp_now(),
                frames: summary.frames,
                reason: summary.reason.to_string(),
                entry: totals.entry,
                exit: totals.exit,
                zone_tallies: summary.zone_tallies.clone(),
            })
            .and_then(|()| logger.flush());
        if let Err(err) = written {
            keep_first(&mut failure, err);
        }
    }
    match failure {
        Some(err) => Err(err),
        None => {
            tracing::info!(
                "Session ended ({}) after {} frames: entry={} exit={}",
                summary.reason,
                summary.frames,
                totals.entry,
                totals.exit
            );
            Ok(summary)
        }
    }
}

fn keep_first(failure: &mut Option<anyhow::Error>, err: anyhow::Error) {
    match failure {
        Some(_) => tracing::error!("{:#}", err),
        None => *failure = Some(err),
    }
}

fn open_event_log<S: FrameSource>(
    session: &Session,
    source: &S,
    options: &RunOptions,
) -> Result<Option<JsonLogger>> {
    let Some(path) = options.log_json.as_ref() else {
        return Ok(None);
    };
    let mut logger = JsonLogger::new(path)?;
    let config = session.config();
    logger.write_event(&SessionLog {
        event: "session_start",
        timestamp: timestamp_now(),
        source: source.describe(),
        line_y: config.line_y,
        match_distance: config.match_distance,
        person_class: config.person_class,
        zones: session.zones().len(),
    })?;
    logger.flush()?;
    Ok(Some(logger))
}

fn drive<S, D, K>(
    session: &mut Session,
    source: &mut S,
    detector: &mut D,
    sink: &mut K,
    options: &RunOptions,
    json_logger: &mut Option<JsonLogger>,
) -> Result<StopReason>
where
    S: FrameSource,
    D: Detector<S::Frame>,
    K: FrameSink<S::Frame>,
{
    let mut interval = IntervalCounters::default();
    let mut last_summary = Instant::now();

    loop {
        if options
            .max_frames
            .is_some_and(|max| session.frame_index() >= max)
        {
            return Ok(StopReason::FrameLimit);
        }

        let mut frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(StopReason::EndOfStream),
            Err(err) => {
                tracing::error!("Frame source failed: {:#}", err);
                return Ok(StopReason::SourceFailed(format!("{err:#}")));
            }
        };

        for command in source.pending_commands() {
            if session.apply(&command) == Control::Quit {
                return Ok(StopReason::Quit);
            }
        }

        let raw = detector.detect(&frame).unwrap_or_else(|err| {
            tracing::warn!("Detector failed on frame {}: {:#}", session.frame_index() + 1, err);
            Vec::new()
        });
        let outcome = session.process_frame(&raw);
        interval.update(outcome.detections, outcome.stats.new_tracks);

        if let Some(logger) = json_logger.as_mut() {
            let totals = session.totals();
            logger.write_event(&FrameLog {
                event: "frame",
                timestamp: timestamp_now(),
                frame_index: outcome.frame_index,
                detections: outcome.detections,
                active_tracks: outcome.tracks.len(),
                new_tracks: outcome.stats.new_tracks,
                dropped_tracks: outcome.stats.dropped_tracks,
                entry: totals.entry,
                exit: totals.exit,
                zone_tallies: session.zone_tallies(),
            })?;
        }

        let commands = sink.present(&mut frame, &outcome)?;
        for command in commands {
            if session.apply(&command) == Control::Quit {
                return Ok(StopReason::Quit);
            }
        }

        if last_summary.elapsed().as_secs() >= options.log_interval_seconds {
            let totals = session.totals();
            tracing::info!(
                "frames={} unique={} active={} entry={} exit={} zones={:?}",
                outcome.frame_index,
                session.total_unique(),
                session.active_tracks(),
                totals.entry,
                totals.exit,
                session.zone_tallies()
            );
            if let Some(logger) = json_logger.as_mut() {
                logger.write_event(&SummaryLog {
                    event: "summary",
                    timestamp: timestamp_now(),
                    frame_index: outcome.frame_index,
                    interval_seconds: options.log_interval_seconds,
                    interval_frames: interval.frames,
                    interval_detections: interval.detections,
                    interval_new_tracks: interval.new_tracks,
                    total_unique: session.total_unique(),
                    entry: totals.entry,
                    exit: totals.exit,
                })?;
                logger.flush()?;
            }
            interval.reset();
            last_summary = Instant::now();
        }
    }
}
