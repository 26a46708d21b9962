//! One counting session: the zone store, tracker and counters, driven one
//! frame at a time.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    counting::{Crossing, CrossingCounter, CrossingTotals, ZoneOccupancy, DEFAULT_LINE_Y},
    detection::{person_detections, RawDetection, PERSON_CLASS_ID},
    overlay::Overlay,
    report::SessionReporter,
    tracker::{CentroidTracker, Track, TrackId, TrackingStats, DEFAULT_MATCH_DISTANCE},
    zones::{ZoneRect, ZoneStore},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub line_y: f32,
    pub match_distance: f32,
    pub person_class: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            line_y: DEFAULT_LINE_Y,
            match_distance: DEFAULT_MATCH_DISTANCE,
            person_class: PERSON_CLASS_ID,
        }
    }
}

/// Discrete commands from the UI or a replay stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    AddZone(ZoneRect),
    DeleteLastZone,
    ClearZones,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// What one frame did to the session.
#[derive(Debug)]
pub struct FrameOutcome {
    pub frame_index: u64,
    pub detections: usize,
    pub tracks: Vec<Track>,
    pub stats: TrackingStats,
    pub crossings: Vec<(TrackId, Crossing)>,
    pub zone_hits: u64,
    pub overlay: Overlay,
}

pub struct Session {
    config: SessionConfig,
    zones: ZoneStore,
    tracker: CentroidTracker,
    crossing: CrossingCounter,
    occupancy: ZoneOccupancy,
    reporter: SessionReporter,
    frame_index: u64,
}

impl Session {
    pub fn new(config: SessionConfig, zones: ZoneStore, reporter: SessionReporter) -> Self {
        let occupancy = ZoneOccupancy::for_zones(&zones);
        Self {
            tracker: CentroidTracker::new(config.match_distance),
            crossing: CrossingCounter::new(config.line_y),
            config,
            zones,
            occupancy,
            reporter,
            frame_index: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn zones(&self) -> &ZoneStore {
        &self.zones
    }

    pub fn totals(&self) -> CrossingTotals {
        self.crossing.totals()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn active_tracks(&self) -> usize {
        self.tracker.active_count()
    }

    pub fn total_unique(&self) -> u64 {
        self.tracker.total_assigned()
    }

    pub fn zone_tallies(&self) -> Vec<u64> {
        self.occupancy.tallies().values().copied().collect()
    }

    /// Apply a control command. Zone store failures are logged, never raised.
    pub fn apply(&mut self, command: &Command) -> Control {
        match command {
            Command::AddZone(rect) => match self.zones.add(*rect) {
                Ok(index) => {
                    self.occupancy.zone_added(index);
                    tracing::info!("Zone {} added at {}", index + 1, rect);
                }
                Err(err) if err.is_degenerate() => {
                    tracing::warn!("Ignoring zone {}: {}", rect, err);
                }
                Err(err) => tracing::error!("Zone not added: {}", err),
            },
            Command::DeleteLastZone => {
                let last = self.zones.len().checked_sub(1);
                match self.zones.remove_last() {
                    Ok(true) => {
                        if let Some(index) = last {
                            self.occupancy.zone_removed(index);
                        }
                        tracing::info!("Last zone deleted");
                    }
                    Ok(false) => tracing::debug!("No zone to delete"),
                    Err(err) => tracing::error!("Zone not deleted: {}", err),
                }
            }
            Command::ClearZones => match self.zones.clear() {
                Ok(()) => {
                    self.occupancy.clear();
                    tracing::info!("All zones cleared");
                }
                Err(err) => tracing::error!("Zones not cleared: {}", err),
            },
            Command::Quit => return Control::Quit,
        }
        Control::Continue
    }

    /// Run one frame's raw detections through tracking and both counters.
    pub fn process_frame(&mut self, raw: &[RawDetection]) -> FrameOutcome {
        self.frame_index += 1;
        let detections = person_detections(raw, self.config.person_class);
        let (tracks, stats) = self.tracker.update(&detections);
        let crossings = self.crossing.observe(&tracks);
        for (id, crossing) in &crossings {
            tracing::debug!("Frame {}: ID {} counted as {:?}", self.frame_index, id, crossing);
        }
        let zone_hits = self.occupancy.observe(&tracks, &self.zones);
        let overlay = Overlay::compose(&tracks, &self.zones, &self.occupancy, &self.crossing);
        FrameOutcome {
            frame_index: self.frame_index,
            detections: detections.len(),
            tracks,
            stats,
            crossings,
            zone_hits,
            overlay,
        }
    }

    /// End the session, appending the final totals once.
    pub fn finish(&mut self) -> Result<CrossingTotals> {
        let totals = self.crossing.totals();
        self.reporter.finish(totals)?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;

    fn person(cx: f32, cy: f32) -> RawDetection {
        RawDetection {
            class_id: PERSON_CLASS_ID,
            confidence: 0.8,
            bbox: BBox::new(cx - 20.0, cy - 40.0, cx + 20.0, cy + 40.0),
        }
    }

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let reporter = SessionReporter::new(dir.path().join("count_data.csv"));
        let session = Session::new(SessionConfig::default(), ZoneStore::in_memory(), reporter);
        (dir, session)
    }

    #[test]
    fn zone_commands_keep_tallies_in_step() {
        let (_dir, mut session) = session();
        session.apply(&Command::AddZone(ZoneRect::new(0, 0, 200, 200)));
        session.apply(&Command::AddZone(ZoneRect::new(0, 0, 5, 5)));
        assert_eq!(session.zones().len(), 1);

        session.process_frame(&[person(100.0, 100.0)]);
        session.process_frame(&[person(102.0, 100.0)]);
        assert_eq!(session.zone_tallies(), vec![2]);

        session.apply(&Command::DeleteLastZone);
        assert!(session.zones().is_empty());
        assert!(session.zone_tallies().is_empty());
        assert_eq!(session.apply(&Command::DeleteLastZone), Control::Continue);
        assert_eq!(session.apply(&Command::Quit), Control::Quit);
    }

    #[test]
    fn full_range_zone_command_is_accepted() {
        let (_dir, mut session) = session();
        let rect: ZoneRect = "-2147483648,0,2147483647,100".parse().unwrap();
        assert_eq!(session.apply(&Command::AddZone(rect)), Control::Continue);
        assert_eq!(session.zones().len(), 1);
        session.process_frame(&[person(0.0, 50.0)]);
        assert_eq!(session.zone_tallies(), vec![1]);
    }

    #[test]
    fn frame_outcome_carries_overlay() {
        let (_dir, mut session) = session();
        session.apply(&Command::AddZone(ZoneRect::new(0, 0, 200, 200)));
        let outcome = session.process_frame(&[person(100.0, 100.0), person(300.0, 400.0)]);
        assert_eq!(outcome.frame_index, 1);
        assert_eq!(outcome.tracks.len(), 2);
        assert_eq!(outcome.crossings, vec![(1, Crossing::Entry), (2, Crossing::Exit)]);
        assert_eq!(outcome.zone_hits, 1);
        assert_eq!(outcome.overlay.dashboard(), Some((1, 1, 2)));
    }

    #[test]
    fn commands_read_from_json() {
        let cmd: Command =
            serde_json::from_str(r#"{"command":"add_zone","x1":1,"y1":2,"x2":30,"y2":40}"#)
                .unwrap();
        assert_eq!(cmd, Command::AddZone(ZoneRect::new(1, 2, 30, 40)));
        let cmd: Command = serde_json::from_str(r#"{"command":"quit"}"#).unwrap();
        assert_eq!(cmd, Command::Quit);
    }
}
