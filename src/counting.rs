//! Line crossing and zone occupancy counters.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::{
    tracker::{Track, TrackId},
    zones::ZoneStore,
};

pub const DEFAULT_LINE_Y: f32 = 250.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crossing {
    Entry,
    Exit,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrossingTotals {
    pub entry: u64,
    pub exit: u64,
}

/// Attributes each identity to the entry or exit side of a horizontal line,
/// once per run.
#[derive(Debug)]
pub struct CrossingCounter {
    line_y: f32,
    counted: HashSet<TrackId>,
    totals: CrossingTotals,
}

impl CrossingCounter {
    pub fn new(line_y: f32) -> Self {
        Self {
            line_y,
            counted: HashSet::new(),
            totals: CrossingTotals::default(),
        }
    }

    pub fn line_y(&self) -> f32 {
        self.line_y
    }

    pub fn totals(&self) -> CrossingTotals {
        self.totals
    }

    pub fn is_counted(&self, id: TrackId) -> bool {
        self.counted.contains(&id)
    }

    /// Count every track seen for the first time. Centers exactly on the line
    /// are left for a later frame.
    pub fn observe(&mut self, tracks: &[Track]) -> Vec<(TrackId, Crossing)> {
        let mut events = Vec::new();
        for track in tracks {
            if self.counted.contains(&track.id) {
                continue;
            }
            let crossing = if track.center.y < self.line_y {
                Crossing::Entry
            } else if track.center.y > self.line_y {
                Crossing::Exit
            } else {
                continue;
            };
            match crossing {
                Crossing::Entry => self.totals.entry += 1,
                Crossing::Exit => self.totals.exit += 1,
            }
            self.counted.insert(track.id);
            events.push((track.id, crossing));
        }
        events
    }
}

impl Default for CrossingCounter {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_Y)
    }
}

/// Running per-zone tally of track-frames spent strictly inside each zone.
#[derive(Debug, Default)]
pub struct ZoneOccupancy {
    tallies: BTreeMap<usize, u64>,
}

impl ZoneOccupancy {
    /// One zeroed tally per zone currently in `zones`.
    pub fn for_zones(zones: &ZoneStore) -> Self {
        Self {
            tallies: (0..zones.len()).map(|index| (index, 0)).collect(),
        }
    }

    pub fn zone_added(&mut self, index: usize) {
        self.tallies.insert(index, 0);
    }

    pub fn zone_removed(&mut self, index: usize) {
        self.tallies.remove(&index);
    }

    pub fn clear(&mut self) {
        self.tallies.clear();
    }

    pub fn tally(&self, index: usize) -> u64 {
        self.tallies.get(&index).copied().unwrap_or(0)
    }

    pub fn tallies(&self) -> &BTreeMap<usize, u64> {
        &self.tallies
    }

    /// Returns how many (track, zone) hits this frame produced. Zones without
    /// a registered tally are skipped.
    pub fn observe(&mut self, tracks: &[Track], zones: &ZoneStore) -> u64 {
        let mut hits = 0;
        for track in tracks {
            for (index, zone) in zones.iter().enumerate() {
                if !zone.contains(track.center) {
                    continue;
                }
                if let Some(tally) = self.tallies.get_mut(&index) {
                    *tally += 1;
                    hits += 1;
                }
            }
        }
        hits
    }
}
