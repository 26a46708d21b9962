//! First-match centroid tracker.
//!
//! Each detection takes the identity of the first previous-frame track (in
//! ascending ID order) whose centroid lies within `match_distance`. Tracks
//! that are not matched in a frame are dropped immediately, so a single
//! missed frame ends an identity.

use std::collections::{BTreeMap, HashSet};

use crate::detection::{BBox, Detection, Point};

pub type TrackId = u64;

/// Default centroid match radius in pixels.
pub const DEFAULT_MATCH_DISTANCE: f32 = 50.0;

/// An identity resolved for the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub center: Point,
    /// Box of the detection this frame, kept for drawing only.
    pub bbox: BBox,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrackingStats {
    pub matched: usize,
    pub new_tracks: usize,
    pub dropped_tracks: usize,
}

#[derive(Debug)]
pub struct CentroidTracker {
    previous: BTreeMap<TrackId, Point>,
    next_id: TrackId,
    match_distance: f32,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_DISTANCE)
    }
}

impl CentroidTracker {
    pub fn new(match_distance: f32) -> Self {
        Self {
            previous: BTreeMap::new(),
            next_id: 1,
            match_distance,
        }
    }

    /// Number of identities alive after the last update.
    pub fn active_count(&self) -> usize {
        self.previous.len()
    }

    /// Total identities handed out so far.
    pub fn total_assigned(&self) -> u64 {
        self.next_id - 1
    }

    pub fn update(&mut self, detections: &[Detection]) -> (Vec<Track>, TrackingStats) {
        let mut stats = TrackingStats::default();
        let mut claimed: HashSet<TrackId> = HashSet::with_capacity(detections.len());
        let mut current: BTreeMap<TrackId, Point> = BTreeMap::new();
        let mut tracks = Vec::with_capacity(detections.len());

        for det in detections {
            let matched = self
                .previous
                .iter()
                .find(|(id, center)| {
                    !claimed.contains(*id) && det.center.distance(center) < self.match_distance
                })
                .map(|(id, _)| *id);

            let id = match matched {
                Some(id) => {
                    stats.matched += 1;
                    id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    stats.new_tracks += 1;
                    id
                }
            };
            claimed.insert(id);
            current.insert(id, det.center);
            tracks.push(Track {
                id,
                center: det.center,
                bbox: det.bbox,
            });
        }

        stats.dropped_tracks = self.previous.len() - stats.matched;
        self.previous = current;
        (tracks, stats)
    }
}
