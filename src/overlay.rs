//! Draw directives handed to whatever paints the frame.

use crate::{
    counting::{CrossingCounter, ZoneOccupancy},
    detection::BBox,
    tracker::{Track, TrackId},
    zones::{ZoneRect, ZoneStore},
};

#[derive(Clone, Debug, PartialEq)]
pub enum DrawDirective {
    TrackBox {
        id: TrackId,
        bbox: BBox,
        label: String,
    },
    ZoneBox {
        index: usize,
        rect: ZoneRect,
        label: String,
        tally: u64,
    },
    CrossingLine {
        y: f32,
    },
    Dashboard {
        entry: u64,
        exit: u64,
        active: usize,
    },
}

/// Everything to draw for one frame, in paint order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overlay {
    pub directives: Vec<DrawDirective>,
}

impl Overlay {
    pub fn compose(
        tracks: &[Track],
        zones: &ZoneStore,
        occupancy: &ZoneOccupancy,
        crossing: &CrossingCounter,
    ) -> Self {
        let mut directives = Vec::with_capacity(tracks.len() + zones.len() + 2);
        directives.extend(tracks.iter().map(|track| DrawDirective::TrackBox {
            id: track.id,
            bbox: track.bbox,
            label: format!("ID {}", track.id),
        }));
        directives.extend(zones.iter().enumerate().map(|(index, zone)| {
            let tally = occupancy.tally(index);
            DrawDirective::ZoneBox {
                index,
                rect: zone.rect,
                label: format!("Zone {}: {}", index + 1, tally),
                tally,
            }
        }));
        directives.push(DrawDirective::CrossingLine {
            y: crossing.line_y(),
        });
        let totals = crossing.totals();
        directives.push(DrawDirective::Dashboard {
            entry: totals.entry,
            exit: totals.exit,
            active: tracks.len(),
        });
        Self { directives }
    }

    pub fn dashboard(&self) -> Option<(u64, u64, usize)> {
        self.directives.iter().find_map(|d| match d {
            DrawDirective::Dashboard {
                entry,
                exit,
                active,
            } => Some((*entry, *exit, *active)),
            _ => None,
        })
    }
}
