//! Normalizes raw detector output into person detections.

use serde::{Deserialize, Serialize};

/// COCO class index for "person".
pub const PERSON_CLASS_ID: i32 = 0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned box in frame pixels, `[x1, y1, x2, y2]` on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One box as reported by the detector, before class filtering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: i32,
    pub confidence: f32,
    pub bbox: BBox,
}

/// A person sighting in the current frame, not yet bound to an identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub center: Point,
}

impl Detection {
    pub fn from_bbox(bbox: BBox) -> Self {
        Self {
            bbox,
            center: bbox.center(),
        }
    }
}

/// Keep every detection of `class_id`, whatever its confidence.
///
/// No suppression of overlapping boxes happens here; the detector is expected
/// to have done it. Boxes with non-finite coordinates are dropped.
pub fn person_detections(raw: &[RawDetection], class_id: i32) -> Vec<Detection> {
    raw.iter()
        .filter(|det| det.class_id == class_id)
        .filter(|det| {
            let ok = det.bbox.is_finite();
            if !ok {
                tracing::debug!("Dropping malformed box {:?}", det.bbox);
            }
            ok
        })
        .map(|det| Detection::from_bbox(det.bbox))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class_id: i32, confidence: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: bbox.into(),
        }
    }

    #[test]
    fn keeps_only_person_class_regardless_of_confidence() {
        let input = vec![
            raw(0, 0.01, [0.0, 0.0, 20.0, 40.0]),
            raw(2, 0.99, [10.0, 10.0, 30.0, 30.0]),
            raw(0, 0.9, [100.0, 100.0, 120.0, 160.0]),
        ];
        let dets = person_detections(&input, PERSON_CLASS_ID);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].center, Point::new(10.0, 20.0));
        assert_eq!(dets[1].center, Point::new(110.0, 130.0));
    }

    #[test]
    fn drops_non_finite_boxes() {
        let input = vec![raw(0, 0.5, [f32::NAN, 0.0, 10.0, 10.0])];
        assert!(person_detections(&input, PERSON_CLASS_ID).is_empty());
    }

    #[test]
    fn bbox_reads_from_json_array() {
        let det: RawDetection =
            serde_json::from_str(r#"{"class_id":0,"confidence":0.7,"bbox":[1,2,3,4]}"#).unwrap();
        assert_eq!(det.bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
