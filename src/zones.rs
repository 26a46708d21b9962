//! Rectangular zones and their JSON persistence.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{detection::Point, error::ZoneError};

/// Both sides of a zone must be strictly longer than this many pixels.
pub const MIN_ZONE_SIDE: u32 = 10;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Two opposite corners in frame pixels, in whatever order they were drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl ZoneRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.abs_diff(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.abs_diff(self.y1)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= MIN_ZONE_SIDE || self.height() <= MIN_ZONE_SIDE
    }

    /// Strict containment; points on an edge are outside.
    pub fn contains(&self, p: Point) -> bool {
        let (left, right) = (self.x1.min(self.x2) as f32, self.x1.max(self.x2) as f32);
        let (top, bottom) = (self.y1.min(self.y2) as f32, self.y1.max(self.y2) as f32);
        left < p.x && p.x < right && top < p.y && p.y < bottom
    }
}

impl fmt::Display for ZoneRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

impl FromStr for ZoneRect {
    type Err = String;

    /// Parses `x1,y1,x2,y2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| format!("invalid coordinate in {s:?}: {err}"))?;
        match parts.as_slice() {
            [x1, y1, x2, y2] => Ok(Self::new(*x1, *y1, *x2, *y2)),
            _ => Err(format!("expected x1,y1,x2,y2, got {s:?}")),
        }
    }
}

/// A persisted zone: the rectangle plus when it was created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(flatten)]
    pub rect: ZoneRect,
    pub created_at: String,
}

impl Zone {
    pub fn contains(&self, p: Point) -> bool {
        self.rect.contains(p)
    }
}

/// Read zones from `path`. A missing or unreadable file yields no zones.
pub fn load(path: &Path) -> Vec<Zone> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No zone file at {}", path.display());
            return Vec::new();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {}. Starting with no zones.", path.display(), err);
            return Vec::new();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(zones) => zones,
        Err(err) => {
            tracing::warn!("Corrupt zone file {}: {}. Starting with no zones.", path.display(), err);
            Vec::new()
        }
    }
}

/// Overwrite `path` with the full zone list.
///
/// The list is written to a sibling temporary file first and renamed into
/// place, so a failed write leaves the previous file untouched.
pub fn save(path: &Path, zones: &[Zone]) -> Result<(), ZoneError> {
    let json = serde_json::to_string_pretty(zones)?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    let persist_err = |source| ZoneError::Persist {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, json).map_err(persist_err)?;
    fs::rename(&tmp, path).map_err(persist_err)?;
    Ok(())
}

/// Ordered zone list. When opened on a file, every mutation is written
/// through before it returns.
#[derive(Debug, Default)]
pub struct ZoneStore {
    zones: Vec<Zone>,
    path: Option<PathBuf>,
}

impl ZoneStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let zones = load(&path);
        tracing::info!("Loaded {} zone(s) from {}", zones.len(), path.display());
        Self {
            zones,
            path: Some(path),
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    /// Append a zone stamped with the current local time, returning its index.
    pub fn add(&mut self, rect: ZoneRect) -> Result<usize, ZoneError> {
        if rect.is_degenerate() {
            return Err(ZoneError::Degenerate {
                width: rect.width(),
                height: rect.height(),
                min: MIN_ZONE_SIDE,
            });
        }
        let created_at = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.zones.push(Zone { rect, created_at });
        if let Err(err) = self.persist() {
            self.zones.pop();
            return Err(err);
        }
        Ok(self.zones.len() - 1)
    }

    /// Drop the most recent zone. Returns `false` when there was none.
    pub fn remove_last(&mut self) -> Result<bool, ZoneError> {
        let Some(removed) = self.zones.pop() else {
            return Ok(false);
        };
        if let Err(err) = self.persist() {
            self.zones.push(removed);
            return Err(err);
        }
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), ZoneError> {
        let previous = std::mem::take(&mut self.zones);
        if let Err(err) = self.persist() {
            self.zones = previous;
            return Err(err);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), ZoneError> {
        match &self.path {
            Some(path) => save(path, &self.zones),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_rectangles() {
        let mut store = ZoneStore::in_memory();
        for rect in [
            ZoneRect::new(0, 0, 10, 100),
            ZoneRect::new(0, 0, 100, 10),
            ZoneRect::new(50, 50, 45, 200),
            ZoneRect::new(5, 5, 5, 5),
        ] {
            let err = store.add(rect).unwrap_err();
            assert!(err.is_degenerate());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn extreme_corners_do_not_overflow() {
        let wide = ZoneRect::new(i32::MIN, 0, i32::MAX, 100);
        assert_eq!(wide.width(), u32::MAX);
        assert_eq!(wide.height(), 100);
        assert!(!wide.is_degenerate());
        assert!(ZoneRect::new(i32::MAX, i32::MIN, i32::MIN, i32::MAX).contains(Point::new(0.0, 0.0)));
        assert!(ZoneRect::new(i32::MIN, i32::MIN, i32::MIN + 5, i32::MAX).is_degenerate());

        let mut store = ZoneStore::in_memory();
        assert_eq!(store.add("-2147483648,0,2147483647,100".parse().unwrap()).unwrap(), 0);
    }

    #[test]
    fn accepts_corners_in_any_order() {
        let mut store = ZoneStore::in_memory();
        assert_eq!(store.add(ZoneRect::new(100, 100, 20, 20)).unwrap(), 0);
        assert_eq!(store.add(ZoneRect::new(0, 0, 11, 11)).unwrap(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn remove_last_on_empty_reports_false() {
        let mut store = ZoneStore::in_memory();
        assert!(!store.remove_last().unwrap());
        store.add(ZoneRect::new(0, 0, 50, 50)).unwrap();
        assert!(store.remove_last().unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn containment_is_strict() {
        let rect = ZoneRect::new(10, 10, 100, 100);
        assert!(rect.contains(Point::new(50.0, 50.0)));
        assert!(!rect.contains(Point::new(10.0, 50.0)));
        assert!(!rect.contains(Point::new(50.0, 100.0)));
        assert!(ZoneRect::new(100, 100, 10, 10).contains(Point::new(50.0, 50.0)));
    }

    #[test]
    fn parses_rect_argument() {
        assert_eq!("10, 20,30,40".parse::<ZoneRect>().unwrap(), ZoneRect::new(10, 20, 30, 40));
        assert!("10,20,30".parse::<ZoneRect>().is_err());
        assert!("a,b,c,d".parse::<ZoneRect>().is_err());
    }

    #[test]
    fn zone_file_layout_is_flat() {
        let zone = Zone {
            rect: ZoneRect::new(1, 2, 3, 4),
            created_at: "2024-01-02 03:04:05".to_string(),
        };
        let value = serde_json::to_value(&zone).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"x1":1,"y1":2,"x2":3,"y2":4,"created_at":"2024-01-02 03:04:05"})
        );
    }
}
