use tempfile::tempdir;
use zonecount::{
    zones::{self, Zone},
    ZoneRect, ZoneStore,
};

#[test]
fn absent_file_then_add_save_reload() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("zones.json");

    let mut store = ZoneStore::open(&path);
    assert!(store.is_empty());
    assert_eq!(store.add(ZoneRect::new(10, 10, 100, 100)).expect("add"), 0);

    let reloaded = zones::load(&path);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].rect, ZoneRect::new(10, 10, 100, 100));
    assert_eq!(reloaded[0].created_at, store.get(0).expect("zone").created_at);
}

#[test]
fn round_trip_keeps_order_and_timestamps() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("zones.json");
    let saved = vec![
        Zone {
            rect: ZoneRect::new(300, 40, 120, 200),
            created_at: "2024-05-01 08:00:00".to_string(),
        },
        Zone {
            rect: ZoneRect::new(0, 0, 50, 50),
            created_at: "2024-05-01 08:00:07".to_string(),
        },
    ];
    zones::save(&path, &saved).expect("save");
    assert_eq!(zones::load(&path), saved);
}

#[test]
fn every_mutation_is_written_through() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("zones.json");
    let mut store = ZoneStore::open(&path);
    store.add(ZoneRect::new(0, 0, 50, 50)).expect("add");
    store.add(ZoneRect::new(100, 100, 200, 200)).expect("add");
    assert_eq!(zones::load(&path).len(), 2);

    assert!(store.remove_last().expect("remove"));
    assert_eq!(zones::load(&path).len(), 1);

    store.clear().expect("clear");
    assert!(zones::load(&path).is_empty());
    assert!(path.exists());
}

#[test]
fn degenerate_zone_leaves_file_untouched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("zones.json");
    let mut store = ZoneStore::open(&path);
    assert!(store.add(ZoneRect::new(0, 0, 10, 300)).is_err());
    assert!(store.is_empty());
    assert!(!path.exists());
}

#[test]
fn corrupt_file_loads_as_empty() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("zones.json");
    std::fs::write(&path, "{ not json").expect("write");
    assert!(ZoneStore::open(&path).is_empty());
}

#[test]
fn failed_write_rolls_back() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("missing-dir").join("zones.json");
    let mut store = ZoneStore::open(&path);
    let err = store.add(ZoneRect::new(0, 0, 50, 50)).expect_err("no parent dir");
    assert!(!err.is_degenerate());
    assert!(store.is_empty());
}

#[test]
fn file_reads_original_layout() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("zones.json");
    std::fs::write(
        &path,
        r#"[
    {
        "x1": 12,
        "y1": 34,
        "x2": 200,
        "y2": 300,
        "created_at": "2025-01-15 10:20:30"
    }
]"#,
    )
    .expect("write");
    let store = ZoneStore::open(&path);
    let zone = store.get(0).expect("zone");
    assert_eq!(zone.rect, ZoneRect::new(12, 34, 200, 300));
    assert_eq!(zone.created_at, "2025-01-15 10:20:30");
}
