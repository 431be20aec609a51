//! Integration tests for the on-disk mount table

use std::thread;

use common::prelude::*;
use tempfile::TempDir;

#[test]
fn test_locked_writers_lose_no_updates() {
    let temp_dir = TempDir::new().unwrap();
    let table_path = temp_dir.path().join("sdm").join("mounts.tab");

    let writers: Vec<_> = (0..8)
        .map(|i| {
            let table_path = table_path.clone();
            thread::spawn(move || {
                let _lock = TableLock::acquire(&table_path).unwrap();
                let mut table = MountTable::load(&table_path).unwrap();
                table
                    .add(
                        &format!("dataset-{i}"),
                        &format!("/mnt/sdm/dataset-{i}"),
                        BackendKind::Fuse,
                        MountStatus::Unmounted,
                    )
                    .unwrap();
                table.save(&table_path).unwrap();
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let table = MountTable::load(&table_path).unwrap();
    assert_eq!(table.len(), 8);
    for i in 0..8 {
        assert_eq!(table.find_by_dataset(&format!("dataset-{i}")).len(), 1);
    }
}

#[test]
fn test_table_survives_reload() {
    let temp_dir = TempDir::new().unwrap();
    let table_path = temp_dir.path().join("mounts.tab");

    let mut table = MountTable::load(&table_path).unwrap();
    assert!(table.is_empty());
    assert!(table_path.exists());

    let fuse = table
        .add("Geo-2020", "/mnt/sdm/geo-2020", BackendKind::Fuse, MountStatus::Mounted)
        .unwrap();
    let rest = table
        .add(
            "geo-2020",
            "http://localhost:8080/sessions/geo-2020",
            BackendKind::Rest,
            MountStatus::Unmounted,
        )
        .unwrap();
    table.save(&table_path).unwrap();

    let reloaded = MountTable::load(&table_path).unwrap();
    assert_eq!(reloaded, table);
    assert_eq!(reloaded.find_by_dataset("GEO-2020").len(), 2);
    assert_eq!(reloaded.get(&fuse.id).unwrap().backend, BackendKind::Fuse);
    assert_eq!(
        reloaded.find_by_status(MountStatus::Unmounted),
        vec![reloaded.get(&rest.id).unwrap()]
    );
    assert!(!TableLock::lock_path(&table_path).exists());
}

#[test]
fn test_corrupt_table_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let table_path = temp_dir.path().join("mounts.tab");
    std::fs::write(&table_path, "abc\tgeo-2020\t/mnt/geo\tFUSE\n").unwrap();

    let err = MountTable::load(&table_path).unwrap_err();
    assert!(matches!(err, MountTableError::MalformedRecord(_)));
}
