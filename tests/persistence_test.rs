use chrono::{NaiveDate, Utc};
use nereus::persistence::{PersistenceManager, PersistentState};

#[test]
fn default_state_values() {
    let s = PersistentState::default();
    assert_eq!(s.last_imported, None);
    assert_eq!(s.last_import_at, None);
    assert_eq!(s.unit_price_override, None);
}

#[test]
fn load_save_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("state.json");
    let path = path.to_string_lossy().to_string();
    let day = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();

    let mut mgr = PersistenceManager::new(&path);
    assert!(mgr.advance_cursor(day, Utc::now()));
    mgr.set_unit_price_override(Some(0.004));
    mgr.save().unwrap();

    let mut mgr2 = PersistenceManager::new(&path);
    mgr2.load().unwrap();
    assert_eq!(mgr2.cursor(), Some(day));
    assert_eq!(mgr2.unit_price_override(), Some(0.004));
    assert!(mgr2.state().last_import_at.is_some());
}

#[test]
fn save_leaves_no_temp_file() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("state.json");

    let mgr = PersistenceManager::new(&path.to_string_lossy());
    mgr.save().unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn corrupt_file_is_an_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), "{not json").unwrap();

    let mut mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    assert!(mgr.load().is_err());
    assert_eq!(mgr.cursor(), None);
}
