use nereus::config::{Config, MAX_SESSION_VALIDITY_MINUTES, MAX_WINDOW_DAYS};
use std::fs;

fn valid() -> Config {
    let mut cfg = Config::default();
    cfg.account.username = "user@example.com".to_string();
    cfg.account.password = "secret".to_string();
    cfg.account.account_number = "900000000001".to_string();
    cfg.account.meter_id = "123456".to_string();
    cfg
}

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = valid();
    cfg.pricing.liter_cost = 0.004;
    cfg.sync.fetch_hours = vec![6, 18];
    cfg.sync.fetch_minute = Some(7);
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.account.meter_id, "123456");
    assert!((loaded.pricing.liter_cost - 0.004).abs() < 1e-12);
    assert_eq!(loaded.sync.fetch_hours, vec![6, 18]);
    assert_eq!(loaded.sync.fetch_minute, Some(7));
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    assert!(valid().validate().is_ok());

    // Missing credentials
    assert!(Config::default().validate().is_err());

    // Price outside bounds
    let mut cfg = valid();
    cfg.pricing.liter_cost = 2.0;
    assert!(cfg.validate().is_err());

    // Hours and minute out of range
    cfg = valid();
    cfg.sync.fetch_hours = vec![24];
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.sync.fetch_hours.clear();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.sync.fetch_minute = Some(60);
    assert!(cfg.validate().is_err());

    // Windows and attempts
    cfg = valid();
    cfg.sync.backfill_days = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.sync.max_fetch_span_days = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.sync.backfill_days = MAX_WINDOW_DAYS;
    cfg.sync.max_fetch_span_days = MAX_WINDOW_DAYS;
    cfg.sync.revision_lookback_days = MAX_WINDOW_DAYS;
    assert!(cfg.validate().is_ok());

    cfg = valid();
    cfg.sync.backfill_days = 200_000_000;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.sync.max_fetch_span_days = MAX_WINDOW_DAYS + 1;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.sync.revision_lookback_days = u32::MAX;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.session.validity_minutes = u64::MAX;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.session.validity_minutes = MAX_SESSION_VALIDITY_MINUTES;
    assert!(cfg.validate().is_ok());

    cfg = valid();
    cfg.session.login_max_attempts = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.fetch.max_attempts = 0;
    assert!(cfg.validate().is_err());

    // Series must be distinct
    cfg = valid();
    cfg.statistics.cost_id = cfg.statistics.consumption_id.clone();
    assert!(cfg.validate().is_err());

    // Unknown timezone
    cfg = valid();
    cfg.timezone = "Mars/Olympus".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn partial_yaml_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        "account:\n  username: a\n  password: b\n  account_number: '1'\n  meter_id: '2'\nsync:\n  backfill_days: 7\n",
    )
    .unwrap();

    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.sync.backfill_days, 7);
    assert_eq!(cfg.sync.fetch_hours, vec![15, 23]);
    assert_eq!(cfg.timezone, "Europe/London");
    assert_eq!(cfg.pricing.currency, "GBP");
    assert!(cfg.validate().is_ok());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), "sync: [unclosed").unwrap();
    assert!(Config::from_file(tmp.path()).is_err());
}

#[test]
fn pricing_step_key_still_loads() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        "account:\n  username: a\n  password: b\n  account_number: '1'\n  meter_id: '2'\npricing:\n  liter_cost: 0.004\n  step: 0.00005\n",
    )
    .unwrap();

    let cfg = Config::from_file(tmp.path()).unwrap();
    assert!((cfg.pricing.liter_cost - 0.004).abs() < 1e-12);
    assert!(cfg.validate().is_ok());
}
