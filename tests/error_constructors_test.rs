use chrono::NaiveDate;
use nereus::error::NereusError;

#[test]
fn error_constructors_sync_classes() {
    assert!(matches!(
        NereusError::authentication("x"),
        NereusError::Authentication { .. }
    ));
    assert!(matches!(
        NereusError::transient_fetch("x"),
        NereusError::TransientFetch { .. }
    ));
    assert!(matches!(
        NereusError::persistence("x"),
        NereusError::Persistence { .. }
    ));

    let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
    match NereusError::invalid_reading(date, "negative") {
        NereusError::InvalidReading { date: d, message } => {
            assert_eq!(d, date);
            assert_eq!(message, "negative");
        }
        other => panic!("unexpected variant: {:?}", other),
    }
}

#[test]
fn error_constructors_ambient() {
    assert!(matches!(NereusError::config("x"), NereusError::Config { .. }));
    assert!(matches!(
        NereusError::validation("f", "m"),
        NereusError::Validation { .. }
    ));
    assert!(matches!(NereusError::io("x"), NereusError::Io { .. }));
    assert!(matches!(NereusError::generic("x"), NereusError::Generic { .. }));
}

#[test]
fn conversions_from_library_errors() {
    let io = std::io::Error::other("disk gone");
    assert!(matches!(NereusError::from(io), NereusError::Io { .. }));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(
        NereusError::from(json),
        NereusError::Serialization { .. }
    ));

    let yaml = serde_yaml::from_str::<Vec<u8>>("a: [").unwrap_err();
    assert!(matches!(
        NereusError::from(yaml),
        NereusError::Serialization { .. }
    ));

    let parse = NaiveDate::parse_from_str("not a date", "%Y-%m-%d").unwrap_err();
    match NereusError::from(parse) {
        NereusError::Validation { field, .. } => assert_eq!(field, "datetime"),
        other => panic!("unexpected variant: {:?}", other),
    }
}

#[test]
fn only_fetch_failures_are_transient() {
    assert!(NereusError::transient_fetch("x").is_transient());
    assert!(!NereusError::authentication("x").is_transient());
    assert!(!NereusError::persistence("x").is_transient());
    assert!(!NereusError::persistence("x").is_authentication());
}
