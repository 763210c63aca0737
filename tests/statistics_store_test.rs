use chrono::{TimeZone, Utc};
use nereus::error::NereusError;
use nereus::statistics::{
    SeriesId, SeriesMetadata, SeriesWrite, StatisticPoint, StatisticsSink, StatisticsStore,
};

fn batch(points: &[(u32, f64)]) -> Vec<SeriesWrite> {
    let make = |id: &str, unit: &str, scale: f64| SeriesWrite {
        metadata: SeriesMetadata::new(SeriesId::new(id), "Test", unit),
        points: points
            .iter()
            .map(|(d, sum)| {
                StatisticPoint::cumulative(
                    Utc.with_ymd_and_hms(2025, 1, *d, 0, 0, 0).unwrap(),
                    sum * scale,
                )
            })
            .collect(),
    };
    vec![
        make("nereus:water_consumption", "L", 1.0),
        make("nereus:water_cost", "GBP", 0.002),
    ]
}

#[tokio::test]
async fn reopen_restores_series_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");

    let store = StatisticsStore::open(&path).await.unwrap();
    store.write_batch(&batch(&[(1, 10.0), (2, 25.0)])).await.unwrap();
    drop(store);

    let reopened = StatisticsStore::open(&path).await.unwrap();
    let id = SeriesId::new("nereus:water_consumption");
    let points = reopened.points(&id).await;
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].sum, 25.0);

    let meta = reopened
        .metadata(&SeriesId::new("nereus:water_cost"))
        .await
        .unwrap();
    assert_eq!(meta.unit, "GBP");
    assert_eq!(meta.source, "nereus");
    assert!(!path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn failed_write_commits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("stats.json");

    let store = StatisticsStore::open(&path).await.unwrap();
    let err = store.write_batch(&batch(&[(1, 10.0)])).await.unwrap_err();
    assert!(matches!(err, NereusError::Persistence { .. }));

    for id in ["nereus:water_consumption", "nereus:water_cost"] {
        let id = SeriesId::new(id);
        assert!(store.last_point(&id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn unsupported_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");
    std::fs::write(&path, r#"{"version": 99, "series": {}}"#).unwrap();

    let err = StatisticsStore::open(&path).await.err().unwrap();
    assert!(matches!(err, NereusError::Persistence { .. }));
}

#[tokio::test]
async fn range_reads_are_ordered() {
    let store = StatisticsStore::in_memory();
    store
        .write_batch(&batch(&[(3, 30.0), (1, 10.0), (2, 20.0)]))
        .await
        .unwrap();
    let id = SeriesId::new("nereus:water_consumption");

    let since = store
        .points_since(&id, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap())
        .await
        .unwrap();
    let sums: Vec<f64> = since.iter().map(|p| p.sum).collect();
    assert_eq!(sums, vec![20.0, 30.0]);

    let before = store
        .point_before(&id, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        .await
        .unwrap();
    assert!(before.is_none());
}
