//! File-backed statistics store
//!
//! Keeps every series in memory and mirrors it to a single JSON file. A batch
//! is serialized in full, written to a temporary file and renamed over the
//! store before the in-memory copy is replaced, so a failed write leaves both
//! untouched.

use super::{SeriesId, SeriesMetadata, SeriesWrite, StatisticPoint, StatisticsSink};
use crate::error::{NereusError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default)]
struct Series {
    metadata: Option<SeriesMetadata>,
    points: BTreeMap<DateTime<Utc>, StatisticPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSeries {
    metadata: Option<SeriesMetadata>,
    points: Vec<StatisticPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    series: BTreeMap<SeriesId, StoredSeries>,
}

/// Statistics sink backed by a JSON file (or memory only)
pub struct StatisticsStore {
    path: Option<PathBuf>,
    series: Mutex<BTreeMap<SeriesId, Series>>,
    logger: crate::logging::StructuredLogger,
}

impl StatisticsStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            series: Mutex::new(BTreeMap::new()),
            logger: get_logger("statistics"),
        }
    }

    /// Open (or start) a store at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let logger = get_logger("statistics");

        let series = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let file: StoreFile = serde_json::from_str(&contents)?;
                if file.version != STORE_VERSION {
                    return Err(NereusError::persistence(format!(
                        "Unsupported statistics store version {} in {}",
                        file.version,
                        path.display()
                    )));
                }
                logger.info(&format!(
                    "Loaded {} statistic series from {}",
                    file.series.len(),
                    path.display()
                ));
                file.series
                    .into_iter()
                    .map(|(id, stored)| {
                        let points = stored.points.into_iter().map(|p| (p.start, p)).collect();
                        (
                            id,
                            Series {
                                metadata: stored.metadata,
                                points,
                            },
                        )
                    })
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                logger.info("No statistics store found, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            series: Mutex::new(series),
            logger,
        })
    }

    /// All points of a series, ascending
    pub async fn points(&self, series: &SeriesId) -> Vec<StatisticPoint> {
        let guard = self.series.lock().await;
        guard
            .get(series)
            .map(|s| s.points.values().copied().collect())
            .unwrap_or_default()
    }

    /// Metadata last written for a series
    pub async fn metadata(&self, series: &SeriesId) -> Option<SeriesMetadata> {
        let guard = self.series.lock().await;
        guard.get(series).and_then(|s| s.metadata.clone())
    }

    async fn persist(&self, snapshot: &BTreeMap<SeriesId, Series>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = StoreFile {
            version: STORE_VERSION,
            series: snapshot
                .iter()
                .map(|(id, s)| {
                    (
                        id.clone(),
                        StoredSeries {
                            metadata: s.metadata.clone(),
                            points: s.points.values().copied().collect(),
                        },
                    )
                })
                .collect(),
        };
        let contents = serde_json::to_string_pretty(&file)
            .map_err(|e| NereusError::persistence(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| NereusError::persistence(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| NereusError::persistence(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StatisticsSink for StatisticsStore {
    async fn last_point(&self, series: &SeriesId) -> Result<Option<StatisticPoint>> {
        let guard = self.series.lock().await;
        Ok(guard
            .get(series)
            .and_then(|s| s.points.values().next_back().copied()))
    }

    async fn point_before(
        &self,
        series: &SeriesId,
        start: DateTime<Utc>,
    ) -> Result<Option<StatisticPoint>> {
        let guard = self.series.lock().await;
        Ok(guard
            .get(series)
            .and_then(|s| s.points.range(..start).next_back().map(|(_, p)| *p)))
    }

    async fn points_since(
        &self,
        series: &SeriesId,
        start: DateTime<Utc>,
    ) -> Result<Vec<StatisticPoint>> {
        let guard = self.series.lock().await;
        Ok(guard
            .get(series)
            .map(|s| s.points.range(start..).map(|(_, p)| *p).collect())
            .unwrap_or_default())
    }

    async fn write_batch(&self, writes: &[SeriesWrite]) -> Result<()> {
        let mut guard = self.series.lock().await;

        let mut next = guard.clone();
        let mut total = 0usize;
        for write in writes {
            let entry = next
                .entry(write.metadata.statistic_id.clone())
                .or_default();
            entry.metadata = Some(write.metadata.clone());
            for point in &write.points {
                entry.points.insert(point.start, *point);
            }
            total += write.points.len();
        }

        self.persist(&next).await?;
        *guard = next;

        self.logger.debug(&format!(
            "Committed {} points across {} series",
            total,
            writes.len()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap()
    }

    fn write(id: &str, points: Vec<StatisticPoint>) -> SeriesWrite {
        SeriesWrite {
            metadata: SeriesMetadata::new(SeriesId::new(id), "Test", "L"),
            points,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_same_start() {
        let store = StatisticsStore::in_memory();
        let id = SeriesId::new("nereus:test");

        store
            .write_batch(&[write(
                "nereus:test",
                vec![
                    StatisticPoint::cumulative(at(1), 1.0),
                    StatisticPoint::cumulative(at(2), 3.0),
                ],
            )])
            .await
            .unwrap();
        store
            .write_batch(&[write(
                "nereus:test",
                vec![StatisticPoint::cumulative(at(2), 4.0)],
            )])
            .await
            .unwrap();

        let points = store.points(&id).await;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].sum, 4.0);
        assert_eq!(store.last_point(&id).await.unwrap().unwrap().sum, 4.0);
        assert_eq!(
            store.point_before(&id, at(2)).await.unwrap().unwrap().start,
            at(1)
        );
        assert_eq!(store.points_since(&id, at(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_series_reads_empty() {
        let store = StatisticsStore::in_memory();
        let id = SeriesId::new("nereus:none");
        assert!(store.last_point(&id).await.unwrap().is_none());
        assert!(store.points_since(&id, at(1)).await.unwrap().is_empty());
    }
}
