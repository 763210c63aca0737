use crate::error::{NereusError, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// Daily usage payload of the smart meter endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MeterUsage {
    pub is_error: bool,
    pub is_data_available: bool,
    pub is_consumption_available: bool,
    #[serde(deserialize_with = "lenient_f64")]
    pub target_usage: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub average_usage: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub actual_usage: f64,
    pub lines: Vec<Line>,
}

/// One hourly line of a usage payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Line {
    /// Hour label, `HH:MM`
    pub label: String,
    /// Litres used in the hour
    #[serde(deserialize_with = "lenient_f64")]
    pub usage: f64,
    /// Meter register reading at the end of the hour
    #[serde(deserialize_with = "lenient_f64")]
    pub read: f64,
    pub is_estimated: bool,
    pub meter_serial_number_his: String,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            label: String::new(),
            usage: f64::NAN,
            read: f64::NAN,
            is_estimated: false,
            meter_serial_number_his: String::new(),
        }
    }
}

impl MeterUsage {
    /// Whether the payload carries consumption for the day
    pub fn has_data(&self) -> bool {
        !self.is_error && self.is_data_available && !self.lines.is_empty()
    }

    /// Total litres for the day, `None` for a gap.
    ///
    /// A line with an unparseable usage makes the total non-finite, which the
    /// reconciliation engine rejects as an invalid reading.
    pub fn daily_volume(&self) -> Option<f64> {
        if !self.has_data() {
            return None;
        }
        Some(self.lines.iter().map(|line| line.usage).sum())
    }
}

/// Numbers arrive as numbers, numeric strings or placeholders such as `"NA"`
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

/// Classify a read endpoint response.
///
/// 401/403 and HTML bodies (the portal redirects expired sessions to its
/// sign-in page) are authentication failures; 5xx, 429 and other non-success
/// statuses are transient. A 2xx JSON body that does not decode as a usage
/// payload yields `Ok(None)`.
pub fn parse_usage_response(status: u16, body: &str) -> Result<Option<MeterUsage>> {
    if status == 401 || status == 403 {
        return Err(NereusError::authentication(format!(
            "Provider rejected session (HTTP {})",
            status
        )));
    }
    if !(200..300).contains(&status) {
        return Err(NereusError::transient_fetch(format!(
            "Provider returned HTTP {}",
            status
        )));
    }

    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        return Err(NereusError::authentication(
            "Provider returned an HTML page instead of usage data",
        ));
    }

    Ok(serde_json::from_str::<MeterUsage>(trimmed).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_hourly_lines() {
        let body = r#"{
            "IsError": false,
            "IsDataAvailable": true,
            "IsConsumptionAvailable": true,
            "TargetUsage": 0,
            "AverageUsage": 0,
            "ActualUsage": 0,
            "MyUsage": "NA",
            "Lines": [
                {"Label": "00:00", "Usage": 12, "Read": 1000, "IsEstimated": false, "MeterSerialNumberHis": "X1"},
                {"Label": "01:00", "Usage": 3.5, "Read": 1003, "IsEstimated": false, "MeterSerialNumberHis": "X1"}
            ],
            "AlertsValues": {}
        }"#;
        let usage = parse_usage_response(200, body).unwrap().unwrap();
        assert_eq!(usage.lines.len(), 2);
        assert_eq!(usage.daily_volume(), Some(15.5));
    }

    #[test]
    fn unavailable_day_is_a_gap() {
        let body = r#"{"IsError": false, "IsDataAvailable": false, "Lines": []}"#;
        let usage = parse_usage_response(200, body).unwrap().unwrap();
        assert_eq!(usage.daily_volume(), None);

        let body = r#"{"IsError": true, "IsDataAvailable": true, "Lines": [{"Usage": 1}]}"#;
        let usage = parse_usage_response(200, body).unwrap().unwrap();
        assert_eq!(usage.daily_volume(), None);
    }

    #[test]
    fn non_numeric_usage_is_not_finite() {
        let body = r#"{"IsDataAvailable": true, "Lines": [{"Label": "00:00", "Usage": "NA"}]}"#;
        let usage = parse_usage_response(200, body).unwrap().unwrap();
        assert!(!usage.daily_volume().unwrap().is_finite());
    }

    #[test]
    fn status_classification() {
        assert!(parse_usage_response(401, "").unwrap_err().is_authentication());
        assert!(parse_usage_response(403, "").unwrap_err().is_authentication());
        assert!(parse_usage_response(502, "").unwrap_err().is_transient());
        assert!(parse_usage_response(429, "").unwrap_err().is_transient());
        assert!(
            parse_usage_response(200, "<!DOCTYPE html><html>")
                .unwrap_err()
                .is_authentication()
        );
        assert_eq!(parse_usage_response(200, "not json").unwrap(), None);
    }
}
