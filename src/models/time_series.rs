use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses a timestamp given as RFC 3339, a naive date-time or a bare date.
///
/// Naive values are interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unparseable timestamp '{}'", raw)))
}

/// One hourly demand measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Observation {
    /// Timestamp of the measurement
    #[serde(deserialize_with = "deserialize_timestamp")]
    #[schema(value_type = String, example = "2024-03-01 13:00:00")]
    pub ds: DateTime<Utc>,
    /// Energy demand
    #[schema(example = 142.7)]
    pub y: f64,
}

impl Observation {
    pub fn new(ds: DateTime<Utc>, y: f64) -> Self {
        Self { ds, y }
    }
}

/// A single forecast step with its interval and additive components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastPoint {
    pub ds: DateTime<Utc>,
    /// Point forecast
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
    pub season_daily: f64,
    pub season_weekly: f64,
    pub season_yearly: f64,
}

/// Fit quality measured on the training set in the original units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastMetrics {
    /// Mean absolute error
    pub mae: f64,
    /// Root mean squared error
    pub rmse: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("2024-03-01T13:00:00Z")]
    #[case("2024-03-01T14:00:00+01:00")]
    #[case("2024-03-01 13:00:00")]
    #[case("2024-03-01T13:00:00")]
    #[case("2024-03-01 13:00")]
    fn accepts_common_timestamp_formats(#[case] raw: &str) {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
        assert_eq!(parse_timestamp(raw), Some(expected));
    }

    #[test]
    fn bare_date_is_midnight() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01"), Some(expected));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_timestamp("yesterday"), None);
        let err = serde_json::from_str::<Observation>(r#"{"ds": "yesterday", "y": 1.0}"#);
        assert!(err.is_err());
    }

    #[test]
    fn observation_requires_both_fields() {
        assert!(serde_json::from_str::<Observation>(r#"{"ds": "2024-03-01"}"#).is_err());
        assert!(serde_json::from_str::<Observation>(r#"{"y": 3.0}"#).is_err());
    }
}
