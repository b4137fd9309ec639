use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::backend::{DocumentStore, FieldPath, lookup};
use crate::error::AtemateError;
use crate::wellness::tips::{HealthTip, TipBoard};
use crate::wellness::{USERS, text};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Home screen numbers for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: String,
    /// Part-of-day salutation at the caller's local time.
    pub greeting: &'static str,
    pub greeting_name: String,
    pub water_ml: u64,
    pub steps: u64,
    pub calories: u64,
    pub latest_tip: Option<HealthTip>,
}

/// Today's date key at `offset`, `YYYY-MM-DD`.
pub fn today(offset: FixedOffset) -> String {
    Utc::now()
        .with_timezone(&offset)
        .date_naive()
        .format(DATE_FORMAT)
        .to_string()
}

/// Wall-clock hour (0-23) at `offset`.
pub fn local_hour(now: DateTime<Utc>, offset: FixedOffset) -> u32 {
    now.with_timezone(&offset).hour()
}

/// Part-of-day salutation for a local hour (0-23).
pub fn greeting(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Good Morning",
        12..=17 => "Good Afternoon",
        _ => "Good Evening",
    }
}

fn date_key(date: &str) -> Result<String, AtemateError> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| AtemateError::InvalidInput(format!("date must be YYYY-MM-DD, got {date:?}")))
}

/// Per-day water and activity logs kept inside the user's profile document
/// (`waterTracker.<date>`, `fitnessTracker.<date>`).
pub struct Tracker {
    store: Arc<dyn DocumentStore>,
    tips: TipBoard,
}

impl Tracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            tips: TipBoard::new(store.clone()),
            store,
        }
    }

    /// Record the day's water intake, replacing any earlier entry for `date`.
    pub async fn log_water(&self, uid: &str, date: &str, ml: u32) -> Result<(), AtemateError> {
        if ml == 0 {
            return Err(AtemateError::InvalidInput("water intake must be positive".to_string()));
        }
        let key = date_key(date)?;
        self.store
            .update(
                USERS,
                uid,
                vec![(FieldPath::new(["waterTracker", key.as_str()]), json!(ml))],
            )
            .await?;
        tracing::info!(uid = uid, date = %key, ml = ml, "water logged");
        Ok(())
    }

    pub async fn log_fitness(
        &self,
        uid: &str,
        date: &str,
        steps: u32,
        calories: u32,
    ) -> Result<(), AtemateError> {
        let key = date_key(date)?;
        self.store
            .update(
                USERS,
                uid,
                vec![(
                    FieldPath::new(["fitnessTracker", key.as_str()]),
                    json!({"steps": steps, "calories": calories}),
                )],
            )
            .await?;
        tracing::info!(uid = uid, date = %key, steps = steps, calories = calories, "fitness logged");
        Ok(())
    }

    /// Missing profile or entries read as zero; the latest tip is best-effort.
    /// The greeting follows the clock at `offset` from UTC.
    pub async fn daily_summary(
        &self,
        uid: &str,
        date: &str,
        offset: FixedOffset,
    ) -> Result<DailySummary, AtemateError> {
        let key = date_key(date)?;
        let profile = self.store.get(USERS, uid).await?;

        let count = |path: FieldPath| -> u64 {
            profile
                .as_ref()
                .and_then(|doc| lookup(&doc.fields, &path))
                .and_then(as_count)
                .unwrap_or(0)
        };
        let water_ml = count(FieldPath::new(["waterTracker", key.as_str()]));
        let steps = count(FieldPath::new(["fitnessTracker", key.as_str(), "steps"]));
        let calories = count(FieldPath::new(["fitnessTracker", key.as_str(), "calories"]));

        let latest_tip = match self.tips.latest().await {
            Ok(tip) => tip,
            Err(e) => {
                tracing::warn!("latest tip unavailable: {e}");
                None
            }
        };

        Ok(DailySummary {
            greeting: greeting(local_hour(Utc::now(), offset)),
            greeting_name: profile
                .as_ref()
                .and_then(|doc| text(doc, "name"))
                .unwrap_or_else(|| "Guest".to_string()),
            date: key,
            water_ml,
            steps,
            calories,
            latest_tip,
        })
    }
}

/// Counts were historically typed into text fields, so accept numeric strings.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_boundaries() {
        assert_eq!(greeting(0), "Good Morning");
        assert_eq!(greeting(11), "Good Morning");
        assert_eq!(greeting(12), "Good Afternoon");
        assert_eq!(greeting(17), "Good Afternoon");
        assert_eq!(greeting(18), "Good Evening");
        assert_eq!(greeting(23), "Good Evening");
    }

    #[test]
    fn greeting_hour_follows_offset() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let utc = FixedOffset::east_opt(0).unwrap();
        let kolkata = FixedOffset::east_opt(330 * 60).unwrap();
        let los_angeles = FixedOffset::west_opt(7 * 3600).unwrap();

        assert_eq!(greeting(local_hour(now, utc)), "Good Evening");
        assert_eq!(local_hour(now, kolkata), 1);
        assert_eq!(greeting(local_hour(now, kolkata)), "Good Morning");
        assert_eq!(greeting(local_hour(now, los_angeles)), "Good Afternoon");
    }

    #[test]
    fn date_keys_are_normalized() {
        assert_eq!(date_key(" 2024-05-01 ").unwrap(), "2024-05-01");
        assert!(date_key("01/05/2024").is_err());
        assert!(date_key("").is_err());
    }

    #[test]
    fn counts_accept_numeric_text() {
        assert_eq!(as_count(&json!(1500)), Some(1500));
        assert_eq!(as_count(&json!("250")), Some(250));
        assert_eq!(as_count(&json!(-3)), None);
        assert_eq!(as_count(&json!("lots")), None);
    }
}
