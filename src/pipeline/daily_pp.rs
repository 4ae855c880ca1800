use std::{io, path::Path};

use fxhash::FxHashMap;
use serde::Deserialize;

use super::StageReport;

/// Performance points each user scored on the day, keyed by user id.
pub type DailyPP = FxHashMap<u64, f64>;

pub fn daily_pp_for(daily_pp: &DailyPP, user_id: u64) -> f64 {
  daily_pp.get(&user_id).copied().unwrap_or(0.)
}

#[derive(Deserialize)]
struct DailyScoresFile {
  #[serde(default)]
  scores: Vec<DailyScoreRef>,
}

#[derive(Deserialize)]
struct DailyScoreRef {
  user_id: u64,
  #[serde(default)]
  pp: Option<f64>,
}

pub fn sum_daily_pp(raw: &str) -> Result<DailyPP, serde_path_to_error::Error<serde_json::Error>> {
  let deserializer = &mut serde_json::Deserializer::from_str(raw);
  let file: DailyScoresFile = serde_path_to_error::deserialize(deserializer)?;

  let mut totals = DailyPP::default();
  for score in file.scores {
    *totals.entry(score.user_id).or_insert(0.) += score.pp.unwrap_or(0.);
  }
  Ok(totals)
}

/// Sums the pp of every score in the daily score snapshot at `path`.  A missing snapshot is the
/// normal case before the day's scrape has run and yields an empty map; an unreadable one is
/// logged and reported as degraded.
pub async fn aggregate_daily_pp(path: &Path) -> StageReport<DailyPP> {
  let degraded = |value| StageReport {
    value,
    units: 1,
    degraded: 1,
  };

  let raw = match tokio::fs::read_to_string(path).await {
    Ok(raw) => raw,
    Err(err) if err.kind() == io::ErrorKind::NotFound => {
      info!("No daily score snapshot at {}; daily pp is zero", path.display());
      return StageReport {
        value: DailyPP::default(),
        units: 1,
        degraded: 0,
      };
    },
    Err(err) => {
      error!("Failed to read daily score snapshot {}: {err}", path.display());
      return degraded(DailyPP::default());
    },
  };

  match sum_daily_pp(&raw) {
    Ok(totals) => StageReport {
      value: totals,
      units: 1,
      degraded: 0,
    },
    Err(err) => {
      error!("Failed to parse daily score snapshot {}: {err}", path.display());
      degraded(DailyPP::default())
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sums_pp_per_user() {
    let totals = sum_daily_pp(
      r#"{"date":"2025-01-01","scores":[
        {"user_id":1,"pp":120},
        {"user_id":1,"pp":30},
        {"user_id":2,"pp":50}
      ]}"#,
    )
    .unwrap();

    assert_eq!(totals.len(), 2);
    assert_eq!(daily_pp_for(&totals, 1), 150.);
    assert_eq!(daily_pp_for(&totals, 2), 50.);
    assert_eq!(daily_pp_for(&totals, 3), 0.);
  }

  #[test]
  fn null_pp_counts_as_zero() {
    let totals =
      sum_daily_pp(r#"{"scores":[{"user_id":4,"pp":null},{"user_id":4,"pp":12.5}]}"#).unwrap();
    assert_eq!(daily_pp_for(&totals, 4), 12.5);
  }

  #[test]
  fn missing_scores_field_is_empty() {
    assert!(sum_daily_pp(r#"{"date":"2025-01-01"}"#).unwrap().is_empty());
  }

  #[tokio::test]
  async fn missing_snapshot_is_not_degraded() {
    let tmp = tempfile::tempdir().unwrap();
    let report = aggregate_daily_pp(&tmp.path().join("2025/01/01.json")).await;
    assert!(report.value.is_empty());
    assert!(!report.is_degraded());
  }

  #[tokio::test]
  async fn malformed_snapshot_is_degraded() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("01.json");
    tokio::fs::write(&path, r#"{"scores":[{"pp":3}]}"#)
      .await
      .unwrap();

    let report = aggregate_daily_pp(&path).await;
    assert!(report.value.is_empty());
    assert_eq!(report.degraded, 1);
  }
}
