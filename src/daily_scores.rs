//! Archive of the most recent scores set by the top users of the country ranking.  The leaderboard
//! job reads the same day's archive back to compute each user's daily pp.

use std::cmp::Reverse;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  osu_api::{OsuApi, RankingEntry, Ruleset, UserScore},
  pipeline::StageReport,
  rate_limit::RateLimiter,
  snapshot::SnapshotStore,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBeatmapset {
  pub id: i64,
  pub title: String,
  pub cover: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScore {
  pub user: String,
  pub user_id: u64,
  pub country: String,
  pub score_id: i64,
  pub rank: String,
  /// 0..=1
  pub accuracy: f64,
  pub pp: Option<f64>,
  pub mods: Vec<String>,
  pub combo: i64,
  pub created_at: Option<DateTime<Utc>>,
  pub beatmapset: ScoreBeatmapset,
}

impl DailyScore {
  fn new(player: &RankingEntry, country: &str, score: &UserScore) -> Self {
    DailyScore {
      user: player.user.username.clone(),
      user_id: player.user.id,
      country: country.to_owned(),
      score_id: score.id,
      rank: score.rank.clone(),
      accuracy: score.accuracy,
      pp: score.pp,
      mods: score.mods.iter().map(|m| m.acronym().to_owned()).collect(),
      combo: score.max_combo,
      created_at: score.created_at,
      beatmapset: ScoreBeatmapset {
        id: score.beatmapset.id,
        title: score.beatmapset.title.clone(),
        cover: score.beatmapset.covers.card.clone(),
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScoreSnapshot {
  pub date: NaiveDate,
  pub country: String,
  pub generated_at: DateTime<Utc>,
  pub scores: Vec<DailyScore>,
}

pub struct DailyScoresConfig {
  pub country: String,
  pub mode: Ruleset,
  pub top_users: usize,
  pub recent_limit: u8,
  pub limiter: Box<dyn RateLimiter>,
}

/// Collects the recent scores of the first `config.top_users` users of ranking page 1, one user at
/// a time, newest score first.  If the ranking page itself can't be fetched the snapshot is empty.
pub async fn collect_daily_scores(
  api: &dyn OsuApi,
  config: &DailyScoresConfig,
) -> StageReport<Vec<DailyScore>> {
  config.limiter.acquire().await;
  let page = api
    .fetch_ranking_page(config.mode, &config.country, 1)
    .await;
  config.limiter.release().await;
  let players = match page {
    Ok(page) => page.ranking,
    Err(err) => {
      error!("Failed to fetch ranking for daily scores: {err}");
      return StageReport {
        value: Vec::new(),
        units: 1,
        degraded: 1,
      };
    },
  };

  let mut scores = Vec::new();
  let mut degraded = 0;
  let players = &players[..players.len().min(config.top_users)];
  for player in players {
    config.limiter.acquire().await;
    let recent = api
      .fetch_recent_scores(player.user.id, config.recent_limit)
      .await;
    config.limiter.release().await;
    match recent {
      Ok(recent) => scores.extend(
        recent
          .iter()
          .map(|score| DailyScore::new(player, &config.country, score)),
      ),
      Err(err) => {
        error!(
          "Failed to fetch recent scores for {} ({}): {err}",
          player.user.username, player.user.id
        );
        degraded += 1;
      },
    }
  }

  scores.sort_by_key(|score| Reverse(score.created_at));

  StageReport {
    value: scores,
    units: players.len(),
    degraded,
  }
}

/// Collects and writes the daily score snapshot for `date`, then records the date in the daily
/// index.
pub async fn run_daily_scores_job(
  api: &dyn OsuApi,
  store: &SnapshotStore,
  config: &DailyScoresConfig,
  date: NaiveDate,
) -> std::io::Result<StageReport<usize>> {
  let report = collect_daily_scores(api, config)
    .await
    .record("daily_scores");
  let snapshot = DailyScoreSnapshot {
    date,
    country: config.country.clone(),
    generated_at: Utc::now(),
    scores: report.value,
  };
  let path = store.write_daily_scores(date, &snapshot).await?;
  info!(
    "Daily archive updated for {date}: {} scores in {}",
    snapshot.scores.len(),
    path.display()
  );

  Ok(StageReport {
    value: snapshot.scores.len(),
    units: report.units,
    degraded: report.degraded,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    pipeline::{daily_pp::aggregate_daily_pp, test_support::*},
    rate_limit::Unlimited,
  };

  fn config() -> DailyScoresConfig {
    DailyScoresConfig {
      country: "IQ".to_owned(),
      mode: Ruleset::Osu,
      top_users: 2,
      recent_limit: 5,
      limiter: Box::new(Unlimited),
    }
  }

  fn recent(id: i64, pp: f64, created_at: &str) -> UserScore {
    let mut score = best_score("Recent");
    score.id = id;
    score.pp = Some(pp);
    score.created_at = Some(created_at.parse().unwrap());
    score
  }

  #[tokio::test]
  async fn only_top_users_are_scraped_newest_first() {
    let mut api = FakeApi::default();
    api.pages = vec![vec![entry(1, 1), entry(2, 2), entry(3, 3)]];
    api
      .recent
      .insert(1, vec![recent(10, 100., "2025-01-01T08:00:00Z")]);
    api.recent.insert(2, vec![
      recent(20, 50., "2025-01-01T10:00:00Z"),
      recent(21, 25., "2025-01-01T06:00:00Z"),
    ]);
    api
      .recent
      .insert(3, vec![recent(30, 999., "2025-01-01T12:00:00Z")]);

    let report = collect_daily_scores(&api, &config()).await;

    let ids = report.value.iter().map(|s| s.score_id).collect::<Vec<_>>();
    assert_eq!(ids, vec![20, 10, 21]);
    assert_eq!(report.units, 2);
    assert_eq!(report.value[0].mods, vec!["HD".to_owned(), "DT".to_owned()]);
    assert_eq!(report.value[0].beatmapset.cover, "https://assets/card.jpg");
  }

  #[tokio::test]
  async fn failed_user_is_skipped() {
    let mut api = FakeApi::default();
    api.pages = vec![vec![entry(1, 1), entry(2, 2)]];
    api
      .recent
      .insert(2, vec![recent(20, 50., "2025-01-01T10:00:00Z")]);

    let report = collect_daily_scores(&api, &config()).await;

    assert_eq!(report.degraded, 1);
    assert_eq!(report.value.len(), 1);
    assert_eq!(report.value[0].user_id, 2);
  }

  #[tokio::test]
  async fn written_snapshot_feeds_daily_pp() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(tmp.path());
    let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let mut api = FakeApi::default();
    api.pages = vec![vec![entry(1, 1), entry(2, 2)]];
    api.recent.insert(1, vec![
      recent(10, 120., "2025-01-01T08:00:00Z"),
      recent(11, 30., "2025-01-01T09:00:00Z"),
    ]);
    api
      .recent
      .insert(2, vec![recent(20, 50., "2025-01-01T10:00:00Z")]);

    let report = run_daily_scores_job(&api, &store, &config(), date)
      .await
      .unwrap();
    assert_eq!(report.value, 3);

    let daily_pp = aggregate_daily_pp(&store.daily_scores_path(date)).await;
    assert!(!daily_pp.is_degraded());
    assert_eq!(daily_pp.value[&1], 150.);
    assert_eq!(daily_pp.value[&2], 50.);

    let index = crate::snapshot::load_index(&store.daily_scores_index_path())
      .await
      .unwrap();
    assert_eq!(index.available_dates, vec![date]);
  }
}
