//! The leaderboard job: ranking pages -> bulk user stats -> daily pp -> best plays, merged into one
//! record per ranked user.

use chrono::NaiveDate;

use crate::{
  metrics::archiver,
  osu_api::{OsuApi, Ruleset},
  rate_limit::{FixedDelay, RateLimiter},
  settings::PipelineSettings,
  snapshot::SnapshotStore,
};

pub mod daily_pp;
pub mod merge;
pub mod ranking;
pub mod top_plays;
pub mod user_stats;

pub use merge::{LeaderboardRecord, TopPlaySummary};

/// What a stage produced, plus how much of it had to fall back to defaults.
#[derive(Debug, Clone)]
pub struct StageReport<T> {
  pub value: T,
  /// Units of work attempted (pages, batches, users).
  pub units: usize,
  /// Units that failed and were replaced by empty/default/absent values.
  pub degraded: usize,
}

impl<T> StageReport<T> {
  pub fn is_degraded(&self) -> bool { self.degraded > 0 }

  pub(crate) fn record(self, stage: &'static str) -> Self {
    archiver::stage_units_total(stage).inc_by(self.units as u64);
    archiver::stage_units_degraded_total(stage).inc_by(self.degraded as u64);
    if self.is_degraded() {
      warn!(
        "{stage}: {} of {} units degraded to default values",
        self.degraded, self.units
      );
    } else {
      info!("{stage}: {} units completed", self.units);
    }
    self
  }
}

/// Stage parameters with one rate limiter per network-calling stage.  A `batch_size` or
/// `group_size` of 0 is treated as 1.
pub struct PipelineConfig {
  pub country: String,
  pub mode: Ruleset,
  pub pages: u32,
  pub batch_size: usize,
  pub group_size: usize,
  pub page_limiter: Box<dyn RateLimiter>,
  pub batch_limiter: Box<dyn RateLimiter>,
  pub group_limiter: Box<dyn RateLimiter>,
}

impl PipelineConfig {
  pub fn from_settings(settings: &PipelineSettings) -> Self {
    PipelineConfig {
      country: settings.country.clone(),
      mode: settings.mode,
      pages: settings.pages,
      batch_size: settings.batch_size,
      group_size: settings.group_size,
      page_limiter: Box::new(FixedDelay::from_millis(settings.page_delay_ms)),
      batch_limiter: Box::new(FixedDelay::from_millis(settings.batch_delay_ms)),
      group_limiter: Box::new(FixedDelay::from_millis(settings.group_delay_ms)),
    }
  }
}

#[derive(Debug, Clone)]
pub struct LeaderboardRun {
  pub records: Vec<LeaderboardRecord>,
  pub ranking: StageReport<()>,
  pub user_stats: StageReport<()>,
  pub daily_pp: StageReport<()>,
  pub top_plays: StageReport<()>,
}

/// Runs every stage for `date` and returns the merged records.  Upstream failures never abort the
/// run; they show up as degraded counts in the returned reports.
pub async fn build_leaderboard(
  api: &dyn OsuApi,
  store: &SnapshotStore,
  config: &PipelineConfig,
  date: NaiveDate,
) -> LeaderboardRun {
  let ranking = ranking::fetch_ranking(api, config).await.record("ranking");
  let user_ids = ranking
    .value
    .iter()
    .map(|entry| entry.user.id)
    .collect::<Vec<_>>();

  info!("Fetching full stats for {} users...", user_ids.len());
  let user_stats = user_stats::fetch_user_stats(api, config, &user_ids)
    .await
    .record("user_stats");

  let daily_pp = daily_pp::aggregate_daily_pp(&store.daily_scores_path(date))
    .await
    .record("daily_pp");

  info!("Fetching top plays for {} users...", ranking.value.len());
  let top_plays = top_plays::fetch_top_plays(
    api,
    config,
    &ranking.value,
    &user_stats.value.stats,
    &daily_pp.value,
  )
  .await
  .record("top_plays");

  LeaderboardRun {
    ranking: strip(&ranking),
    user_stats: strip(&user_stats),
    daily_pp: strip(&daily_pp),
    top_plays: StageReport {
      value: (),
      units: top_plays.units,
      degraded: top_plays.degraded,
    },
    records: top_plays.value,
  }
}

fn strip<T>(report: &StageReport<T>) -> StageReport<()> {
  StageReport {
    value: (),
    units: report.units,
    degraded: report.degraded,
  }
}

/// [`build_leaderboard`] followed by writing the snapshot and updating the index.  Only the
/// persistence step can fail.
pub async fn run_leaderboard_job(
  api: &dyn OsuApi,
  store: &SnapshotStore,
  config: &PipelineConfig,
  date: NaiveDate,
) -> std::io::Result<LeaderboardRun> {
  let run = build_leaderboard(api, store, config, date).await;
  let path = store.write_leaderboard(date, &run.records).await?;
  info!("Saved {} users to {}", run.records.len(), path.display());
  Ok(run)
}


#[cfg(test)]
mod tests {
  use super::{test_support::*, *};
  use crate::osu_api::UserProfile;

  #[tokio::test]
  async fn every_ranked_user_gets_one_record() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(tmp.path());
    let date = NaiveDate::from_ymd_opt(2025, 4, 5).unwrap();

    let mut api = FakeApi::default();
    api.pages = vec![
      (1..=50).map(|id| entry(id, id)).collect(),
      (51..=73).map(|id| entry(id, id)).collect(),
    ];
    api.failing_pages.insert(3);
    api.profiles.insert(2, UserProfile {
      id: 2,
      last_visit: None,
      user_achievements: Some(Vec::new()),
    });
    api.failing_best.insert(5);

    let run = run_leaderboard_job(&api, &store, &config(), date)
      .await
      .unwrap();

    assert_eq!(run.records.len(), 73);
    let ids = run.records.iter().map(|r| r.id).collect::<Vec<_>>();
    assert_eq!(ids, (1..=73).collect::<Vec<_>>());
    assert_eq!(run.ranking.units, 3);
    assert_eq!(run.ranking.degraded, 1);
    assert_eq!(run.user_stats.units, 2);
    assert!(!run.user_stats.is_degraded());
    assert_eq!(run.top_plays.units, 73);
    assert_eq!(run.top_plays.degraded, 1);
    assert!(run.records.iter().all(|r| r.ss_count == 3 && r.s_count == 3));

    assert!(store.leaderboard_path(date).exists());
    let index = crate::snapshot::load_index(&store.leaderboard_index_path())
      .await
      .unwrap();
    assert_eq!(index.available_dates, vec![date]);
  }
}
