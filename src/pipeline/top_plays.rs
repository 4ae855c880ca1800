use fxhash::FxHashMap;

use crate::osu_api::{OsuApi, RankingEntry, Ruleset};

use super::{
  daily_pp::{daily_pp_for, DailyPP},
  merge::{build_record, LeaderboardRecord, TopPlaySummary},
  user_stats::UserStatsSupplement,
  PipelineConfig, StageReport,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TopPlayOutcome {
  Found(TopPlaySummary),
  /// The user has no best plays.
  Empty,
  /// The request failed or returned something that isn't a list of scores.
  Failed,
}

impl TopPlayOutcome {
  pub fn into_summary(self) -> Option<TopPlaySummary> {
    match self {
      TopPlayOutcome::Found(summary) => Some(summary),
      TopPlayOutcome::Empty | TopPlayOutcome::Failed => None,
    }
  }
}

pub async fn fetch_top_play(api: &dyn OsuApi, user_id: u64, mode: Ruleset) -> TopPlayOutcome {
  match api.fetch_best_scores(user_id, mode, 1).await {
    Ok(scores) => match scores.first() {
      Some(score) => TopPlayOutcome::Found(TopPlaySummary::from(score)),
      None => TopPlayOutcome::Empty,
    },
    Err(err) => {
      warn!("Failed to fetch top play for user {user_id}: {err}");
      TopPlayOutcome::Failed
    },
  }
}

/// Fetches every ranked user's best play in rounds of `config.group_size`.  All requests of a round
/// are in flight together on the current task; the next round starts only once every one of them
/// resolved and the group limiter lets it through.  Each member's final record is assembled as soon
/// as its request resolves, so records come back in ranking order.
pub async fn fetch_top_plays(
  api: &dyn OsuApi,
  config: &PipelineConfig,
  entries: &[RankingEntry],
  stats: &FxHashMap<u64, UserStatsSupplement>,
  daily_pp: &DailyPP,
) -> StageReport<Vec<LeaderboardRecord>> {
  let mut records = Vec::with_capacity(entries.len());
  let mut degraded = 0;

  for (round_ix, group) in entries.chunks(config.group_size.max(1)).enumerate() {
    config.group_limiter.acquire().await;

    let round = group.iter().map(|entry| async move {
      let user_id = entry.user.id;
      let outcome = fetch_top_play(api, user_id, config.mode).await;
      let failed = outcome == TopPlayOutcome::Failed;
      let record = build_record(
        entry,
        stats.get(&user_id),
        daily_pp_for(daily_pp, user_id),
        outcome.into_summary(),
      );
      (record, failed)
    });
    let results = futures::future::join_all(round).await;
    config.group_limiter.release().await;

    let round_failures = results.iter().filter(|(_, failed)| *failed).count();
    if round_failures > 0 {
      warn!(
        "Top play round {round_ix}: {round_failures} of {} requests failed",
        group.len()
      );
    }
    degraded += round_failures;
    records.extend(results.into_iter().map(|(record, _)| record));
  }

  StageReport {
    value: records,
    units: entries.len(),
    degraded,
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use async_trait::async_trait;

  use super::*;
  use crate::{
    error::APIError,
    osu_api::{RankingPage, UserProfile, UserScore},
    pipeline::test_support::*,
  };

  #[derive(Debug, Clone, Copy, PartialEq)]
  enum Event {
    Start(u64),
    End(u64),
  }

  /// Logs when each best-play request starts and ends, yielding in between so that requests of the
  /// same round interleave.
  struct RecordingApi {
    events: Arc<Mutex<Vec<Event>>>,
  }

  #[async_trait]
  impl OsuApi for RecordingApi {
    async fn fetch_ranking_page(
      &self,
      _mode: Ruleset,
      _country: &str,
      _page: u32,
    ) -> Result<RankingPage, APIError> {
      unreachable!()
    }

    async fn fetch_users(&self, _user_ids: &[u64]) -> Result<Vec<UserProfile>, APIError> {
      unreachable!()
    }

    async fn fetch_best_scores(
      &self,
      user_id: u64,
      _mode: Ruleset,
      _limit: u8,
    ) -> Result<Vec<UserScore>, APIError> {
      self.events.lock().unwrap().push(Event::Start(user_id));
      for _ in 0..(user_id % 3 + 1) {
        tokio::task::yield_now().await;
      }
      self.events.lock().unwrap().push(Event::End(user_id));
      Ok(vec![best_score(&format!("map {user_id}"))])
    }

    async fn fetch_recent_scores(
      &self,
      _user_id: u64,
      _limit: u8,
    ) -> Result<Vec<UserScore>, APIError> {
      unreachable!()
    }
  }

  #[tokio::test]
  async fn rounds_never_overlap() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let api = RecordingApi {
      events: events.clone(),
    };
    let entries = (1..=23).map(|id| entry(id, id)).collect::<Vec<_>>();

    let report = fetch_top_plays(
      &api,
      &config(),
      &entries,
      &FxHashMap::default(),
      &DailyPP::default(),
    )
    .await;

    assert_eq!(report.value.len(), 23);
    assert!(!report.is_degraded());

    let events = events.lock().unwrap().clone();
    let group_of = |id: u64| (id - 1) / 10;

    // 3 rounds of 10, 10 and 3 requests
    let mut starts_per_group = [0; 3];
    for event in &events {
      if let Event::Start(id) = event {
        starts_per_group[group_of(*id) as usize] += 1;
      }
    }
    assert_eq!(starts_per_group, [10, 10, 3]);

    // every request of round N resolved before any request of round N+1 started
    for (ix, event) in events.iter().enumerate() {
      if let Event::Start(id) = event {
        let group = group_of(*id);
        for earlier in &events[..ix] {
          if let Event::Start(other) | Event::End(other) = earlier {
            assert!(group_of(*other) <= group);
          }
        }
        for later in &events[ix..] {
          if let Event::End(other) = later {
            assert!(group_of(*other) >= group);
          }
        }
      }
    }

    // requests of a round are in flight together
    let first_end = events
      .iter()
      .position(|e| matches!(e, Event::End(_)))
      .unwrap();
    assert_eq!(first_end, 10);
  }

  #[tokio::test]
  async fn failed_or_empty_best_play_is_absent() {
    let mut api = FakeApi::default();
    api.best.insert(1, vec![best_score("Freedom Dive")]);
    api.best.insert(2, Vec::new());
    api.failing_best.insert(3);
    let entries = vec![entry(1, 1), entry(2, 2), entry(3, 3)];

    let mut stats = FxHashMap::default();
    stats.insert(3, UserStatsSupplement {
      medals: 7,
      last_active: "2025-05-01T12:00:00Z".to_owned(),
    });
    let mut daily_pp = DailyPP::default();
    daily_pp.insert(3, 88.);

    let report = fetch_top_plays(&api, &config(), &entries, &stats, &daily_pp).await;

    assert_eq!(report.units, 3);
    assert_eq!(report.degraded, 1);
    let records = report.value;
    assert_eq!(
      records[0].top_play.as_ref().map(|t| t.title.as_str()),
      Some("Freedom Dive")
    );
    assert!(records[1].top_play.is_none());
    assert!(records[2].top_play.is_none());
    // the failed request doesn't affect the other sources
    assert_eq!(records[2].medals, 7);
    assert_eq!(records[2].daily_pp, 88.);
    assert_eq!(records[2].user, "user3");
    assert_eq!(records[2].ss_count, 3);
  }

  #[tokio::test(start_paused = true)]
  async fn rounds_are_paced_by_the_group_limiter() {
    let api = FakeApi::default();
    let mut config = config();
    config.group_limiter = Box::new(crate::rate_limit::FixedInterval::from_millis(800));
    let entries = (1..=23).map(|id| entry(id, id)).collect::<Vec<_>>();
    let start = tokio::time::Instant::now();

    fetch_top_plays(
      &api,
      &config,
      &entries,
      &FxHashMap::default(),
      &DailyPP::default(),
    )
    .await;

    assert_eq!(start.elapsed(), std::time::Duration::from_millis(1600));
  }

  #[tokio::test(start_paused = true)]
  async fn slow_rounds_still_get_the_full_gap() {
    let api = FakeApi {
      latency: std::time::Duration::from_millis(1000),
      ..Default::default()
    };
    let mut config = config();
    config.group_limiter = Box::new(crate::rate_limit::FixedDelay::from_millis(800));
    let entries = (1..=23).map(|id| entry(id, id)).collect::<Vec<_>>();
    let start = tokio::time::Instant::now();

    fetch_top_plays(
      &api,
      &config,
      &entries,
      &FxHashMap::default(),
      &DailyPP::default(),
    )
    .await;

    // 3 rounds of one second each, with a full 800ms between them
    assert_eq!(start.elapsed(), std::time::Duration::from_millis(4600));
  }

  #[tokio::test]
  async fn zero_group_size_is_one_request_per_round() {
    let api = FakeApi::default();
    let mut config = config();
    config.group_size = 0;
    let entries = (1..=3).map(|id| entry(id, id)).collect::<Vec<_>>();

    let report = fetch_top_plays(
      &api,
      &config,
      &entries,
      &FxHashMap::default(),
      &DailyPP::default(),
    )
    .await;

    assert_eq!(report.value.len(), 3);
    assert_eq!(report.units, 3);
  }
}
