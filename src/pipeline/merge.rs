use serde::{Deserialize, Serialize};

use crate::osu_api::{format_mods, RankingEntry, UserScore};

use super::user_stats::UserStatsSupplement;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPlaySummary {
  pub title: String,
  /// Difficulty name.
  pub diff: String,
  pub cover: String,
  pub stars: f64,
  /// `""` for nomod, `"+HDDT"` otherwise.
  pub mods: String,
  pub pp: f64,
  /// Percentage, 0..=100.
  pub acc: f64,
}

impl From<&UserScore> for TopPlaySummary {
  fn from(score: &UserScore) -> Self {
    let beatmap = score.beatmap.as_ref();
    TopPlaySummary {
      title: score.beatmapset.title.clone(),
      diff: beatmap.map(|b| b.version.clone()).unwrap_or_default(),
      cover: score.beatmapset.covers.card.clone(),
      stars: beatmap.map(|b| b.difficulty_rating).unwrap_or(0.),
      mods: format_mods(&score.mods),
      pp: score.pp.unwrap_or(0.),
      acc: score.accuracy * 100.,
    }
  }
}

/// One user's row in the leaderboard snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRecord {
  pub rank: Option<u64>,
  pub id: u64,
  pub user: String,
  pub avatar: String,
  pub pp: f64,
  pub accuracy: f64,
  pub play_count: u64,
  pub play_time: u64,
  pub total_score: u64,
  pub total_hits: u64,
  pub ss_count: i64,
  pub s_count: i64,
  pub medals: usize,
  pub last_active: String,
  pub daily_pp: f64,
  pub top_play: Option<TopPlaySummary>,
}

/// Joins a ranking entry with whatever the other stages found for the same user.  Missing
/// supplementary stats fall back to zero medals and an epoch `last_active`.
pub fn build_record(
  entry: &RankingEntry,
  stats: Option<&UserStatsSupplement>,
  daily_pp: f64,
  top_play: Option<TopPlaySummary>,
) -> LeaderboardRecord {
  let stats = stats.cloned().unwrap_or_default();
  LeaderboardRecord {
    rank: entry.global_rank,
    id: entry.user.id,
    user: entry.user.username.clone(),
    avatar: entry.user.avatar_url.clone(),
    pp: entry.pp,
    accuracy: entry.hit_accuracy,
    play_count: entry.play_count,
    play_time: entry.play_time,
    total_score: entry.total_score,
    total_hits: entry.total_hits,
    ss_count: entry.grade_counts.total_ss(),
    s_count: entry.grade_counts.total_s(),
    medals: stats.medals,
    last_active: stats.last_active,
    daily_pp,
    top_play,
  }
}
