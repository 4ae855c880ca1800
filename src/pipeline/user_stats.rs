use fxhash::FxHashMap;

use crate::osu_api::{OsuApi, UserProfile};

use super::{PipelineConfig, StageReport};

/// `last_active` of users the bulk lookup has nothing for.
pub const NEVER_ACTIVE: &str = "1970-01-01T00:00:00.000Z";

/// Fields the ranking listing doesn't carry, from the bulk user lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStatsSupplement {
  pub medals: usize,
  /// The upstream `last_visit` timestamp, verbatim.
  pub last_active: String,
}

impl Default for UserStatsSupplement {
  fn default() -> Self {
    UserStatsSupplement {
      medals: 0,
      last_active: NEVER_ACTIVE.to_owned(),
    }
  }
}

impl From<&UserProfile> for UserStatsSupplement {
  fn from(profile: &UserProfile) -> Self {
    UserStatsSupplement {
      medals: profile
        .user_achievements
        .as_ref()
        .map(|achievements| achievements.len())
        .unwrap_or(0),
      last_active: profile
        .last_visit
        .clone()
        .unwrap_or_else(|| NEVER_ACTIVE.to_owned()),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct UserStats {
  pub stats: FxHashMap<u64, UserStatsSupplement>,
  /// Ids whose batch failed.  Their records carry the same defaults as users the upstream simply
  /// returned nothing for.
  pub failed_ids: Vec<u64>,
}

/// Looks users up in contiguous batches of `config.batch_size`, one request per batch.  Failed
/// batches are skipped and never retried.
pub async fn fetch_user_stats(
  api: &dyn OsuApi,
  config: &PipelineConfig,
  user_ids: &[u64],
) -> StageReport<UserStats> {
  let mut out = UserStats::default();
  let mut units = 0;
  let mut degraded = 0;

  for batch in user_ids.chunks(config.batch_size.max(1)) {
    units += 1;
    config.batch_limiter.acquire().await;
    let res = api.fetch_users(batch).await;
    config.batch_limiter.release().await;
    match res {
      Ok(users) => {
        for user in &users {
          out.stats.insert(user.id, UserStatsSupplement::from(user));
        }
      },
      Err(err) => {
        error!(
          "Failed user batch of {} starting at {}: {err}",
          batch.len(),
          batch[0]
        );
        degraded += 1;
        out.failed_ids.extend_from_slice(batch);
      },
    }
  }

  StageReport {
    value: out,
    units,
    degraded,
  }
}
