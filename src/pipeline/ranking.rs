use crate::osu_api::{OsuApi, RankingEntry};

use super::{PipelineConfig, StageReport};

/// Fetches pages `1..=config.pages` of the country ranking one after another.  A failed page is
/// logged and contributes nothing; entries are kept in page order and are not deduplicated.
pub async fn fetch_ranking(
  api: &dyn OsuApi,
  config: &PipelineConfig,
) -> StageReport<Vec<RankingEntry>> {
  info!(
    "Fetching top {} {} rankings for {}...",
    config.pages * 50,
    config.mode,
    config.country
  );

  let mut entries = Vec::new();
  let mut degraded = 0;
  for page in 1..=config.pages {
    config.page_limiter.acquire().await;
    let res = api
      .fetch_ranking_page(config.mode, &config.country, page)
      .await;
    config.page_limiter.release().await;
    match res {
      Ok(res) => entries.extend(res.ranking),
      Err(err) => {
        error!("Failed to fetch ranking page {page}: {err}");
        degraded += 1;
      },
    }
  }

  StageReport {
    value: entries,
    units: config.pages as usize,
    degraded,
  }
}
