#[macro_use]
extern crate tracing;

use chrono::Utc;
use foundations::{
  cli::Cli,
  telemetry::{self, TelemetryConfig},
  BootstrapError, BootstrapResult,
};
use osu_country_archiver::{
  daily_scores::{run_daily_scores_job, DailyScoresConfig},
  oauth::{fetch_access_token, ClientInfo, REQWEST_CLIENT},
  osu_api::OsuClient,
  pipeline::{run_leaderboard_job, PipelineConfig},
  rate_limit::FixedInterval,
  settings::ArchiverSettings,
  snapshot::SnapshotStore,
  videos::{run_videos_job, Channel, VideosConfig, YtDlp},
};

#[tokio::main]
async fn main() -> BootstrapResult<()> {
  tracing_subscriber::fmt::init();

  let service_info = foundations::service_info!();
  let cli = Cli::<ArchiverSettings>::new(&service_info, vec![])?;
  let settings = cli.settings;

  let tele_driver = telemetry::init(TelemetryConfig {
    service_info: &service_info,
    settings: &settings.telemetry,
    custom_server_routes: vec![],
  })?;
  tokio::spawn(tele_driver);

  let jobs = &settings.jobs;
  if !jobs.daily_scores && !jobs.leaderboard && !jobs.videos {
    warn!("All jobs are disabled in settings; nothing to do");
    return Ok(());
  }

  let store = SnapshotStore::new(&settings.data_dir);

  if jobs.videos {
    let config = VideosConfig {
      channels: settings
        .videos
        .channels
        .iter()
        .map(|channel| Channel {
          name: channel.name.clone(),
          url: channel.url.clone(),
        })
        .collect(),
      uploads_per_channel: settings.videos.uploads_per_channel,
    };
    let source = YtDlp::new(settings.videos.yt_dlp_path.clone());
    let report = run_videos_job(&source, &store, &config).await?;
    info!(
      "Indexed {} videos ({} of {} channels failed)",
      report.value, report.degraded, report.units
    );
  }

  if !jobs.daily_scores && !jobs.leaderboard {
    return Ok(());
  }

  let client_info = ClientInfo::resolve(settings.osu_client_id, &settings.osu_client_secret)
    .map_err(BootstrapError::msg)?;
  let token = fetch_access_token(&settings.api_base_url, &client_info).await?;
  info!("Fetched OAuth token valid for {}s", token.expires_in);
  let api = OsuClient::new(
    REQWEST_CLIENT.clone(),
    settings.api_base_url.clone(),
    token.build_auth_header(),
  );

  let date = Utc::now().date_naive();

  if jobs.daily_scores {
    let config = DailyScoresConfig {
      country: settings.pipeline.country.clone(),
      mode: settings.pipeline.mode,
      top_users: settings.daily.top_users,
      recent_limit: settings.daily.recent_limit,
      limiter: Box::new(FixedInterval::from_millis(settings.daily.request_delay_ms)),
    };
    let report = run_daily_scores_job(&api, &store, &config, date).await?;
    info!(
      "Archived {} recent scores ({} of {} users failed)",
      report.value, report.degraded, report.units
    );
  }

  if jobs.leaderboard {
    let config = PipelineConfig::from_settings(&settings.pipeline);
    let run = run_leaderboard_job(&api, &store, &config, date).await?;
    info!(
      "Leaderboard for {date}: {} users; degraded pages: {}, user batches: {}, daily pp: {}, top \
       plays: {}",
      run.records.len(),
      run.ranking.degraded,
      run.user_stats.degraded,
      run.daily_pp.degraded,
      run.top_plays.degraded
    );
  }

  Ok(())
}
