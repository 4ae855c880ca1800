use foundations::{
  settings::{settings, Settings},
  telemetry::settings::TelemetrySettings,
};
use serde_default_utils::*;

use crate::osu_api::Ruleset;

impl Settings for Ruleset {}

fn default_api_base_url() -> String { "https://osu.ppy.sh".to_owned() }

fn default_country() -> String { "IQ".to_owned() }

fn default_data_dir() -> String { "data".to_owned() }

fn default_yt_dlp_path() -> String { "yt-dlp".to_owned() }

fn default_channels() -> Vec<ChannelSettings> {
  [
    ("FancyToast", "https://www.youtube.com/channel/UCAZTO65RFJoH3thMzFlnHvw"),
    ("Ano", "https://www.youtube.com/@ano8859"),
    ("Len", "https://youtube.com/@len_osu"),
    ("Solar", "https://youtube.com/@ysolar"),
    ("Gree", "https://youtube.com/@greevcs"),
  ]
  .into_iter()
  .map(|(name, url)| ChannelSettings {
    name: name.to_owned(),
    url: url.to_owned(),
  })
  .collect()
}

#[settings]
pub struct PipelineSettings {
  /// ISO 3166-1 alpha-2 code of the country whose ranking is archived.
  #[serde(default = "default_country")]
  pub country: String,
  /// Game mode the ranking is fetched for.
  pub mode: Ruleset,
  /// Number of ranking pages (50 users each) to scan.
  #[serde(default = "default_u32::<10>")]
  pub pages: u32,
  /// Maximum number of user ids sent in one bulk user lookup.
  #[serde(default = "default_usize::<50>")]
  pub batch_size: usize,
  /// Number of best-play requests kept in flight together.
  #[serde(default = "default_usize::<10>")]
  pub group_size: usize,
  /// Minimum spacing between two ranking page requests, in milliseconds.
  #[serde(default = "default_u64::<300>")]
  pub page_delay_ms: u64,
  /// Minimum spacing between two bulk user lookups, in milliseconds.
  #[serde(default = "default_u64::<800>")]
  pub batch_delay_ms: u64,
  /// Minimum spacing between two best-play rounds, in milliseconds.
  #[serde(default = "default_u64::<800>")]
  pub group_delay_ms: u64,
}

#[settings]
pub struct DailyScoresSettings {
  /// Number of top ranked users whose recent scores are archived.
  #[serde(default = "default_usize::<10>")]
  pub top_users: usize,
  /// Number of recent scores fetched per user.
  #[serde(default = "default_u8::<5>")]
  pub recent_limit: u8,
  /// Minimum spacing between two recent-score requests, in milliseconds.
  #[serde(default = "default_u64::<0>")]
  pub request_delay_ms: u64,
}

#[settings]
pub struct ChannelSettings {
  /// Name stored with each of the channel's videos.
  pub name: String,
  /// Channel URL; `/videos` is appended when listing uploads.
  pub url: String,
}

#[settings]
pub struct VideoSettings {
  /// Channels whose uploads are indexed.
  #[serde(default = "default_channels")]
  pub channels: Vec<ChannelSettings>,
  /// Number of newest uploads listed per channel.
  #[serde(default = "default_u32::<5>")]
  pub uploads_per_channel: u32,
  /// `yt-dlp` executable.
  #[serde(default = "default_yt_dlp_path")]
  pub yt_dlp_path: String,
}

#[settings]
pub struct JobSettings {
  /// Archive the recent scores of the top users.
  #[serde(default = "default_bool::<true>")]
  pub daily_scores: bool,
  /// Build the leaderboard snapshot.
  #[serde(default = "default_bool::<true>")]
  pub leaderboard: bool,
  /// Refresh the video index.
  #[serde(default = "default_bool::<true>")]
  pub videos: bool,
}

#[settings]
pub struct ArchiverSettings {
  /// Telemetry settings.
  pub telemetry: TelemetrySettings,

  /// Osu! OAuth client ID.  Falls back to `OSU_CLIENT_ID` when zero.
  pub osu_client_id: u32,
  /// Osu! OAuth client secret.  Falls back to `OSU_CLIENT_SECRET` when empty.
  pub osu_client_secret: String,
  /// Base URL of the osu! website; API and OAuth paths are appended to it.
  #[serde(default = "default_api_base_url")]
  pub api_base_url: String,
  /// Root directory of the archive.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  pub pipeline: PipelineSettings,
  pub daily: DailyScoresSettings,
  pub videos: VideoSettings,
  pub jobs: JobSettings,
}
