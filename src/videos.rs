//! Index of the newest uploads of a fixed set of YouTube channels, kept in
//! `<root>/video_database.json`.  Entries are never removed, and the hand-curated `status` of an
//! entry survives every refresh.

use std::{collections::BTreeMap, io};

use async_trait::async_trait;
use chrono::NaiveDate;
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::{pipeline::StageReport, snapshot::SnapshotStore};

/// `status` given to videos the first time they're seen.
pub const DEFAULT_STATUS: &str = "Yes";

/// `published` of uploads without a usable upload date; sorts below any real date.
pub const UNKNOWN_UPLOAD_DATE: &str = "2000-01-01";

fn default_status() -> String { DEFAULT_STATUS.to_owned() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
  pub id: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub channel: String,
  /// `YYYY-MM-DD`
  #[serde(default)]
  pub published: String,
  #[serde(default)]
  pub url: String,
  #[serde(default = "default_status")]
  pub status: String,
  /// 1 for the newest video.
  #[serde(default)]
  pub sequence: usize,
  /// Fields added to the file by hand.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One line of `yt-dlp --dump-json` output.
#[derive(Debug, Clone, Deserialize)]
pub struct Upload {
  pub id: String,
  #[serde(default)]
  pub title: Option<String>,
  /// `YYYYMMDD`
  #[serde(default)]
  pub upload_date: Option<String>,
}

impl Upload {
  pub fn published(&self) -> String {
    self
      .upload_date
      .as_deref()
      .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y%m%d").ok())
      .map(|date| date.format("%Y-%m-%d").to_string())
      .unwrap_or_else(|| UNKNOWN_UPLOAD_DATE.to_owned())
  }
}

/// Parses `--dump-json` output, one video per line.  Lines that aren't a video are logged and
/// skipped.
pub fn parse_uploads(stdout: &str) -> Vec<Upload> {
  stdout
    .lines()
    .filter(|line| !line.trim().is_empty())
    .filter_map(|line| match serde_json::from_str(line) {
      Ok(upload) => Some(upload),
      Err(err) => {
        warn!("Skipping unparseable yt-dlp line: {err}");
        None
      },
    })
    .collect()
}

/// The stored file is normally a list; the id-keyed map form is accepted as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredVideos {
  List(Vec<VideoEntry>),
  ById(BTreeMap<String, VideoEntry>),
}

#[derive(Debug, Default)]
pub struct VideoDatabase {
  entries: Vec<VideoEntry>,
  by_id: FxHashMap<String, usize>,
}

impl VideoDatabase {
  pub fn new(entries: Vec<VideoEntry>) -> Self {
    let mut db = VideoDatabase::default();
    for entry in entries {
      match db.by_id.get(&entry.id) {
        Some(&ix) => db.entries[ix] = entry,
        None => {
          db.by_id.insert(entry.id.clone(), db.entries.len());
          db.entries.push(entry);
        },
      }
    }
    db
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Adds a newly seen upload, or refreshes the title and date of a known one while keeping its
  /// channel and status.  Returns whether the upload was new.
  pub fn upsert(&mut self, channel: &str, upload: &Upload) -> bool {
    let published = upload.published();
    if let Some(&ix) = self.by_id.get(&upload.id) {
      let entry = &mut self.entries[ix];
      entry.title = upload.title.clone();
      entry.published = published;
      return false;
    }

    self.by_id.insert(upload.id.clone(), self.entries.len());
    self.entries.push(VideoEntry {
      id: upload.id.clone(),
      title: upload.title.clone(),
      channel: channel.to_owned(),
      published,
      url: format!("https://youtu.be/{}", upload.id),
      status: default_status(),
      sequence: 0,
      extra: serde_json::Map::new(),
    });
    true
  }

  /// Newest first, numbered from 1.  Videos published the same day keep their stored order.
  pub fn into_sorted(self) -> Vec<VideoEntry> {
    let mut entries = self.entries;
    entries.sort_by(|a, b| b.published.cmp(&a.published));
    for (ix, entry) in entries.iter_mut().enumerate() {
      entry.sequence = ix + 1;
    }
    entries
  }
}

/// Reads the stored index.  A missing file is empty; so is an unreadable one, which gets
/// overwritten by the refresh.
pub async fn load_video_database(store: &SnapshotStore) -> io::Result<VideoDatabase> {
  let path = store.video_database_path();
  let bytes = match tokio::fs::read(&path).await {
    Ok(bytes) => bytes,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(VideoDatabase::default()),
    Err(err) => return Err(err),
  };
  let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);
  match serde_path_to_error::deserialize(deserializer) {
    Ok(StoredVideos::List(entries)) => Ok(VideoDatabase::new(entries)),
    Ok(StoredVideos::ById(entries)) => Ok(VideoDatabase::new(entries.into_values().collect())),
    Err(err) => {
      error!(
        "Failed to parse {}, starting from an empty index: {err}",
        path.display()
      );
      Ok(VideoDatabase::default())
    },
  }
}

/// Lists the newest uploads of a channel.
#[async_trait]
pub trait VideoSource: Send + Sync {
  /// Raw `--dump-json` output, one video per line.
  async fn latest_uploads(&self, channel_url: &str, count: u32) -> io::Result<String>;
}

/// [`VideoSource`] backed by the `yt-dlp` executable.  Full extraction is used rather than
/// `--flat-playlist`, which doesn't report upload dates.
pub struct YtDlp {
  program: String,
}

impl YtDlp {
  pub fn new(program: impl Into<String>) -> Self {
    YtDlp {
      program: program.into(),
    }
  }
}

#[async_trait]
impl VideoSource for YtDlp {
  async fn latest_uploads(&self, channel_url: &str, count: u32) -> io::Result<String> {
    let output = Command::new(&self.program)
      .args(["--dump-json", "--quiet", "--no-warnings", "--playlist-end"])
      .arg(count.to_string())
      .arg(format!("{}/videos", channel_url.trim_end_matches('/')))
      .kill_on_drop(true)
      .output()
      .await?;
    // yt-dlp exits non-zero when any single video fails; the others are still on stdout
    if !output.status.success() {
      warn!(
        "{} exited with {} for {channel_url}: {}",
        self.program,
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

#[derive(Debug, Clone)]
pub struct Channel {
  pub name: String,
  pub url: String,
}

pub struct VideosConfig {
  pub channels: Vec<Channel>,
  pub uploads_per_channel: u32,
}

/// Merges the newest uploads of every channel into the stored index and rewrites it sorted.  A
/// channel that can't be listed is logged and skipped.
pub async fn run_videos_job(
  source: &dyn VideoSource,
  store: &SnapshotStore,
  config: &VideosConfig,
) -> io::Result<StageReport<usize>> {
  let mut db = load_video_database(store).await?;
  info!("Video index has {} entries", db.len());

  let mut degraded = 0;
  for channel in &config.channels {
    info!("Listing uploads of {}...", channel.name);
    let stdout = match source
      .latest_uploads(&channel.url, config.uploads_per_channel)
      .await
    {
      Ok(stdout) => stdout,
      Err(err) => {
        error!("Failed to list uploads of {}: {err}", channel.name);
        degraded += 1;
        continue;
      },
    };

    for upload in parse_uploads(&stdout) {
      if db.upsert(&channel.name, &upload) {
        info!(
          "New video from {}: {}",
          channel.name,
          upload.title.as_deref().unwrap_or(&upload.id)
        );
      }
    }
  }

  let videos = db.into_sorted();
  let path = store.write_video_database(&videos).await?;
  info!("{} videos indexed in {}", videos.len(), path.display());

  Ok(
    StageReport {
      value: videos.len(),
      units: config.channels.len(),
      degraded,
    }
    .record("videos"),
  )
}
