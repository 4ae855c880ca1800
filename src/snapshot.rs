//! Flat-file archive layout:
//!
//! ```text
//! <root>/index.json                        daily score snapshot dates
//! <root>/<yyyy>/<mm>/<dd>.json             daily score snapshot
//! <root>/leaderboards/index.json           leaderboard snapshot dates
//! <root>/leaderboards/<yyyy>/<mm>/<dd>.json leaderboard snapshot
//! <root>/video_database.json               video index
//! ```

use std::{
  io,
  path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::metrics::archiver;

/// Dates for which a snapshot of one kind exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotIndex {
  #[serde(default)]
  pub available_dates: Vec<NaiveDate>,
}

impl SnapshotIndex {
  /// Adds `date` if missing and restores the sorted, duplicate-free order.  Returns whether the
  /// index changed.
  pub fn insert(&mut self, date: NaiveDate) -> bool {
    let before = self.available_dates.clone();
    self.available_dates.push(date);
    self.available_dates.sort_unstable();
    self.available_dates.dedup();
    self.available_dates != before
  }
}

pub struct SnapshotStore {
  root: PathBuf,
}

impl SnapshotStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { SnapshotStore { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  fn dated_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir
      .join(format!("{:04}", date.year()))
      .join(format!("{:02}", date.month()))
      .join(format!("{:02}.json", date.day()))
  }

  fn leaderboards_dir(&self) -> PathBuf { self.root.join("leaderboards") }

  pub fn daily_scores_path(&self, date: NaiveDate) -> PathBuf { Self::dated_path(&self.root, date) }

  pub fn daily_scores_index_path(&self) -> PathBuf { self.root.join("index.json") }

  pub fn leaderboard_path(&self, date: NaiveDate) -> PathBuf {
    Self::dated_path(&self.leaderboards_dir(), date)
  }

  pub fn leaderboard_index_path(&self) -> PathBuf { self.leaderboards_dir().join("index.json") }

  pub fn video_database_path(&self) -> PathBuf { self.root.join("video_database.json") }

  /// Writes the day's leaderboard and then records the date in the leaderboard index.  The two
  /// writes are independent; a failure after the first leaves the snapshot without an index entry.
  pub async fn write_leaderboard<T: Serialize>(
    &self,
    date: NaiveDate,
    records: &[T],
  ) -> io::Result<PathBuf> {
    let path = self.leaderboard_path(date);
    write_json(&path, &records).await?;
    archiver::snapshots_written_total("leaderboard").inc();
    update_index(&self.leaderboard_index_path(), date).await?;
    Ok(path)
  }

  /// Same as [`Self::write_leaderboard`] for the daily score snapshot and its index.
  pub async fn write_daily_scores<T: Serialize>(
    &self,
    date: NaiveDate,
    snapshot: &T,
  ) -> io::Result<PathBuf> {
    let path = self.daily_scores_path(date);
    write_json(&path, snapshot).await?;
    archiver::snapshots_written_total("daily_scores").inc();
    update_index(&self.daily_scores_index_path(), date).await?;
    Ok(path)
  }

  /// Replaces the video index.
  pub async fn write_video_database<T: Serialize>(&self, videos: &[T]) -> io::Result<PathBuf> {
    let path = self.video_database_path();
    write_json(&path, videos).await?;
    archiver::snapshots_written_total("videos").inc();
    Ok(path)
  }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let bytes = serde_json::to_vec_pretty(value)?;
  tokio::fs::write(path, bytes).await
}

/// Reads the index at `path`; a missing file is an empty index.
pub async fn load_index(path: &Path) -> io::Result<SnapshotIndex> {
  match tokio::fs::read(path).await {
    Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(SnapshotIndex::default()),
    Err(err) => Err(err),
  }
}

/// Load-modify-write of the index at `path`.  The file is only rewritten when `date` was missing
/// or the stored list was out of order.
pub async fn update_index(path: &Path, date: NaiveDate) -> io::Result<SnapshotIndex> {
  let mut index = load_index(path).await?;
  if index.insert(date) || !path.exists() {
    write_json(path, &index).await?;
  }
  Ok(index)
}
