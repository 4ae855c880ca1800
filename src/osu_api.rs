use std::{fmt::Display, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::APIError, metrics::archiver};

/// One row of `GET /rankings/{mode}/performance`.
#[derive(Debug, Clone, Deserialize)]
pub struct RankingEntry {
  /// Null for users that are inactive and have no global rank.
  #[serde(default)]
  pub global_rank: Option<u64>,
  #[serde(default)]
  pub pp: f64,
  #[serde(default)]
  pub hit_accuracy: f64,
  #[serde(default)]
  pub play_count: u64,
  /// Seconds.
  #[serde(default)]
  pub play_time: u64,
  #[serde(default)]
  pub total_score: u64,
  #[serde(default)]
  pub total_hits: u64,
  #[serde(default)]
  pub grade_counts: GradeCounts,
  pub user: RankedUser,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct GradeCounts {
  pub ss: Option<i64>,
  pub ssh: Option<i64>,
  pub s: Option<i64>,
  pub sh: Option<i64>,
  pub a: Option<i64>,
}

impl GradeCounts {
  /// SS and silver SS combined.
  pub fn total_ss(&self) -> i64 { self.ss.unwrap_or(0) + self.ssh.unwrap_or(0) }

  /// S and silver S combined.
  pub fn total_s(&self) -> i64 { self.s.unwrap_or(0) + self.sh.unwrap_or(0) }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankedUser {
  pub id: u64,
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub avatar_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingPage {
  /// Entries that fail to decode (no `user`, wrong-typed fields) are dropped on their own.
  #[serde(default, deserialize_with = "skip_malformed")]
  pub ranking: Vec<RankingEntry>,
}

/// Subset of the user object returned by the bulk `GET /users` lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
  pub id: u64,
  /// Kept exactly as the upstream formats it.
  #[serde(default, deserialize_with = "lenient")]
  pub last_visit: Option<String>,
  #[serde(default, deserialize_with = "lenient")]
  pub user_achievements: Option<Vec<UserAchievement>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAchievement {
  #[serde(default)]
  pub achievement_id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersResponse {
  #[serde(default, deserialize_with = "skip_malformed")]
  pub users: Vec<UserProfile>,
}

/// Decodes a list element by element, logging and dropping the ones that don't fit `T`.
fn skip_malformed<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let items = Vec::<serde_json::Value>::deserialize(deserializer)?;
  Ok(
    items
      .into_iter()
      .filter_map(|item| match serde_json::from_value(item) {
        Ok(value) => Some(value),
        Err(err) => {
          warn!(
            "Dropping malformed {}: {err}",
            std::any::type_name::<T>()
          );
          None
        },
      })
      .collect(),
  )
}

/// A present but wrong-typed value decodes as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let value = Option::<serde_json::Value>::deserialize(deserializer)?;
  Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Mods come back as bare acronyms from the legacy score format and as `{ "acronym": .. }`
/// objects from newer API versions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Mod {
  Acronym(String),
  Detailed { acronym: String },
}

impl Mod {
  pub fn acronym(&self) -> &str {
    match self {
      Mod::Acronym(acronym) | Mod::Detailed { acronym } => acronym,
    }
  }
}

/// Formats mods the way they're displayed on the archive: `""` for nomod, `"+HDDT"` otherwise.
pub fn format_mods(mods: &[Mod]) -> String {
  if mods.is_empty() {
    return String::new();
  }
  let mut out = String::from("+");
  for m in mods {
    out.push_str(m.acronym());
  }
  out
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Beatmap {
  #[serde(default)]
  pub id: i64,
  #[serde(default)]
  pub version: String,
  #[serde(default)]
  pub difficulty_rating: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Beatmapset {
  #[serde(default)]
  pub id: i64,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub covers: Covers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Covers {
  #[serde(default)]
  pub card: String,
}

/// A score as returned by the `scores/best` and `scores/recent` user endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct UserScore {
  #[serde(default)]
  pub id: i64,
  #[serde(default)]
  pub rank: String,
  /// 0..=1
  #[serde(default)]
  pub accuracy: f64,
  #[serde(default)]
  pub pp: Option<f64>,
  #[serde(default)]
  pub mods: Vec<Mod>,
  #[serde(default)]
  pub max_combo: i64,
  /// Named `ended_at` on newer API versions.
  #[serde(default, alias = "ended_at")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub beatmap: Option<Beatmap>,
  #[serde(default)]
  pub beatmapset: Beatmapset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Ruleset {
  #[default]
  Osu,
  Taiko,
  Ctb,
  Mania,
}

impl Display for Ruleset {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", match self {
      Ruleset::Osu => "osu",
      Ruleset::Taiko => "taiko",
      Ruleset::Ctb => "fruits",
      Ruleset::Mania => "mania",
    })
  }
}

impl Serialize for Ruleset {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Ruleset {
  fn deserialize<D>(deserializer: D) -> Result<Ruleset, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(deserializer)?;
    Ok(match s.as_str() {
      "osu" | "0" => Ruleset::Osu,
      "taiko" | "1" => Ruleset::Taiko,
      "fruits" | "2" => Ruleset::Ctb,
      "mania" | "3" => Ruleset::Mania,
      _ => {
        return Err(serde::de::Error::custom(format!("Unknown ruleset: {}", s)));
      },
    })
  }
}

/// The osu! API endpoints the archiver consumes.
#[async_trait]
pub trait OsuApi: Send + Sync {
  /// One page (50 users) of the country performance ranking.  Pages are 1-based.
  async fn fetch_ranking_page(
    &self,
    mode: Ruleset,
    country: &str,
    page: u32,
  ) -> Result<RankingPage, APIError>;

  /// Bulk user lookup; the upstream accepts at most 50 ids per call.
  async fn fetch_users(&self, user_ids: &[u64]) -> Result<Vec<UserProfile>, APIError>;

  async fn fetch_best_scores(
    &self,
    user_id: u64,
    mode: Ruleset,
    limit: u8,
  ) -> Result<Vec<UserScore>, APIError>;

  async fn fetch_recent_scores(&self, user_id: u64, limit: u8)
    -> Result<Vec<UserScore>, APIError>;
}

/// [`OsuApi`] backed by the live osu! API, authenticated with a single bearer token for the whole
/// run.
pub struct OsuClient {
  client: Client,
  base_url: String,
  auth_header: String,
}

impl OsuClient {
  pub fn new(client: Client, base_url: impl Into<String>, auth_header: String) -> Self {
    OsuClient {
      client,
      base_url: base_url.into().trim_end_matches('/').to_owned(),
      auth_header,
    }
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    endpoint_name: &'static str,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T, APIError> {
    archiver::osu_api_requests_total(endpoint_name).inc();
    let now = Instant::now();
    let res = self
      .client
      .get(format!("{}/api/v2{path}", self.base_url))
      .query(query)
      .header("Accept", "application/json")
      .header("Authorization", &self.auth_header)
      .send()
      .await
      .map_err(|err| {
        error!("Failed to send {endpoint_name} request: {}", err);
        archiver::osu_api_requests_failed_total(
          endpoint_name,
          err.status().map(|s| s.as_u16()).unwrap_or(0),
        )
        .inc();
        APIError::internal(format!("Failed to send {endpoint_name} request"))
      })?;
    let status_code = res.status();
    let res_text = res.text().await.map_err(|err| {
      error!(
        ?status_code,
        "Failed to read {endpoint_name} response: {}", err
      );
      archiver::osu_api_requests_failed_total(endpoint_name, status_code.as_u16()).inc();
      APIError::internal(format!("Failed to read {endpoint_name} response"))
    })?;

    let elapsed = now.elapsed();
    archiver::osu_api_response_time_seconds(endpoint_name).observe(elapsed.as_nanos() as u64);

    if !status_code.is_success() {
      error!(
        ?status_code,
        "{endpoint_name} request failed; status: {status_code}; res: {res_text}"
      );
      archiver::osu_api_requests_failed_total(endpoint_name, status_code.as_u16()).inc();
      return Err(APIError {
        status: status_code,
        message: format!("{endpoint_name} request failed"),
      });
    }

    parse_response(endpoint_name, &res_text).map_err(|err| {
      archiver::osu_api_requests_failed_total(endpoint_name, status_code.as_u16()).inc();
      err
    })
  }
}

pub(crate) fn parse_response<T: DeserializeOwned>(
  endpoint_name: &'static str,
  res_text: &str,
) -> Result<T, APIError> {
  let deserializer = &mut serde_json::Deserializer::from_str(res_text);
  serde_path_to_error::deserialize(deserializer).map_err(|err| {
    error!("Failed to parse {endpoint_name} response; res: {res_text}; err: {err}");
    APIError::internal(format!("Failed to parse {endpoint_name} response"))
  })
}

#[async_trait]
impl OsuApi for OsuClient {
  // curl --get "https://osu.ppy.sh/api/v2/rankings/osu/performance?country=IQ&cursor[page]=2" \
  //     --header "Accept: application/json" --header "Authorization: Bearer <token>"
  async fn fetch_ranking_page(
    &self,
    mode: Ruleset,
    country: &str,
    page: u32,
  ) -> Result<RankingPage, APIError> {
    self
      .get_json(
        "fetch_ranking_page",
        &format!("/rankings/{mode}/performance"),
        &[
          ("country", country.to_owned()),
          ("cursor[page]", page.to_string()),
        ],
      )
      .await
  }

  // curl --get "https://osu.ppy.sh/api/v2/users?ids[]=2&ids[]=3" \
  //     --header "Accept: application/json" --header "Authorization: Bearer <token>"
  async fn fetch_users(&self, user_ids: &[u64]) -> Result<Vec<UserProfile>, APIError> {
    let query = user_ids
      .iter()
      .map(|id| ("ids[]", id.to_string()))
      .collect::<Vec<_>>();
    let res: UsersResponse = self.get_json("fetch_users", "/users", &query).await?;
    Ok(res.users)
  }

  async fn fetch_best_scores(
    &self,
    user_id: u64,
    mode: Ruleset,
    limit: u8,
  ) -> Result<Vec<UserScore>, APIError> {
    self
      .get_json(
        "fetch_best_scores",
        &format!("/users/{user_id}/scores/best"),
        &[("limit", limit.to_string()), ("mode", mode.to_string())],
      )
      .await
  }

  async fn fetch_recent_scores(
    &self,
    user_id: u64,
    limit: u8,
  ) -> Result<Vec<UserScore>, APIError> {
    self
      .get_json(
        "fetch_recent_scores",
        &format!("/users/{user_id}/scores/recent"),
        &[("limit", limit.to_string())],
      )
      .await
  }
}
