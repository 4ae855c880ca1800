use reqwest::Client;
use serde::Deserialize;

use crate::{error::APIError, metrics::archiver};

#[derive(Clone, Deserialize)]
pub struct OAuthToken {
  token_type: String,
  access_token: String,
  pub expires_in: u32,
}

impl OAuthToken {
  pub fn build_auth_header(&self) -> String { format!("{} {}", self.token_type, self.access_token) }
}

pub struct ClientInfo {
  pub client_id: u32,
  pub client_secret: String,
}

impl ClientInfo {
  /// Values from settings win; zero/empty values fall back to `OSU_CLIENT_ID` and
  /// `OSU_CLIENT_SECRET`.
  pub fn resolve(client_id: u32, client_secret: &str) -> Result<Self, String> {
    let client_id = match client_id {
      0 => std::env::var("OSU_CLIENT_ID")
        .map_err(|_| "osu_client_id is not set and OSU_CLIENT_ID is missing".to_owned())?
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("OSU_CLIENT_ID is not a valid client id: {err}"))?,
      id => id,
    };
    let client_secret = if client_secret.is_empty() {
      std::env::var("OSU_CLIENT_SECRET")
        .map_err(|_| "osu_client_secret is not set and OSU_CLIENT_SECRET is missing".to_owned())?
    } else {
      client_secret.to_owned()
    };

    Ok(ClientInfo {
      client_id,
      client_secret,
    })
  }
}

lazy_static::lazy_static! {
  pub static ref REQWEST_CLIENT: Client = Client::new();
}

// curl --request POST \
//     "https://osu.ppy.sh/oauth/token" \
//     --header "Accept: application/json" \
//     --header "Content-Type: application/x-www-form-urlencoded" \
//     --data "client_id=id&client_secret=secret&grant_type=client_credentials&scope=public"
/// Fetches the client-credentials token used for every request of a run.  The token is never
/// refreshed; runs are far shorter than its lifetime.
pub async fn fetch_access_token(
  base_url: &str,
  client_info: &ClientInfo,
) -> Result<OAuthToken, APIError> {
  archiver::oauth_token_requests_total().inc();
  let form = [
    ("client_id", client_info.client_id.to_string()),
    ("client_secret", client_info.client_secret.to_string()),
    ("grant_type", "client_credentials".to_string()),
    ("scope", "public".to_string()),
  ];
  let res = REQWEST_CLIENT
    .post(format!("{}/oauth/token", base_url.trim_end_matches('/')))
    .header("Accept", "application/json")
    .header("Content-Type", "application/x-www-form-urlencoded")
    .form(&form)
    .send()
    .await
    .map_err(|err| {
      error!("Failed to fetch access token: {err}");
      archiver::oauth_token_requests_failed_total().inc();
      APIError::internal("Failed to fetch access token")
    })?;

  let status = res.status();
  if !status.is_success() {
    let body = res.text().await.unwrap_or_default();
    error!(?status, "Access token request rejected; res: {body}");
    archiver::oauth_token_requests_failed_total().inc();
    return Err(APIError {
      status,
      message: "Access token request rejected".to_owned(),
    });
  }

  res.json().await.map_err(|err| {
    error!("Failed to read access token res: {err}");
    archiver::oauth_token_requests_failed_total().inc();
    APIError::internal("Failed to read access token response")
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn auth_header_uses_token_type() {
    let token: OAuthToken = serde_json::from_str(
      r#"{"token_type":"Bearer","access_token":"abc","expires_in":86400}"#,
    )
    .unwrap();
    assert_eq!(token.build_auth_header(), "Bearer abc");
  }

  #[test]
  fn settings_credentials_take_precedence() {
    let info = ClientInfo::resolve(1234, "shh").unwrap();
    assert_eq!(info.client_id, 1234);
    assert_eq!(info.client_secret, "shh");
  }
}
