use foundations::telemetry::metrics::{metrics, Counter, HistogramBuilder, TimeHistogram};

#[metrics]
pub mod archiver {
  /// Number of requests made to the osu! API.
  pub fn osu_api_requests_total(endpoint_name: &'static str) -> Counter;

  /// Number of failed requests made to the osu! API.
  pub fn osu_api_requests_failed_total(endpoint_name: &'static str, status_code: u16) -> Counter;

  /// Distribution of response times for the osu! API.
  #[ctor = HistogramBuilder {
    buckets: &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
  }]
  pub fn osu_api_response_time_seconds(endpoint_name: &'static str) -> TimeHistogram;

  /// Number of requests made to fetch the OAuth token.
  pub fn oauth_token_requests_total() -> Counter;

  /// Number of failed requests made to fetch the OAuth token.
  pub fn oauth_token_requests_failed_total() -> Counter;

  /// Number of units (pages, batches, users) processed by a pipeline stage.
  pub fn stage_units_total(stage: &'static str) -> Counter;

  /// Number of units that fell back to default or absent values in a pipeline stage.
  pub fn stage_units_degraded_total(stage: &'static str) -> Counter;

  /// Number of snapshot files written.
  pub fn snapshots_written_total(kind: &'static str) -> Counter;
}
