#[macro_use]
extern crate tracing;

pub mod daily_scores;
pub mod error;
pub mod metrics;
pub mod oauth;
pub mod osu_api;
pub mod pipeline;
pub mod rate_limit;
pub mod settings;
pub mod snapshot;
pub mod videos;
