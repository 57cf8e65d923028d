/// Recap Service Library
///
/// Turns a year of media-server watch history into per-user recap
/// profiles: aggregate stats, temporal habits, binge sessions, rewatch
/// patterns, cross-user rankings and LLM-narrated cards. Recaps are
/// built offline by the pregenerate job and served read-only over HTTP.
pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::{RecapError, Result};
