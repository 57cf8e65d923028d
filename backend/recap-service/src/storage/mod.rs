// ============================================
// Recap Storage
// ============================================
//
// On-disk JSON persistence for finished recaps, the per-user analysis
// cache the pregenerate job reuses between runs, deployment-wide
// insights, and the share-token map. Everything lives under one data
// directory:
//
//   {data_dir}/recaps/{user}.json     servable recaps
//   {data_dir}/analysis/{user}.json   cached analysis, keyed by period
//   {data_dir}/insights.json          cross-user rankings
//   {data_dir}/tokens.json            share token -> username

use crate::error::{RecapError, Result};
use crate::models::{CrossUserInsights, RecapData, UserAnalysisResult};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const TOKENS_FILE: &str = "tokens.json";
const INSIGHTS_FILE: &str = "insights.json";
const RECAPS_DIR: &str = "recaps";
const ANALYSIS_DIR: &str = "analysis";

/// File-backed store for recaps, analysis caches and share tokens.
#[derive(Debug, Clone)]
pub struct RecapStore {
    data_dir: PathBuf,
}

impl RecapStore {
    /// Open (and create if needed) the store under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(data_dir.join(RECAPS_DIR))?;
        fs::create_dir_all(data_dir.join(ANALYSIS_DIR))?;
        Ok(Self { data_dir })
    }

    // ============================================
    // Recaps
    // ============================================

    /// Persist a finished recap and make sure the user has a share
    /// token.
    pub fn save(&self, username: &str, recap: &RecapData) -> Result<()> {
        let path = self.recap_path(username)?;
        write_json(&path, recap)?;
        self.token_for(username)?;
        debug!(username, path = %path.display(), "saved recap");
        Ok(())
    }

    /// Load a stored recap. `None` when the user has none or the file
    /// on disk is unreadable.
    pub fn load(&self, username: &str) -> Result<Option<RecapData>> {
        read_json_opt(&self.recap_path(username)?)
    }

    pub fn has_recap(&self, username: &str) -> bool {
        self.recap_path(username)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    /// Usernames (sanitized form) that have a stored recap, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.data_dir.join(RECAPS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    // ============================================
    // Share Tokens
    // ============================================

    /// Return the user's share token, minting one on first use.
    pub fn token_for(&self, username: &str) -> Result<String> {
        let mut tokens = self.load_tokens();
        if let Some(token) = tokens
            .iter()
            .find(|(_, name)| name.as_str() == username)
            .map(|(token, _)| token.clone())
        {
            return Ok(token);
        }

        let token = Uuid::new_v4().to_string();
        tokens.insert(token.clone(), username.to_string());
        write_json(&self.data_dir.join(TOKENS_FILE), &tokens)?;
        debug!(username, "minted share token");
        Ok(token)
    }

    /// Username behind a share token, if the token is known.
    pub fn resolve(&self, token: &str) -> Result<Option<String>> {
        Ok(self.load_tokens().get(token).cloned())
    }

    pub fn load_by_token(&self, token: &str) -> Result<Option<RecapData>> {
        match self.resolve(token)? {
            Some(username) => self.load(&username),
            None => Ok(None),
        }
    }

    fn load_tokens(&self) -> HashMap<String, String> {
        match read_json_opt(&self.data_dir.join(TOKENS_FILE)) {
            Ok(Some(tokens)) => tokens,
            Ok(None) => HashMap::new(),
            Err(err) => {
                warn!(error = %err, "could not read token map, starting empty");
                HashMap::new()
            }
        }
    }

    // ============================================
    // Analysis Cache
    // ============================================

    /// Cache one user's computed analysis for reuse by later runs.
    pub fn save_analysis(&self, analysis: &UserAnalysisResult) -> Result<()> {
        write_json(&self.analysis_path(&analysis.username)?, analysis)
    }

    /// Load a cached analysis, but only when it covers exactly the
    /// requested period. A stale period means the cache is useless and
    /// the caller should re-analyze.
    pub fn load_analysis(
        &self,
        username: &str,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Option<UserAnalysisResult>> {
        let Some(analysis) =
            read_json_opt::<UserAnalysisResult>(&self.analysis_path(username)?)?
        else {
            return Ok(None);
        };

        if analysis.period_start != period_start || analysis.period_end != period_end {
            debug!(
                username,
                cached_start = %analysis.period_start,
                cached_end = %analysis.period_end,
                "cached analysis covers a different period, ignoring"
            );
            return Ok(None);
        }

        Ok(Some(analysis))
    }

    /// All cached analyses, regardless of period. Unreadable files are
    /// skipped with a warning.
    pub fn list_analyses(&self) -> Result<Vec<UserAnalysisResult>> {
        let mut analyses = Vec::new();
        for entry in fs::read_dir(self.data_dir.join(ANALYSIS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json_opt::<UserAnalysisResult>(&path) {
                Ok(Some(analysis)) => analyses.push(analysis),
                Ok(None) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable analysis")
                }
            }
        }
        analyses.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(analyses)
    }

    // ============================================
    // Cross-User Insights
    // ============================================

    pub fn save_insights(&self, insights: &CrossUserInsights) -> Result<()> {
        write_json(&self.data_dir.join(INSIGHTS_FILE), insights)
    }

    pub fn load_insights(&self) -> Result<Option<CrossUserInsights>> {
        read_json_opt(&self.data_dir.join(INSIGHTS_FILE))
    }

    // ============================================
    // Paths
    // ============================================

    fn recap_path(&self, username: &str) -> Result<PathBuf> {
        Ok(self
            .data_dir
            .join(RECAPS_DIR)
            .join(format!("{}.json", sanitize_username(username)?)))
    }

    fn analysis_path(&self, username: &str) -> Result<PathBuf> {
        Ok(self
            .data_dir
            .join(ANALYSIS_DIR)
            .join(format!("{}.json", sanitize_username(username)?)))
    }
}

/// Reduce a username to filename-safe characters. Anything outside
/// `[A-Za-z0-9._-]` is dropped, which also blocks path traversal.
fn sanitize_username(username: &str) -> Result<String> {
    let safe: String = username
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if safe.is_empty() {
        return Err(RecapError::Validation(format!(
            "username {username:?} has no storable characters"
        )));
    }
    Ok(safe)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body)?;
    Ok(())
}

/// Read and parse a JSON file. Missing file or unparsable content both
/// come back as `None`; a corrupt file must not take the service down.
fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    match serde_json::from_str(&body) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "stored file is not valid JSON");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaUser, UserStats};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_analysis(username: &str) -> UserAnalysisResult {
        UserAnalysisResult {
            username: username.to_string(),
            user_id: "7".to_string(),
            friendly_name: None,
            thumb: None,
            period_start: date(2025, 1, 1),
            period_end: date(2025, 12, 31),
            stats: UserStats::default(),
            request_stats: None,
            comparative_stats: None,
        }
    }

    fn sample_recap(username: &str) -> RecapData {
        RecapData {
            user: MediaUser {
                id: "7".to_string(),
                username: username.to_string(),
                friendly_name: None,
                thumb: None,
            },
            period_start: date(2025, 1, 1),
            period_end: date(2025, 12, 31),
            generated_at: Utc::now(),
            analysis: sample_analysis(username),
            cards: Vec::new(),
        }
    }

    fn store() -> (tempfile::TempDir, RecapStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecapStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, store) = store();
        let recap = sample_recap("alice");

        store.save("alice", &recap).unwrap();
        let loaded = store.load("alice").unwrap().unwrap();
        assert_eq!(loaded, recap);
    }

    #[test]
    fn test_load_missing_is_none() {
        let (_dir, store) = store();
        assert!(store.load("nobody").unwrap().is_none());
        assert!(!store.has_recap("nobody"));
    }

    #[test]
    fn test_list_returns_sorted_sanitized_names() {
        let (_dir, store) = store();
        store.save("zoe", &sample_recap("zoe")).unwrap();
        store.save("al/ice", &sample_recap("al/ice")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["alice", "zoe"]);
    }

    #[test]
    fn test_sanitize_blocks_traversal_and_rejects_empty() {
        assert_eq!(sanitize_username("../../etc/passwd").unwrap(), "....etcpasswd");
        assert_eq!(sanitize_username("user name!").unwrap(), "username");
        assert_eq!(sanitize_username("a.b_c-d").unwrap(), "a.b_c-d");
        assert!(sanitize_username("///").is_err());
        assert!(sanitize_username("日本語").is_err());
    }

    #[test]
    fn test_token_is_stable_and_resolvable() {
        let (_dir, store) = store();
        let first = store.token_for("alice").unwrap();
        let second = store.token_for("alice").unwrap();
        assert_eq!(first, second);

        let other = store.token_for("bob").unwrap();
        assert_ne!(first, other);

        assert_eq!(store.resolve(&first).unwrap().as_deref(), Some("alice"));
        assert_eq!(store.resolve("bogus-token").unwrap(), None);
    }

    #[test]
    fn test_save_mints_token_and_load_by_token_works() {
        let (_dir, store) = store();
        let recap = sample_recap("alice");
        store.save("alice", &recap).unwrap();

        let token = store.token_for("alice").unwrap();
        let loaded = store.load_by_token(&token).unwrap().unwrap();
        assert_eq!(loaded.user.username, "alice");

        assert!(store.load_by_token("unknown").unwrap().is_none());
    }

    #[test]
    fn test_analysis_cache_validates_period() {
        let (_dir, store) = store();
        let analysis = sample_analysis("alice");
        store.save_analysis(&analysis).unwrap();

        let hit = store
            .load_analysis("alice", date(2025, 1, 1), date(2025, 12, 31))
            .unwrap();
        assert_eq!(hit, Some(analysis));

        let stale = store
            .load_analysis("alice", date(2024, 1, 1), date(2024, 12, 31))
            .unwrap();
        assert!(stale.is_none());
    }

    #[test]
    fn test_list_analyses_skips_corrupt_files() {
        let (dir, store) = store();
        store.save_analysis(&sample_analysis("bob")).unwrap();
        store.save_analysis(&sample_analysis("alice")).unwrap();
        fs::write(dir.path().join("analysis/broken.json"), "{not json").unwrap();

        let analyses = store.list_analyses().unwrap();
        let names: Vec<_> = analyses.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_corrupt_recap_loads_as_none() {
        let (dir, store) = store();
        fs::write(dir.path().join("recaps/alice.json"), "][").unwrap();
        assert!(store.load("alice").unwrap().is_none());
    }

    #[test]
    fn test_insights_round_trip() {
        let (_dir, store) = store();
        assert!(store.load_insights().unwrap().is_none());

        let insights = CrossUserInsights {
            total_users: 3,
            avg_watch_time: 120.5,
            max_watch_time: 300,
            min_watch_time: 10,
            most_watched_user: Some("alice".to_string()),
            ..CrossUserInsights::default()
        };
        store.save_insights(&insights).unwrap();
        assert_eq!(store.load_insights().unwrap(), Some(insights));
    }
}
