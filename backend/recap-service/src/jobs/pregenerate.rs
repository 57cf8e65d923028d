// ============================================
// Pregenerate Pipeline Job
// ============================================
//
// Offline pipeline that builds every user's recap ahead of time.
//
// Workflow:
// 1. Fetch the user list from the history source (the one hard failure)
// 2. Analyze each user's period history, reusing the on-disk analysis
//    cache when it covers the configured period
// 3. Attach request stats when a request tracker is configured
// 4. Rank users against each other and merge comparative stats
// 5. Narrate a card deck per user and store the finished recap + token
//
// Per-user failures are logged and skipped; the pipeline keeps going.
//
// Usage:
//   recap-service --pregenerate [--force] [--data-only|--cards-only] [username]

use crate::clients::{CardGenerator, MetadataLookup, OverseerrClient, TautulliClient};
use crate::config::Config;
use crate::error::{RecapError, Result};
use crate::models::{MediaUser, RecapData, UserAnalysisResult};
use crate::services::analyzer::{AnalyzerOptions, EventNormalizer, HistoryAnalyzer, HistorySource};
use crate::services::crossuser::compare_users;
use crate::storage::RecapStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pregenerate job configuration
#[derive(Debug, Clone, Default)]
pub struct PregenerateConfig {
    /// Regenerate analyses and recaps even when they already exist
    pub force: bool,
    /// Collect and rank analyses only, skip card generation
    pub data_only: bool,
    /// Rebuild cards from cached analyses, skip history collection
    pub cards_only: bool,
    /// Restrict the run to one user (username or friendly name)
    pub only_user: Option<String>,
}

impl PregenerateConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            force: std::env::var("PREGEN_FORCE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            data_only: std::env::var("PREGEN_DATA_ONLY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            cards_only: std::env::var("PREGEN_CARDS_ONLY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            only_user: std::env::var("PREGEN_USER").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Fold command line arguments (everything after `--pregenerate`)
    /// into the config. A bare argument selects a single user.
    pub fn apply_args(&mut self, args: &[String]) -> std::result::Result<(), String> {
        for arg in args {
            match arg.as_str() {
                "--force" | "-f" => self.force = true,
                "--data-only" => self.data_only = true,
                "--cards-only" => self.cards_only = true,
                flag if flag.starts_with('-') => {
                    return Err(format!("unknown pregenerate flag: {flag}"));
                }
                username => self.only_user = Some(username.to_string()),
            }
        }

        if self.data_only && self.cards_only {
            return Err("--data-only and --cards-only are mutually exclusive".to_string());
        }
        Ok(())
    }
}

/// Pregenerate job statistics
#[derive(Debug, Clone, Default)]
pub struct PregenerateStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub users_processed: u32,
    pub users_failed: u32,
    pub recaps_written: u32,
    pub recaps_skipped: u32,
    pub total_duration_ms: u64,
}

/// Pregenerate job runner, generic over the history source so tests
/// can feed canned history.
pub struct PregenerateJob<S> {
    config: PregenerateConfig,
    app: Config,
    analyzer: HistoryAnalyzer<S>,
    overseerr: Option<OverseerrClient>,
    cards: Option<CardGenerator>,
    store: RecapStore,
}

impl PregenerateJob<TautulliClient> {
    /// Assemble the production job from app config.
    pub fn new(config: PregenerateConfig, app: &Config) -> Result<Self> {
        let tautulli = Arc::new(TautulliClient::new(app.tautulli.clone()));
        let normalizer = EventNormalizer::new(Some(tautulli.clone() as Arc<dyn MetadataLookup>));
        Self::with_source(config, app, tautulli, normalizer)
    }
}

impl<S: HistorySource> PregenerateJob<S> {
    /// Assemble a job over an arbitrary history source.
    pub fn with_source(
        config: PregenerateConfig,
        app: &Config,
        source: Arc<S>,
        normalizer: EventNormalizer,
    ) -> Result<Self> {
        let options = AnalyzerOptions {
            binge_threshold_minutes: app.analysis.binge_threshold_minutes,
            session_gap_seconds: app.analysis.session_gap_seconds,
            top_items: app.analysis.top_items,
            southern_hemisphere: app.analysis.southern_hemisphere,
        };

        Ok(Self {
            config,
            app: app.clone(),
            analyzer: HistoryAnalyzer::new(source, normalizer, options),
            overseerr: OverseerrClient::new(&app.overseerr),
            cards: CardGenerator::from_config(&app.llm),
            store: RecapStore::new(&app.storage.data_dir)?,
        })
    }

    /// Run the pipeline once.
    pub async fn run(&self) -> Result<PregenerateStats> {
        let start_time = Instant::now();
        let mut stats = PregenerateStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        info!(
            period_start = %self.app.period.start_date,
            period_end = %self.app.period.end_date,
            force = self.config.force,
            user = self.config.only_user.as_deref().unwrap_or("all"),
            "starting recap pregeneration"
        );

        let mut analyses = if self.config.cards_only {
            self.load_cached_analyses()?
        } else {
            self.collect_analyses(&mut stats).await?
        };

        // A single-user run still ranks that user against everyone
        // else's cached analyses.
        if !self.config.cards_only
            && self.config.only_user.is_some()
            && self.app.analysis.cross_user_comparison
        {
            analyses = self.merge_with_cached(analyses)?;
        }

        if self.app.analysis.cross_user_comparison {
            match compare_users(&mut analyses) {
                Some(insights) => {
                    self.store.save_insights(&insights)?;
                    info!(users = insights.total_users, "computed cross-user rankings");
                }
                None => {
                    info!(
                        users = analyses.len(),
                        "not enough users for cross-user rankings"
                    );
                }
            }
        }

        if !self.config.cards_only {
            for analysis in &analyses {
                self.store.save_analysis(analysis)?;
            }
        }

        if self.config.data_only {
            info!("data-only run, skipping card generation");
        } else {
            self.write_recaps(&analyses, &mut stats).await;
        }

        stats.completed_at = Some(Utc::now());
        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Stage 1: one analysis per selected user, cache-aware.
    async fn collect_analyses(
        &self,
        stats: &mut PregenerateStats,
    ) -> Result<Vec<UserAnalysisResult>> {
        // Fetching the user list is the one failure that aborts the job.
        let users = self.analyzer.list_users().await?;
        let selected: Vec<MediaUser> = users
            .into_iter()
            .filter(|user| self.selects(user))
            .collect();
        info!(users = selected.len(), "collecting analyses");

        let period = self.app.period;
        let mut analyses = Vec::with_capacity(selected.len());
        for user in &selected {
            stats.users_processed += 1;

            if !self.config.force {
                match self
                    .store
                    .load_analysis(&user.username, period.start_date, period.end_date)
                {
                    Ok(Some(cached)) => {
                        debug!(username = %user.username, "reusing cached analysis");
                        analyses.push(cached);
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(username = %user.username, error = %err, "analysis cache unreadable")
                    }
                }
            }

            match self.analyze_one(user).await {
                Ok(analysis) => analyses.push(analysis),
                Err(err) => {
                    stats.users_failed += 1;
                    error!(username = %user.username, error = %err, "failed to analyze user");
                }
            }
        }

        Ok(analyses)
    }

    async fn analyze_one(&self, user: &MediaUser) -> Result<UserAnalysisResult> {
        let period = self.app.period;
        let mut analysis = self
            .analyzer
            .analyze_known_user(user, period.start_date, period.end_date)
            .await?;

        if let Some(overseerr) = &self.overseerr {
            match overseerr
                .stats_for_user(&user.username, period.start_date, period.end_date)
                .await
            {
                Ok(request_stats) => analysis.request_stats = request_stats,
                Err(err) => {
                    warn!(username = %user.username, error = %err, "request stats unavailable")
                }
            }
        }

        Ok(analysis)
    }

    /// Cards-only runs start from whatever the last data pass cached.
    fn load_cached_analyses(&self) -> Result<Vec<UserAnalysisResult>> {
        let analyses: Vec<UserAnalysisResult> = self
            .store
            .list_analyses()?
            .into_iter()
            .filter(|analysis| !self.is_excluded(&analysis.username))
            .collect();

        if analyses.is_empty() {
            return Err(RecapError::Validation(
                "no cached analyses found, run without --cards-only first".to_string(),
            ));
        }
        Ok(analyses)
    }

    fn merge_with_cached(
        &self,
        fresh: Vec<UserAnalysisResult>,
    ) -> Result<Vec<UserAnalysisResult>> {
        let mut by_name: BTreeMap<String, UserAnalysisResult> = self
            .store
            .list_analyses()?
            .into_iter()
            .filter(|analysis| !self.is_excluded(&analysis.username))
            .map(|analysis| (analysis.username.clone(), analysis))
            .collect();

        for analysis in fresh {
            by_name.insert(analysis.username.clone(), analysis);
        }
        Ok(by_name.into_values().collect())
    }

    /// Stage 2: narrate and persist a recap per analysis.
    async fn write_recaps(&self, analyses: &[UserAnalysisResult], stats: &mut PregenerateStats) {
        for analysis in analyses {
            if !self.matches_user_filter(&analysis.username, analysis.friendly_name.as_deref()) {
                continue;
            }

            if !self.config.force && self.store.has_recap(&analysis.username) {
                debug!(username = %analysis.username, "recap exists, skipping");
                stats.recaps_skipped += 1;
                continue;
            }

            let user = MediaUser {
                id: analysis.user_id.clone(),
                username: analysis.username.clone(),
                friendly_name: analysis.friendly_name.clone(),
                thumb: analysis.thumb.clone(),
            };

            let cards = match &self.cards {
                Some(generator) => generator.generate_cards(&user, analysis).await,
                None => Vec::new(),
            };

            let recap = RecapData {
                period_start: analysis.period_start,
                period_end: analysis.period_end,
                generated_at: Utc::now(),
                analysis: analysis.clone(),
                cards,
                user,
            };

            match self.store.save(&recap.user.username, &recap) {
                Ok(()) => {
                    stats.recaps_written += 1;
                    info!(
                        username = %recap.user.username,
                        cards = recap.cards.len(),
                        "recap ready"
                    );
                }
                Err(err) => {
                    stats.users_failed += 1;
                    error!(username = %recap.user.username, error = %err, "failed to save recap");
                }
            }
        }
    }

    fn selects(&self, user: &MediaUser) -> bool {
        !self.is_excluded(&user.username)
            && self.matches_user_filter(&user.username, user.friendly_name.as_deref())
    }

    fn is_excluded(&self, username: &str) -> bool {
        self.app
            .analysis
            .excluded_users
            .iter()
            .any(|name| name.eq_ignore_ascii_case(username))
    }

    fn matches_user_filter(&self, username: &str, friendly_name: Option<&str>) -> bool {
        match self.config.only_user.as_deref() {
            Some(wanted) => {
                username.eq_ignore_ascii_case(wanted)
                    || friendly_name.is_some_and(|name| name.eq_ignore_ascii_case(wanted))
            }
            None => true,
        }
    }
}

/// Entry point for running the pipeline as a standalone process.
pub async fn run_pregenerate_job(
    app_config: Config,
    job_config: PregenerateConfig,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    info!("initializing recap pregeneration");

    let job = PregenerateJob::new(job_config, &app_config)?;
    let stats = job.run().await?;

    info!(
        processed = stats.users_processed,
        failed = stats.users_failed,
        skipped = stats.recaps_skipped,
        recaps = stats.recaps_written,
        duration_ms = stats.total_duration_ms,
        "recap pregeneration completed"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AnalysisConfig, AppConfig, CorsConfig, LlmConfig, OverseerrConfig, PeriodConfig,
        StorageConfig, TautulliConfig,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_config(data_dir: &std::path::Path) -> Config {
        Config {
            app: AppConfig {
                env: "test".to_string(),
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            cors: CorsConfig {
                allowed_origins: "*".to_string(),
            },
            tautulli: TautulliConfig {
                url: "http://127.0.0.1:8181".to_string(),
                api_key: "test".to_string(),
                page_length: 1000,
            },
            overseerr: OverseerrConfig::default(),
            llm: LlmConfig {
                enabled: false,
                api_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 60,
                prompt_context: None,
            },
            period: PeriodConfig {
                start_date: date(2025, 1, 1),
                end_date: date(2025, 12, 31),
            },
            analysis: AnalysisConfig {
                binge_threshold_minutes: 120.0,
                session_gap_seconds: 1800,
                top_items: 10,
                southern_hemisphere: false,
                excluded_users: vec!["plexbot".to_string()],
                cross_user_comparison: true,
            },
            storage: StorageConfig {
                data_dir: data_dir.to_string_lossy().into_owned(),
            },
        }
    }

    /// Canned source: fixed users, per-user history.
    struct CannedSource {
        users: Vec<MediaUser>,
        history: HashMap<String, Vec<Value>>,
    }

    #[async_trait]
    impl HistorySource for CannedSource {
        async fn fetch_users(&self) -> Result<Vec<MediaUser>> {
            Ok(self.users.clone())
        }

        async fn fetch_history(
            &self,
            user_id: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Value>> {
            Ok(self.history.get(user_id).cloned().unwrap_or_default())
        }
    }

    mockall::mock! {
        Source {}

        #[async_trait]
        impl HistorySource for Source {
            async fn fetch_users(&self) -> Result<Vec<MediaUser>>;
            async fn fetch_history(
                &self,
                user_id: &str,
                start: NaiveDate,
                end: NaiveDate,
            ) -> Result<Vec<Value>>;
        }
    }

    fn media_user(id: &str, username: &str) -> MediaUser {
        MediaUser {
            id: id.to_string(),
            username: username.to_string(),
            friendly_name: None,
            thumb: None,
        }
    }

    fn play(title: &str, started: i64, seconds: u64) -> Value {
        json!({
            "media_type": "movie",
            "title": title,
            "watched_status": 1,
            "duration": seconds,
            "play_duration": seconds,
            "started": started,
            "stopped": started + seconds as i64,
            "date": started,
            "player": "TV",
        })
    }

    fn canned_job(
        dir: &std::path::Path,
        config: PregenerateConfig,
    ) -> PregenerateJob<CannedSource> {
        // 2025-06-01 ~ 12:00 UTC
        let base = 1_748_779_200_i64;
        let mut history = HashMap::new();
        history.insert(
            "1".to_string(),
            vec![
                play("Heat", base, 7200),
                play("Ronin", base + 8000, 5400),
            ],
        );
        history.insert("2".to_string(), vec![play("Alien", base, 3600)]);

        let source = CannedSource {
            users: vec![
                media_user("1", "alice"),
                media_user("2", "bob"),
                media_user("3", "plexbot"),
            ],
            history,
        };

        PregenerateJob::with_source(
            config,
            &test_config(dir),
            Arc::new(source),
            EventNormalizer::new(None),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_pipeline_writes_recaps_and_rankings() {
        let dir = tempfile::tempdir().unwrap();
        let job = canned_job(dir.path(), PregenerateConfig::default());

        let stats = job.run().await.unwrap();
        assert_eq!(stats.users_processed, 2); // plexbot excluded
        assert_eq!(stats.users_failed, 0);
        assert_eq!(stats.recaps_written, 2);

        let store = RecapStore::new(dir.path()).unwrap();
        let recap = store.load("alice").unwrap().unwrap();
        assert_eq!(recap.analysis.stats.total_movies_watched, 2);
        // Narration is disabled in the test config.
        assert!(recap.cards.is_empty());
        // Both users ranked, comparative stats merged in.
        assert!(recap.analysis.comparative_stats.is_some());
        let insights = store.load_insights().unwrap().unwrap();
        assert_eq!(insights.total_users, 2);
        assert_eq!(insights.most_watched_user.as_deref(), Some("alice"));
        // Share tokens minted alongside the recaps.
        assert!(store.resolve(&store.token_for("bob").unwrap()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_data_only_skips_recaps_but_caches_analyses() {
        let dir = tempfile::tempdir().unwrap();
        let job = canned_job(
            dir.path(),
            PregenerateConfig {
                data_only: true,
                ..Default::default()
            },
        );

        let stats = job.run().await.unwrap();
        assert_eq!(stats.recaps_written, 0);

        let store = RecapStore::new(dir.path()).unwrap();
        assert!(store.load("alice").unwrap().is_none());
        assert_eq!(store.list_analyses().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cards_only_rebuilds_from_cache() {
        let dir = tempfile::tempdir().unwrap();

        // First pass: data only.
        canned_job(
            dir.path(),
            PregenerateConfig {
                data_only: true,
                ..Default::default()
            },
        )
        .run()
        .await
        .unwrap();

        // Second pass: cards only, no history collection.
        let stats = canned_job(
            dir.path(),
            PregenerateConfig {
                cards_only: true,
                ..Default::default()
            },
        )
        .run()
        .await
        .unwrap();

        assert_eq!(stats.users_processed, 0);
        assert_eq!(stats.recaps_written, 2);
    }

    #[tokio::test]
    async fn test_cards_only_without_cache_fails() {
        let dir = tempfile::tempdir().unwrap();
        let job = canned_job(
            dir.path(),
            PregenerateConfig {
                cards_only: true,
                ..Default::default()
            },
        );

        let err = job.run().await.unwrap_err();
        assert!(matches!(err, RecapError::Validation(_)));
    }

    #[tokio::test]
    async fn test_existing_recaps_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();

        let first = canned_job(dir.path(), PregenerateConfig::default());
        first.run().await.unwrap();

        let second = canned_job(dir.path(), PregenerateConfig::default());
        let stats = second.run().await.unwrap();
        assert_eq!(stats.recaps_written, 0);
        assert_eq!(stats.recaps_skipped, 2);

        let forced = canned_job(
            dir.path(),
            PregenerateConfig {
                force: true,
                ..Default::default()
            },
        );
        let stats = forced.run().await.unwrap();
        assert_eq!(stats.recaps_written, 2);
        assert_eq!(stats.recaps_skipped, 0);
    }

    #[tokio::test]
    async fn test_single_user_run_only_writes_that_recap() {
        let dir = tempfile::tempdir().unwrap();
        let job = canned_job(
            dir.path(),
            PregenerateConfig {
                only_user: Some("Bob".to_string()),
                ..Default::default()
            },
        );

        let stats = job.run().await.unwrap();
        assert_eq!(stats.users_processed, 1);
        assert_eq!(stats.recaps_written, 1);

        let store = RecapStore::new(dir.path()).unwrap();
        assert!(store.load("bob").unwrap().is_some());
        assert!(store.load("alice").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_list_failure_aborts_job() {
        let dir = tempfile::tempdir().unwrap();

        let mut source = MockSource::new();
        source
            .expect_fetch_users()
            .returning(|| Err(RecapError::Upstream("connection refused".to_string())));

        let job = PregenerateJob::with_source(
            PregenerateConfig::default(),
            &test_config(dir.path()),
            Arc::new(source),
            EventNormalizer::new(None),
        )
        .unwrap();

        assert!(job.run().await.is_err());
    }

    #[tokio::test]
    async fn test_per_user_history_failure_continues() {
        let dir = tempfile::tempdir().unwrap();

        let mut source = MockSource::new();
        source
            .expect_fetch_users()
            .returning(|| Ok(vec![media_user("1", "alice"), media_user("2", "bob")]));
        source.expect_fetch_history().returning(|user_id, _, _| {
            if user_id == "1" {
                Err(RecapError::Upstream("timeout".to_string()))
            } else {
                Ok(vec![])
            }
        });

        let job = PregenerateJob::with_source(
            PregenerateConfig::default(),
            &test_config(dir.path()),
            Arc::new(source),
            EventNormalizer::new(None),
        )
        .unwrap();

        let stats = job.run().await.unwrap();
        assert_eq!(stats.users_processed, 2);
        assert_eq!(stats.users_failed, 1);
        assert_eq!(stats.recaps_written, 1);
    }

    #[test]
    fn test_apply_args() {
        let mut config = PregenerateConfig::default();
        config
            .apply_args(&["--force".to_string(), "alice".to_string()])
            .unwrap();
        assert!(config.force);
        assert_eq!(config.only_user.as_deref(), Some("alice"));

        let mut conflicting = PregenerateConfig::default();
        assert!(conflicting
            .apply_args(&["--data-only".to_string(), "--cards-only".to_string()])
            .is_err());

        let mut unknown = PregenerateConfig::default();
        assert!(unknown.apply_args(&["--bogus".to_string()]).is_err());
    }
}
