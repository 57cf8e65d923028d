// ============================================
// Background Jobs Module
// ============================================
//
// Batch jobs that run outside the HTTP request path. The pregenerate
// pipeline produces every user's recap offline so the read surface
// only ever serves finished files.
//
// Triggered via:
// - Command line flag (--pregenerate)
// - Scheduler (cron / Kubernetes CronJob)

pub mod pregenerate;

pub use pregenerate::{run_pregenerate_job, PregenerateConfig, PregenerateJob, PregenerateStats};
