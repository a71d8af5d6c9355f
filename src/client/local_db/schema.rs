//! Database Schema Definitions
//!
//! Versioned migrations for the local store. Migrations only ever create
//! tables or add columns, so records written by an older version survive an
//! upgrade untouched.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Tables holding synced records share one layout: indexed columns for the
/// lookups the client needs plus the JSON body and an optional binary payload.
macro_rules! record_table {
    ($name:literal) => {
        concat!(
            "CREATE TABLE IF NOT EXISTS ",
            $name,
            " (
                id TEXT PRIMARY KEY,
                job_id TEXT,
                status TEXT,
                synced INTEGER,
                created_at INTEGER NOT NULL,
                data TEXT NOT NULL,
                blob BLOB
            )"
        )
    };
}

const MIGRATION_1: &[&str] = &[
    record_table!("jobs"),
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
    record_table!("time_logs"),
    "CREATE INDEX IF NOT EXISTS idx_time_logs_job ON time_logs(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_time_logs_synced ON time_logs(synced)",
    record_table!("media"),
    "CREATE INDEX IF NOT EXISTS idx_media_job ON media(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_media_synced ON media(synced)",
    record_table!("parts_usage"),
    "CREATE INDEX IF NOT EXISTS idx_parts_usage_job ON parts_usage(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_parts_usage_synced ON parts_usage(synced)",
    "CREATE TABLE IF NOT EXISTS sync_queue (
        id TEXT PRIMARY KEY,
        payload_type TEXT NOT NULL,
        record_id TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_queue_record ON sync_queue(payload_type, record_id)",
    "CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

const MIGRATION_2: &[&str] = &[
    "ALTER TABLE sync_queue ADD COLUMN state TEXT NOT NULL DEFAULT 'pending'",
    "ALTER TABLE sync_queue ADD COLUMN next_attempt_at INTEGER",
    "ALTER TABLE sync_queue ADD COLUMN leased_until INTEGER",
    "ALTER TABLE sync_queue ADD COLUMN last_error TEXT",
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_state ON sync_queue(state, created_at)",
    "CREATE TABLE IF NOT EXISTS http_cache (
        url TEXT PRIMARY KEY,
        status INTEGER NOT NULL,
        content_type TEXT,
        body BLOB NOT NULL,
        stored_at INTEGER NOT NULL
    )",
];

/// Schema migration versions with their statements, in order
pub const MIGRATIONS: &[(i32, &[&str])] = &[(1, MIGRATION_1), (2, MIGRATION_2)];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<(i32, &'static [&'static str])> {
    MIGRATIONS
        .iter()
        .filter(|(version, _)| *version > current_version)
        .copied()
        .collect()
}
