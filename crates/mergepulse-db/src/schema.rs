//! SQL statements for the mergepulse schema.

pub const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)";

pub const CREATE_PULL_REQUESTS: &str = "
CREATE TABLE IF NOT EXISTS pull_requests (
    repo        TEXT NOT NULL,
    number      INTEGER NOT NULL,
    author      TEXT NOT NULL,
    title       TEXT NOT NULL,
    merged_at   TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (repo, number)
)";

pub const CREATE_PULL_REQUEST_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_pull_requests_merged_at ON pull_requests (merged_at);
CREATE INDEX IF NOT EXISTS idx_pull_requests_author ON pull_requests (author);
";

pub const CREATE_WEEKLY_METRICS: &str = "
CREATE TABLE IF NOT EXISTS weekly_metrics (
    repo                TEXT NOT NULL,
    week_start_date     TEXT NOT NULL,
    pr_count            INTEGER NOT NULL DEFAULT 0 CHECK (pr_count >= 0),
    unique_author_count INTEGER NOT NULL DEFAULT 0 CHECK (unique_author_count >= 0),
    productivity        REAL,
    created_at          TEXT NOT NULL,
    PRIMARY KEY (repo, week_start_date)
)";

pub const CREATE_SYNC_STATE: &str = "
CREATE TABLE IF NOT EXISTS sync_state (
    repo            TEXT PRIMARY KEY,
    status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'in_progress', 'completed', 'error')),
    last_synced_at  TEXT,
    last_pr_number  INTEGER,
    error_message   TEXT,
    updated_at      TEXT NOT NULL
)";

pub const CREATE_SYNC_RUNS: &str = "
CREATE TABLE IF NOT EXISTS sync_runs (
    id              TEXT PRIMARY KEY,
    kind            TEXT NOT NULL,
    status          TEXT NOT NULL,
    processed_count INTEGER NOT NULL DEFAULT 0,
    fetched_count   INTEGER NOT NULL DEFAULT 0,
    failed_repos    TEXT NOT NULL DEFAULT '[]',
    started_at      TEXT NOT NULL,
    finished_at     TEXT NOT NULL
)";
