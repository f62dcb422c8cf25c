//! SQL schemas for the warehouse and staging databases.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Warehouse DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const WAREHOUSE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Dimensions. Surrogate keys are assigned by the loader, never by SQLite,
-- and no row is updated or deleted by an incremental load.
CREATE TABLE IF NOT EXISTS dim_time (
    time_id   INTEGER PRIMARY KEY,
    timestamp TEXT    NOT NULL UNIQUE,   -- canonical UTC, YYYY-MM-DDTHH:MM:SSZ
    year      INTEGER NOT NULL,
    month     INTEGER NOT NULL,
    day       INTEGER NOT NULL,
    hour      INTEGER NOT NULL,
    quarter   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_sensor (
    sensor_key INTEGER PRIMARY KEY,
    sensor_id  TEXT    NOT NULL UNIQUE,
    location   TEXT
);

CREATE TABLE IF NOT EXISTS dim_tweet (
    tweet_key  INTEGER PRIMARY KEY,
    tweet_id   TEXT    NOT NULL UNIQUE,
    author_id  TEXT,
    tweet_text TEXT
);

CREATE TABLE IF NOT EXISTS dim_topic (
    topic_id INTEGER PRIMARY KEY,
    keyword  TEXT    NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS dim_competitor (
    competitor_id INTEGER PRIMARY KEY,
    company       TEXT    NOT NULL UNIQUE
);

-- Facts. Upserted by composite key; never deleted by a load.
CREATE TABLE IF NOT EXISTS fact_temperature (
    sensor_key    INTEGER NOT NULL REFERENCES dim_sensor(sensor_key),
    time_id       INTEGER NOT NULL REFERENCES dim_time(time_id),
    temperature_c REAL    NOT NULL,
    PRIMARY KEY (sensor_key, time_id)
);

CREATE TABLE IF NOT EXISTS fact_sentiment (
    tweet_key INTEGER NOT NULL REFERENCES dim_tweet(tweet_key),
    topic_id  INTEGER NOT NULL REFERENCES dim_topic(topic_id),
    time_id   INTEGER NOT NULL REFERENCES dim_time(time_id),
    polarity  INTEGER NOT NULL CHECK (polarity IN (-1, 0, 1)),
    PRIMARY KEY (tweet_key, topic_id, time_id)
);

CREATE TABLE IF NOT EXISTS fact_competitor_share (
    competitor_id        INTEGER NOT NULL REFERENCES dim_competitor(competitor_id),
    time_id              INTEGER NOT NULL REFERENCES dim_time(time_id),
    market_share_percent REAL    NOT NULL,
    PRIMARY KEY (competitor_id, time_id)
);

-- One row per load run; outside the star schema.
CREATE TABLE IF NOT EXISTS load_runs (
    run_id       TEXT PRIMARY KEY,
    started_at   TEXT NOT NULL,
    finished_at  TEXT NOT NULL,
    summary_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS fact_temperature_time_idx ON fact_temperature(time_id);
CREATE INDEX IF NOT EXISTS fact_sentiment_time_idx   ON fact_sentiment(time_id);
CREATE INDEX IF NOT EXISTS load_runs_started_idx     ON load_runs(started_at);

PRAGMA user_version = 1;
";

/// Staging DDL. Columns are untyped on purpose: the extraction layer writes
/// whatever it parsed, and the reader coerces leniently.
pub const STAGING_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS warehouse_temp_sensor (
    sensor_id,
    temperature,
    timestamp,
    location
);

CREATE TABLE IF NOT EXISTS external_sentiment (
    tweet_id,
    tweet_text,
    timestamp,
    user_location,
    sentiment,
    matched_product
);

CREATE TABLE IF NOT EXISTS market_share_report (
    company,
    market_share_percent,
    reported_at
);
";

/// Deletion order for [`crate::SqliteWarehouse::truncate`]: facts before the
/// dimensions they reference.
pub const TRUNCATE_ORDER: &[&str] = &[
  "fact_temperature",
  "fact_sentiment",
  "fact_competitor_share",
  "dim_time",
  "dim_sensor",
  "dim_tweet",
  "dim_topic",
  "dim_competitor",
];
