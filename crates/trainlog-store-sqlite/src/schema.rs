//! SQL schema for the trainlog SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Every natural key carries a UNIQUE constraint, so `INSERT .. ON CONFLICT
/// DO NOTHING` is the only deduplication mechanism needed, even with several
/// writers on the same file.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS locations (
    location_id INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,   -- canonical, upper-case
    code        TEXT                    -- frozen at creation
);

CREATE TABLE IF NOT EXISTS routes (
    route_id          INTEGER PRIMARY KEY,
    start_location_id INTEGER NOT NULL REFERENCES locations(location_id),
    end_location_id   INTEGER NOT NULL REFERENCES locations(location_id),
    UNIQUE (start_location_id, end_location_id)
);

CREATE TABLE IF NOT EXISTS trains (
    train_id INTEGER PRIMARY KEY,
    number   TEXT    NOT NULL,
    route_id INTEGER NOT NULL REFERENCES routes(route_id),
    UNIQUE (number, route_id)
);

CREATE TABLE IF NOT EXISTS stop_transitions (
    stop_transition_id INTEGER PRIMARY KEY,
    train_id           INTEGER NOT NULL REFERENCES trains(train_id),
    from_location_id   INTEGER NOT NULL REFERENCES locations(location_id),
    to_location_id     INTEGER NOT NULL REFERENCES locations(location_id),
    UNIQUE (train_id, from_location_id, to_location_id)
);

-- Arrival facts are strictly append-only: first write wins.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS arrivals (
    stop_transition_id INTEGER NOT NULL REFERENCES stop_transitions(stop_transition_id),
    run_date           TEXT    NOT NULL,   -- YYYY-MM-DD
    scheduled_at       TEXT    NOT NULL,   -- RFC 3339 with feed offset
    observed_at        TEXT    NOT NULL,   -- RFC 3339 with feed offset
    minutes_late       INTEGER NOT NULL,
    eta                TEXT,
    recorded_at        TEXT    NOT NULL,   -- RFC 3339 UTC; store-assigned
    PRIMARY KEY (stop_transition_id, run_date)
);

CREATE INDEX IF NOT EXISTS arrivals_run_date_idx ON arrivals(run_date);
CREATE INDEX IF NOT EXISTS trains_route_idx      ON trains(route_id);

PRAGMA user_version = 1;
";
