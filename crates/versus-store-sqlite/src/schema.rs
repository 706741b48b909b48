//! SQL schema for the Versus SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS categories (
    category_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    item_id     TEXT PRIMARY KEY,
    category_id TEXT NOT NULL REFERENCES categories(category_id),
    owner_id    TEXT NOT NULL,
    label       TEXT NOT NULL,
    rating      REAL NOT NULL,
    comparisons INTEGER NOT NULL DEFAULT 0,
    wins        INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    retired_at  TEXT,
    CHECK (wins <= comparisons)
);

-- Append-only. The only UPDATE ever issued rewrites voter_kind/voter_key
-- during a merge: reassigned rows become 'user', rows duplicating the user's
-- own judgement become 'discarded' (keyed by record_id) and stay counted.
CREATE TABLE IF NOT EXISTS comparisons (
    record_id   TEXT PRIMARY KEY,
    voter_kind  TEXT NOT NULL,   -- 'user' | 'anonymous' | 'discarded'
    voter_key   TEXT NOT NULL,   -- user uuid, fingerprint or record_id
    category_id TEXT NOT NULL REFERENCES categories(category_id),
    winner_id   TEXT NOT NULL REFERENCES items(item_id),
    loser_id    TEXT NOT NULL REFERENCES items(item_id),
    pair_low    TEXT NOT NULL,
    pair_high   TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    UNIQUE (voter_kind, voter_key, category_id, pair_low, pair_high),
    CHECK  (winner_id != loser_id)
);

CREATE TABLE IF NOT EXISTS anonymous_windows (
    fingerprint  TEXT PRIMARY KEY,
    count        INTEGER NOT NULL,
    window_start TEXT NOT NULL
);

-- Audit trail; one row per (fingerprint, user) with running totals.
CREATE TABLE IF NOT EXISTS voter_merges (
    fingerprint TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    merged_at   TEXT NOT NULL,
    reassigned  INTEGER NOT NULL,
    discarded   INTEGER NOT NULL,
    PRIMARY KEY (fingerprint, user_id)
);

CREATE INDEX IF NOT EXISTS items_category_idx       ON items(category_id);
CREATE INDEX IF NOT EXISTS comparisons_category_idx ON comparisons(category_id);

PRAGMA user_version = 1;
";
