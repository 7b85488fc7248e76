/// Schema for the request queue and the response cache.
pub const SCHEMA: &str = r#"
-- Queued request snapshots. The id space is shared by every queue name.
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY,
    queue_name TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_requests_queue_name
    ON requests(queue_name, id);

-- Highest id ever issued, so ids are never reused after deletion
CREATE TABLE IF NOT EXISTS request_sequence (
    singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
    last_id INTEGER NOT NULL
);

INSERT OR IGNORE INTO request_sequence (singleton, last_id) VALUES (0, 0);

-- Cached responses, keyed by cache name and request identity
CREATE TABLE IF NOT EXISTS response_cache (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key)
);
"#;
