//! SQL schema for the Muster SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS entities (
    entity_id        TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,
    entity_type      TEXT NOT NULL,   -- 'student' | 'staff' | 'asset' | 'device'
    -- Lookup identifiers, one column each so the match-any resolution
    -- query can use the indexes below.
    student_id       TEXT,
    staff_id         TEXT,
    email            TEXT,
    card_id          TEXT,
    device_hash      TEXT,
    face_id          TEXT,
    name             TEXT,            -- identifiers.name (fuzzy-only)
    name_variants    TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    full_name        TEXT,            -- mirrors profile.full_name for scans
    profile          TEXT NOT NULL DEFAULT '{}',   -- JSON Profile
    resolved_sources TEXT NOT NULL DEFAULT '[]',   -- JSON array of SourceLink
    last_seen        TEXT,                         -- JSON LastSeen or NULL
    is_active        INTEGER NOT NULL DEFAULT 1,
    alert_status     TEXT NOT NULL DEFAULT '{\"has_alert\":false}'  -- JSON AlertFlag
);

CREATE INDEX IF NOT EXISTS entities_student_idx ON entities(student_id);
CREATE INDEX IF NOT EXISTS entities_staff_idx   ON entities(staff_id);
CREATE INDEX IF NOT EXISTS entities_email_idx   ON entities(email);
CREATE INDEX IF NOT EXISTS entities_card_idx    ON entities(card_id);
CREATE INDEX IF NOT EXISTS entities_device_idx  ON entities(device_hash);
CREATE INDEX IF NOT EXISTS entities_face_idx    ON entities(face_id);
CREATE INDEX IF NOT EXISTS entities_type_idx    ON entities(entity_type);

-- Activity rows are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table. Predicted
-- placeholder records are synthesized in memory and never stored, so the
-- table carries no prediction columns.
CREATE TABLE IF NOT EXISTS activities (
    activity_id      TEXT PRIMARY KEY,
    entity_id        TEXT NOT NULL REFERENCES entities(entity_id),
    activity_type    TEXT NOT NULL,   -- discriminant of ActivityKind
    timestamp        TEXT NOT NULL,   -- RFC 3339 UTC, fixed precision, sortable
    location_id      TEXT,            -- mirrors location.location_id for filtering
    location         TEXT NOT NULL DEFAULT '{}',   -- JSON Location
    source_data      TEXT,            -- JSON SourcePayload or NULL
    confidence       REAL NOT NULL DEFAULT 1.0,
    data_source      TEXT NOT NULL,
    source_record_id TEXT
);

CREATE INDEX IF NOT EXISTS activities_entity_time_idx
    ON activities(entity_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS activities_type_time_idx
    ON activities(activity_type, timestamp DESC);
CREATE INDEX IF NOT EXISTS activities_location_idx
    ON activities(location_id, timestamp DESC);

CREATE TABLE IF NOT EXISTS alerts (
    alert_id         TEXT PRIMARY KEY,
    entity_id        TEXT NOT NULL REFERENCES entities(entity_id),
    alert_type       TEXT NOT NULL,   -- discriminant of AlertKind
    severity         TEXT NOT NULL,
    title            TEXT NOT NULL,
    message          TEXT NOT NULL,
    details          TEXT NOT NULL DEFAULT '{}',   -- JSON AlertDetails
    anomaly_score    REAL,            -- mirrors details.anomaly_score for the dedup predicate
    status           TEXT NOT NULL DEFAULT 'active',
    acknowledged_by  TEXT,
    acknowledged_at  TEXT,
    resolved_by      TEXT,
    resolved_at      TEXT,
    resolution_notes TEXT,
    triggered_at     TEXT NOT NULL
);

-- At most one active alert per (entity, type). create_alert_if_absent's
-- conditional insert targets this index, making the dedup check atomic.
CREATE UNIQUE INDEX IF NOT EXISTS alerts_active_dedup_idx
    ON alerts(entity_id, alert_type) WHERE status = 'active';
CREATE INDEX IF NOT EXISTS alerts_entity_status_idx ON alerts(entity_id, status);
CREATE INDEX IF NOT EXISTS alerts_triggered_idx     ON alerts(triggered_at);

PRAGMA user_version = 1;
";
