/// Inline SQL migrations for the shapefiley job database.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is a single table.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: shapefiles table
    r#"
CREATE TABLE IF NOT EXISTS shapefiles (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'started'
                 CHECK (status IN ('started', 'finished', 'failed')),
    archive_path TEXT,
    created_at   INTEGER NOT NULL
);
"#,
    // Migration 2: status lookups
    r#"CREATE INDEX IF NOT EXISTS idx_shapefiles_status ON shapefiles(status);"#,
];
