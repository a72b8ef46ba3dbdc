//! Numbered schema migrations for the listing store. The applied version is
//! mirrored to `PRAGMA user_version`.

use rusqlite::Connection;

use super::store::SearchError;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const LISTINGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS listings (
    id TEXT PRIMARY KEY,
    permit TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,
    price_aed REAL NOT NULL,
    bedrooms INTEGER NOT NULL,
    bathrooms INTEGER NOT NULL,
    sqft REAL NOT NULL,
    community TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS listings_price_idx ON listings (price_aed);
CREATE INDEX IF NOT EXISTS listings_community_idx ON listings (community);
CREATE INDEX IF NOT EXISTS listings_created_at_idx ON listings (created_at);
";

const LISTINGS_FTS: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS listings_fts USING fts5(
    title,
    description,
    content = 'listings',
    content_rowid = 'rowid',
    tokenize = 'porter unicode61'
);
CREATE TRIGGER IF NOT EXISTS listings_fts_insert AFTER INSERT ON listings BEGIN
    INSERT INTO listings_fts (rowid, title, description)
    VALUES (new.rowid, new.title, coalesce(new.description, ''));
END;
CREATE TRIGGER IF NOT EXISTS listings_fts_delete AFTER DELETE ON listings BEGIN
    INSERT INTO listings_fts (listings_fts, rowid, title, description)
    VALUES ('delete', old.rowid, old.title, coalesce(old.description, ''));
END;
CREATE TRIGGER IF NOT EXISTS listings_fts_update AFTER UPDATE ON listings BEGIN
    INSERT INTO listings_fts (listings_fts, rowid, title, description)
    VALUES ('delete', old.rowid, old.title, coalesce(old.description, ''));
    INSERT INTO listings_fts (rowid, title, description)
    VALUES (new.rowid, new.title, coalesce(new.description, ''));
END;
INSERT INTO listings_fts (listings_fts) VALUES ('rebuild');
";

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: LISTINGS_TABLE,
    },
    Migration {
        version: 2,
        sql: LISTINGS_FTS,
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

pub fn current_version(conn: &Connection) -> Result<u32, SearchError> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Applies every pending migration inside one transaction.
pub fn apply_schema(conn: &mut Connection) -> Result<u32, SearchError> {
    let current = current_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(SearchError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(current);
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;
    Ok(latest)
}
