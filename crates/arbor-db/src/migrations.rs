use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                user_name       TEXT NOT NULL,
                user_email      TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                salt            TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE trees (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                user                TEXT NOT NULL DEFAULT 'unnamed',
                number_planted      INTEGER NOT NULL,
                latitude            REAL,
                longitude           REAL,
                image_data          BLOB NOT NULL,
                image_content_type  TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            -- tree_id is a loose reference: updates may outlive their tree
            CREATE TABLE tree_updates (
                id                  TEXT PRIMARY KEY,
                tree_id             TEXT NOT NULL,
                user                TEXT NOT NULL DEFAULT 'unnamed',
                text                TEXT NOT NULL DEFAULT '',
                image_data          BLOB NOT NULL,
                image_content_type  TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_tree_updates_tree ON tree_updates(tree_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
