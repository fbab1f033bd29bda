use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqliteConnection, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

/// Schema version written to `PRAGMA user_version` by the last migration step.
pub const CURRENT_VERSION: i64 = 6;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if a schema upgrade step fails.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Pre-create the database file with user-only permissions.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // If creation fails, SQLite will report the error at connect_with.
            }
        }

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks before
        // returning SQLITE_BUSY. Every pooled connection inherits the pragmas.
        //
        // Legacy migration steps rebuild tables with RENAME + DROP. Foreign key
        // enforcement stays off and renames must not rewrite REFERENCES clauses
        // of other tables, otherwise LinkUrls/Extras would end up pointing at
        // the dropped `*_Obsolete` tables.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(false)
            .pragma("legacy_alter_table", "ON")
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Current `PRAGMA user_version` of the database.
    pub async fn schema_version(&self) -> Result<i64> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    /// Bring the schema up to [`CURRENT_VERSION`].
    ///
    /// Steps fall through from the stored version, so a database at version
    /// `n` runs steps `n..CURRENT_VERSION` in order. All steps and the version
    /// bump share one transaction; a failing step leaves the database at its
    /// previous version. Storage is reclaimed with `VACUUM` afterwards.
    async fn migrate(&self) -> Result<()> {
        let version = self.schema_version().await?;
        if version >= CURRENT_VERSION {
            return Ok(());
        }
        tracing::info!(from = version, to = CURRENT_VERSION, "Migrating link database");

        let mut tx = self.pool.begin().await?;
        for step in version..CURRENT_VERSION {
            tracing::debug!(step, "Applying migration step");
            match step {
                0 => create_tables(&mut *tx).await?,
                1 => update_tables_1(&mut *tx).await?,
                2 => update_tables_2(&mut *tx).await?,
                3 => update_tables_3(&mut *tx).await?,
                4 => update_tables_4(&mut *tx).await?,
                5 => update_tables_5(&mut *tx).await?,
                _ => anyhow::bail!("No migration step from version {}", step),
            }
        }
        // PRAGMA does not accept bound parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", CURRENT_VERSION))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if let Err(e) = sqlx::query("VACUUM").execute(&self.pool).await {
            tracing::warn!(error = %e, "VACUUM after migration failed");
        }
        Ok(())
    }
}

async fn execute_all(conn: &mut SqliteConnection, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(*statement).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Version 0 → 1: custom links with their URLs.
async fn create_tables(conn: &mut SqliteConnection) -> Result<()> {
    execute_all(
        conn,
        &[
            r#"
            CREATE TABLE CustomLinks(
                link_id INTEGER PRIMARY KEY,
                title TEXT UNIQUE NOT NULL,
                site_name TEXT NOT NULL,
                summary TEXT,
                icon TEXT
            )
            "#,
            r#"
            CREATE TABLE CustomLinkUrls(
                key TEXT NOT NULL,
                link_id INTEGER NOT NULL REFERENCES CustomLinks(link_id),
                url TEXT NOT NULL,
                CONSTRAINT CustomLinkUrls_PK PRIMARY KEY (key, link_id)
            )
            "#,
        ],
    )
    .await
}

/// Version 1 → 2: titles no longer unique; URLs gain an update time.
async fn update_tables_1(conn: &mut SqliteConnection) -> Result<()> {
    execute_all(
        conn,
        &[
            "ALTER TABLE CustomLinks RENAME TO CustomLinks_Obsolete",
            r#"
            CREATE TABLE CustomLinks(
                link_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                site_name TEXT NOT NULL,
                summary TEXT,
                icon TEXT
            )
            "#,
            r#"
            INSERT INTO CustomLinks (link_id, title, site_name, summary, icon)
            SELECT link_id, title, site_name, summary, icon FROM CustomLinks_Obsolete
            "#,
            "DROP TABLE CustomLinks_Obsolete",
            r#"
            CREATE TABLE LinkUrls(
                key TEXT NOT NULL,
                link_id INTEGER NOT NULL REFERENCES CustomLinks(link_id),
                url TEXT,
                update_time INTEGER,
                CONSTRAINT LinkUrls_PK PRIMARY KEY (key, link_id)
            )
            "#,
            "INSERT INTO LinkUrls (key, link_id, url) SELECT key, link_id, url FROM CustomLinkUrls",
            "DROP TABLE CustomLinkUrls",
        ],
    )
    .await
}

/// Version 2 → 3: `Links` replaces `CustomLinks`; the icon becomes a URL row.
async fn update_tables_2(conn: &mut SqliteConnection) -> Result<()> {
    execute_all(
        conn,
        &[
            r#"
            CREATE TABLE Links(
                link_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                site_name TEXT NOT NULL,
                summary TEXT
            )
            "#,
            r#"
            INSERT INTO Links (link_id, title, site_name, summary)
            SELECT link_id, title, site_name, summary FROM CustomLinks
            "#,
            r#"
            INSERT OR REPLACE INTO LinkUrls (key, link_id, url)
            SELECT 'icon', link_id, icon FROM CustomLinks WHERE icon IS NOT NULL
            "#,
            "DROP TABLE CustomLinks",
        ],
    )
    .await
}

/// Version 3 → 4: URL keys take their current names.
async fn update_tables_3(conn: &mut SqliteConnection) -> Result<()> {
    execute_all(
        conn,
        &[
            "UPDATE LinkUrls SET key = 'Catalog' WHERE key = 'main'",
            "UPDATE LinkUrls SET key = 'Search' WHERE key = 'search'",
            "UPDATE LinkUrls SET key = 'Image' WHERE key = 'icon'",
        ],
    )
    .await
}

/// Version 4 → 5: predefined/enabled flags, URLs re-keyed to `Links`, extras.
async fn update_tables_4(conn: &mut SqliteConnection) -> Result<()> {
    execute_all(
        conn,
        &[
            "ALTER TABLE Links ADD COLUMN is_predefined INTEGER",
            "UPDATE Links SET is_predefined = 0",
            "ALTER TABLE Links ADD COLUMN is_enabled INTEGER DEFAULT 1",
            "ALTER TABLE LinkUrls RENAME TO LinkUrls_Obsolete",
            r#"
            CREATE TABLE LinkUrls(
                key TEXT NOT NULL,
                link_id INTEGER NOT NULL REFERENCES Links(link_id),
                url TEXT,
                update_time INTEGER,
                CONSTRAINT LinkUrls_PK PRIMARY KEY (key, link_id)
            )
            "#,
            r#"
            INSERT INTO LinkUrls (key, link_id, url, update_time)
            SELECT key, link_id, url, update_time FROM LinkUrls_Obsolete
            "#,
            "DROP TABLE LinkUrls_Obsolete",
            r#"
            CREATE TABLE IF NOT EXISTS Extras(
                link_id INTEGER NOT NULL REFERENCES Links(link_id),
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                CONSTRAINT Extras_PK PRIMARY KEY (key, link_id)
            )
            "#,
        ],
    )
    .await
}

/// Version 5 → 6: `site_name` becomes the unique `catalog_id`.
async fn update_tables_5(conn: &mut SqliteConnection) -> Result<()> {
    execute_all(
        conn,
        &[
            "ALTER TABLE Links RENAME TO Links_Obsolete",
            r#"
            CREATE TABLE Links(
                link_id INTEGER PRIMARY KEY,
                catalog_id TEXT UNIQUE,
                title TEXT NOT NULL,
                summary TEXT,
                is_predefined INTEGER,
                is_enabled INTEGER
            )
            "#,
            r#"
            INSERT INTO Links (link_id, catalog_id, title, summary, is_predefined, is_enabled)
            SELECT link_id, site_name, title, summary, is_predefined, is_enabled FROM Links_Obsolete
            "#,
            "DROP TABLE Links_Obsolete",
        ],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_database_is_current() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), CURRENT_VERSION);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["Extras", "LinkUrls", "Links"]);
    }

    #[tokio::test]
    async fn test_migrate_is_noop_when_current() {
        let db = Database::open(":memory:").await.unwrap();
        sqlx::query("INSERT INTO Links (catalog_id, title) VALUES ('x', 'X')")
            .execute(&db.pool)
            .await
            .unwrap();

        db.migrate().await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Links")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_links_columns_after_migration() {
        let db = Database::open(":memory:").await.unwrap();
        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('Links')")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(
            columns,
            vec!["link_id", "catalog_id", "title", "summary", "is_predefined", "is_enabled"]
        );
    }
}
