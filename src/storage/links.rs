use anyhow::Result;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashMap};

use super::schema::Database;
use super::types::{LinkRow, NetworkLink, UrlInfo, UrlRow, UrlType};

impl Database {
    // ========================================================================
    // Network Link Operations
    // ========================================================================

    /// All stored links, ordered by id.
    ///
    /// URL rows whose key is not a known [`UrlType`] are skipped.
    pub async fn list_links(&self) -> Result<Vec<NetworkLink>> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            r#"
            SELECT link_id, catalog_id, title, summary, is_predefined, is_enabled
            FROM Links
            ORDER BY link_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let url_rows: Vec<UrlRow> =
            sqlx::query_as("SELECT link_id, key, url, update_time FROM LinkUrls")
                .fetch_all(&self.pool)
                .await?;

        let mut urls: HashMap<i64, BTreeMap<UrlType, UrlInfo>> = HashMap::new();
        for (link_id, key, url, update_time) in url_rows {
            if let Some(key) = parse_key(&key, link_id) {
                urls.entry(link_id)
                    .or_default()
                    .insert(key, UrlInfo::from_row(url, update_time));
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let link_urls = urls.remove(&row.link_id).unwrap_or_default();
                row.into_link(link_urls)
            })
            .collect())
    }

    /// A single link by id.
    pub async fn get_link(&self, link_id: i64) -> Result<Option<NetworkLink>> {
        let row: Option<LinkRow> = sqlx::query_as(
            r#"
            SELECT link_id, catalog_id, title, summary, is_predefined, is_enabled
            FROM Links
            WHERE link_id = ?
            "#,
        )
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        let urls = load_urls(&mut *conn, link_id).await?;
        Ok(Some(row.into_link(urls)))
    }

    /// Create or update a link.
    ///
    /// A link without an id is inserted and receives the new id. An existing
    /// link has its title, catalog id and summary updated; its flags only
    /// change through [`Database::set_link_enabled`]. URL rows are diffed
    /// against storage: new keys inserted, changed ones updated, keys no
    /// longer present deleted. Everything happens in one transaction.
    pub async fn save_link(&self, link: &mut NetworkLink) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let (link_id, mut stored) = match link.id {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO Links (catalog_id, title, summary, is_predefined, is_enabled)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&link.catalog_id)
                .bind(&link.title)
                .bind(&link.summary)
                .bind(link.is_predefined)
                .bind(link.is_enabled)
                .execute(&mut *tx)
                .await?;
                (result.last_insert_rowid(), BTreeMap::new())
            }
            Some(link_id) => {
                let result = sqlx::query(
                    "UPDATE Links SET catalog_id = ?, title = ?, summary = ? WHERE link_id = ?",
                )
                .bind(&link.catalog_id)
                .bind(&link.title)
                .bind(&link.summary)
                .bind(link_id)
                .execute(&mut *tx)
                .await?;
                if result.rows_affected() == 0 {
                    anyhow::bail!("Link {} not found", link_id);
                }
                (link_id, load_urls(&mut *tx, link_id).await?)
            }
        };

        for (key, info) in &link.urls {
            let sql = match stored.remove(key) {
                None => {
                    "INSERT OR REPLACE INTO LinkUrls (url, update_time, link_id, key) VALUES (?, ?, ?, ?)"
                }
                Some(ref current) if current != info => {
                    "UPDATE LinkUrls SET url = ?, update_time = ? WHERE link_id = ? AND key = ?"
                }
                Some(_) => continue,
            };
            sqlx::query(sql)
                .bind(&info.url)
                .bind(info.update_time_millis())
                .bind(link_id)
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
        }

        for key in stored.keys() {
            sqlx::query("DELETE FROM LinkUrls WHERE link_id = ? AND key = ?")
                .bind(link_id)
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        link.id = Some(link_id);
        tracing::debug!(link_id, catalog_id = %link.catalog_id, "Saved network link");
        Ok(link_id)
    }

    /// Delete a link with its URLs and extras.
    ///
    /// Returns `false` if no link had this id.
    pub async fn delete_link(&self, link_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM LinkUrls WHERE link_id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM Extras WHERE link_id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM Links WHERE link_id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Enable or disable a link. Returns `false` if no link had this id.
    pub async fn set_link_enabled(&self, link_id: i64, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE Links SET is_enabled = ? WHERE link_id = ?")
            .bind(enabled)
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub(super) async fn link_exists(conn: &mut SqliteConnection, link_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT link_id FROM Links WHERE link_id = ?")
        .bind(link_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

async fn load_urls(
    conn: &mut SqliteConnection,
    link_id: i64,
) -> Result<BTreeMap<UrlType, UrlInfo>> {
    let rows: Vec<(String, Option<String>, Option<i64>)> =
        sqlx::query_as("SELECT key, url, update_time FROM LinkUrls WHERE link_id = ?")
            .bind(link_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(key, url, update_time)| {
            let key = parse_key(&key, link_id)?;
            Some((key, UrlInfo::from_row(url, update_time)))
        })
        .collect())
}

fn parse_key(key: &str, link_id: i64) -> Option<UrlType> {
    match key.parse() {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::debug!(link_id, error = %e, "Skipping stored URL");
            None
        }
    }
}
