use anyhow::Result;
use std::collections::BTreeMap;

use super::links::link_exists;
use super::schema::Database;

impl Database {
    // ========================================================================
    // Link Extras Operations
    // ========================================================================

    /// Free-form key/value pairs stored for a link, ordered by key.
    pub async fn link_extras(&self, link_id: i64) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM Extras WHERE link_id = ?")
                .bind(link_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    /// Replace all extras of a link in one transaction.
    ///
    /// # Errors
    ///
    /// Fails without touching storage if no link has this id.
    pub async fn set_link_extras(
        &self,
        link_id: i64,
        extras: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !link_exists(&mut *tx, link_id).await? {
            anyhow::bail!("Link {} not found", link_id);
        }

        sqlx::query("DELETE FROM Extras WHERE link_id = ?")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;

        for (key, value) in extras {
            sqlx::query("INSERT INTO Extras (link_id, key, value) VALUES (?, ?, ?)")
                .bind(link_id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NetworkLink;

    async fn db_with_link() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .save_link(&mut NetworkLink::new("litres.ru", "Litres"))
            .await
            .unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn test_extras_empty_by_default() {
        let (db, id) = db_with_link().await;
        assert!(db.link_extras(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_extras_replaces_all() {
        let (db, id) = db_with_link().await;

        let first = BTreeMap::from([
            ("account".to_string(), "reader".to_string()),
            ("sid".to_string(), "abc".to_string()),
        ]);
        db.set_link_extras(id, &first).await.unwrap();
        assert_eq!(db.link_extras(id).await.unwrap(), first);

        let second = BTreeMap::from([("sid".to_string(), "xyz".to_string())]);
        db.set_link_extras(id, &second).await.unwrap();
        assert_eq!(db.link_extras(id).await.unwrap(), second);

        db.set_link_extras(id, &BTreeMap::new()).await.unwrap();
        assert!(db.link_extras(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extras_are_per_link() {
        let (db, first) = db_with_link().await;
        let second = db
            .save_link(&mut NetworkLink::new("feedbooks.com", "Feedbooks"))
            .await
            .unwrap();

        db.set_link_extras(first, &BTreeMap::from([("k".to_string(), "1".to_string())]))
            .await
            .unwrap();
        db.set_link_extras(second, &BTreeMap::from([("k".to_string(), "2".to_string())]))
            .await
            .unwrap();

        assert_eq!(db.link_extras(first).await.unwrap()["k"], "1");
        assert_eq!(db.link_extras(second).await.unwrap()["k"], "2");
    }

    #[tokio::test]
    async fn test_set_extras_unknown_link_fails() {
        let (db, id) = db_with_link().await;
        let extras = BTreeMap::from([("k".to_string(), "v".to_string())]);
        assert!(db.set_link_extras(id + 100, &extras).await.is_err());
        assert!(db.link_extras(id + 100).await.unwrap().is_empty());
    }
}
