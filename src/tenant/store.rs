//! SQLite persistence for one shop.

use crate::auth::oauth::{Nonce, NonceError, NonceStatus, StoredAccessToken};
use crate::config::{ShopDomain, TenantId, TenantStorage};
use crate::tenant::StorageError;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// File extension of per-shop databases in [`TenantStorage::Directory`].
pub const DATABASE_EXTENSION: &str = "sqlite3";

/// Embedded schema migrations, applied on every actor cold start.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// A shop's database. Owned by exactly one [`super::TenantActor`].
#[derive(Debug)]
pub struct TenantStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct NonceRow {
    expires_at: i64,
    consumed_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct AccessTokenRow {
    shop: String,
    tenant_id: String,
    access_token: String,
    scope: String,
    obtained_at: i64,
}

impl TryFrom<AccessTokenRow> for StoredAccessToken {
    type Error = StorageError;

    fn try_from(row: AccessTokenRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StorageError::Corrupt { reason };
        Ok(Self {
            shop: ShopDomain::new(row.shop).map_err(|e| corrupt(e.to_string()))?,
            tenant_id: TenantId::new(row.tenant_id).map_err(|e| corrupt(e.to_string()))?,
            access_token: SecretString::from(row.access_token),
            scope: row.scope,
            obtained_at: DateTime::from_timestamp_millis(row.obtained_at)
                .ok_or_else(|| corrupt(format!("obtained_at {}", row.obtained_at)))?,
        })
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl TenantStore {
    /// Where `shop`'s database file lives, or `None` for in-memory storage.
    #[must_use]
    pub fn database_path(storage: &TenantStorage, shop: &ShopDomain) -> Option<PathBuf> {
        match storage {
            TenantStorage::Directory(dir) => {
                Some(dir.join(format!("{}.{DATABASE_EXTENSION}", shop.canonical())))
            }
            TenantStorage::InMemory => None,
        }
    }

    /// Opens (creating if needed) the database for `shop` and migrates it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the database cannot be opened or a
    /// migration fails. Migrations run in transactions, so a failure
    /// leaves the schema at the last fully applied version.
    pub async fn open(storage: &TenantStorage, shop: &ShopDomain) -> Result<Self, StorageError> {
        let options = match storage {
            TenantStorage::InMemory => SqliteConnectOptions::from_str("sqlite::memory:")?,
            TenantStorage::Directory(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| StorageError::Unavailable {
                        reason: format!("cannot create {}: {e}", dir.display()),
                    })?;
                SqliteConnectOptions::new()
                    .filename(dir.join(format!("{}.{DATABASE_EXTENSION}", shop.canonical())))
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
            }
        };

        // One connection: the actor is the only user, and an in-memory
        // database lives exactly as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    /// Inserts a pending nonce unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::AlreadyExists`] on a duplicate.
    pub async fn insert_nonce(
        &self,
        nonce: &Nonce,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), NonceError> {
        let created_at = now.timestamp_millis();
        let expires_at = created_at.saturating_add(millis(ttl));

        let result = sqlx::query(
            "INSERT INTO nonces (nonce, created_at, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT(nonce) DO NOTHING",
        )
        .bind(nonce.as_ref())
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            return Err(NonceError::AlreadyExists);
        }
        Ok(())
    }

    /// Reads a nonce's lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn nonce_status(
        &self,
        nonce: &Nonce,
        now: DateTime<Utc>,
    ) -> Result<NonceStatus, StorageError> {
        let row: Option<NonceRow> =
            sqlx::query_as("SELECT expires_at, consumed_at FROM nonces WHERE nonce = ?")
                .bind(nonce.as_ref())
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            None => NonceStatus::Missing,
            Some(row) if row.consumed_at.is_some() => NonceStatus::Consumed,
            Some(row) if row.expires_at <= now.timestamp_millis() => NonceStatus::Expired,
            Some(_) => NonceStatus::Pending,
        })
    }

    /// Marks a pending nonce consumed with one conditional update.
    ///
    /// # Errors
    ///
    /// Returns the [`NonceError`] matching why the nonce is unusable.
    pub async fn consume_nonce(&self, nonce: &Nonce, now: DateTime<Utc>) -> Result<(), NonceError> {
        let now_ms = now.timestamp_millis();
        let result = sqlx::query(
            "UPDATE nonces SET consumed_at = ? \
             WHERE nonce = ? AND consumed_at IS NULL AND expires_at > ?",
        )
        .bind(now_ms)
        .bind(nonce.as_ref())
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.nonce_status(nonce, now).await? {
            NonceStatus::Missing => Err(NonceError::NotFound),
            NonceStatus::Consumed => Err(NonceError::AlreadyConsumed),
            NonceStatus::Expired | NonceStatus::Pending => Err(NonceError::Expired),
        }
    }

    /// Deletes nonces that expired at or before `now`, consumed or not.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM nonces WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Inserts or replaces the shop's token.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn upsert_token(&self, token: &StoredAccessToken) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO access_tokens (shop, tenant_id, access_token, scope, obtained_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(shop) DO UPDATE SET \
                tenant_id = excluded.tenant_id, \
                access_token = excluded.access_token, \
                scope = excluded.scope, \
                obtained_at = excluded.obtained_at",
        )
        .bind(token.shop.canonical())
        .bind(token.tenant_id.as_ref())
        .bind(token.access_token.expose_secret())
        .bind(&token.scope)
        .bind(token.obtained_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads the token stored for `shop`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails or the row is corrupt.
    pub async fn get_token(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<StoredAccessToken>, StorageError> {
        let row: Option<AccessTokenRow> = sqlx::query_as(
            "SELECT shop, tenant_id, access_token, scope, obtained_at \
             FROM access_tokens WHERE shop = ?",
        )
        .bind(shop.canonical())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredAccessToken::try_from).transpose()
    }

    /// Deletes the token stored for `shop`; returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails.
    pub async fn delete_token(&self, shop: &ShopDomain) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE shop = ?")
            .bind(shop.canonical())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Closes the pool.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    async fn open() -> TenantStore {
        let shop = ShopDomain::new("store-test.myshopify.com").unwrap();
        TenantStore::open(&TenantStorage::InMemory, &shop).await.unwrap()
    }

    #[tokio::test]
    async fn test_migrations_are_recorded() {
        let store = open().await;
        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(applied, 2);
    }

    #[tokio::test]
    async fn test_reopen_on_disk_keeps_data() {
        let dir = std::env::temp_dir().join(format!("tenant-store-{}", uuid::Uuid::new_v4()));
        let storage = TenantStorage::Directory(dir.clone());
        let shop = ShopDomain::new("Disk-Shop.myshopify.com").unwrap();
        let nonce = Nonce::generate();

        let store = TenantStore::open(&storage, &shop).await.unwrap();
        store
            .insert_nonce(&nonce, Utc::now(), Duration::from_secs(600))
            .await
            .unwrap();
        store.close().await;

        assert!(dir.join("disk-shop.myshopify.com.sqlite3").exists());

        let store = TenantStore::open(&storage, &shop).await.unwrap();
        assert_eq!(
            store.nonce_status(&nonce, Utc::now()).await.unwrap(),
            NonceStatus::Pending
        );
        store.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_consume_respects_expiry_boundary() {
        let store = open().await;
        let nonce = Nonce::generate();
        let issued = Utc::now();
        store
            .insert_nonce(&nonce, issued, Duration::from_secs(60))
            .await
            .unwrap();

        let at_expiry = issued + ChronoDuration::seconds(60);
        assert!(matches!(
            store.consume_nonce(&nonce, at_expiry).await,
            Err(NonceError::Expired)
        ));
        store
            .consume_nonce(&nonce, issued + ChronoDuration::seconds(59))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_consumed_and_expired() {
        let store = open().await;
        let now = Utc::now();
        let consumed = Nonce::generate();
        let live = Nonce::generate();
        let ttl = Duration::from_secs(60);

        store.insert_nonce(&consumed, now, ttl).await.unwrap();
        store.consume_nonce(&consumed, now).await.unwrap();
        store
            .insert_nonce(&live, now + ChronoDuration::seconds(30), ttl)
            .await
            .unwrap();

        let removed = store
            .sweep_expired(now + ChronoDuration::seconds(61))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            store.nonce_status(&consumed, now).await.unwrap(),
            NonceStatus::Missing
        );
    }

    #[tokio::test]
    async fn test_token_lookup_is_case_insensitive_on_shop() {
        let store = open().await;
        let token = StoredAccessToken {
            shop: ShopDomain::new("Mixed.myshopify.com").unwrap(),
            tenant_id: TenantId::new("acme").unwrap(),
            access_token: SecretString::from("shpat_1"),
            scope: "read_products".to_string(),
            obtained_at: Utc::now(),
        };
        store.upsert_token(&token).await.unwrap();

        let lower = ShopDomain::new("mixed.myshopify.com").unwrap();
        let found = store.get_token(&lower).await.unwrap().unwrap();
        assert_eq!(found.access_token.expose_secret(), "shpat_1");
        assert!(store.delete_token(&lower).await.unwrap());
    }
}
