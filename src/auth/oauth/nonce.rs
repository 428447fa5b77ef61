//! Single-use nonces binding an install to its callback.
//!
//! A nonce moves through `pending → consumed` or `pending → expired`; both
//! end states are terminal. All persistence happens inside the shop's
//! tenant actor, which serializes access, so a consume is a single
//! conditional `UPDATE` and exactly one of N concurrent consumers wins.

use crate::tenant::{StorageError, TenantHandle};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A random anti-replay token (UUID v4, hyphenated).
///
/// ```rust
/// use shopify_tenant_oauth::auth::oauth::Nonce;
///
/// let nonce = Nonce::generate();
/// assert_eq!(nonce.as_ref().len(), 36);
/// assert_eq!(Nonce::parse(nonce.as_ref()).unwrap(), nonce);
/// assert!(Nonce::parse("not-a-nonce").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Nonce(String);

impl Nonce {
    /// Generates a fresh random nonce.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Parses a nonce received back from the provider.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::Malformed`] if `raw` is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, NonceError> {
        Uuid::parse_str(raw)
            .map(|uuid| Self(uuid.hyphenated().to_string()))
            .map_err(|_| NonceError::Malformed)
    }
}

impl AsRef<str> for Nonce {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a stored nonce is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceStatus {
    /// Stored, unused and unexpired.
    Pending,
    /// Already used by a callback.
    Consumed,
    /// Past `expires_at` and not yet swept.
    Expired,
    /// Never stored, or swept.
    Missing,
}

impl fmt::Display for NonceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
            Self::Missing => "missing",
        })
    }
}

/// Nonce lifecycle failures.
#[derive(Debug, Error)]
pub enum NonceError {
    /// `store` was called with a nonce that already exists.
    #[error("Nonce already exists")]
    AlreadyExists,

    /// The nonce was never stored (or has been swept).
    #[error("Nonce not found")]
    NotFound,

    /// The nonce has already been used.
    #[error("Nonce already consumed")]
    AlreadyConsumed,

    /// The nonce is past its expiry.
    #[error("Nonce expired")]
    Expired,

    /// The value is not a well-formed nonce.
    #[error("Nonce is malformed")]
    Malformed,

    /// The tenant store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Nonce operations for one shop, executed by that shop's actor.
#[derive(Clone, Debug)]
pub struct NonceManager {
    tenant: TenantHandle,
    ttl: Duration,
}

impl NonceManager {
    /// Creates a manager for the shop behind `tenant`.
    #[must_use]
    pub const fn new(tenant: TenantHandle, ttl: Duration) -> Self {
        Self { tenant, ttl }
    }

    /// Generates a fresh nonce without persisting it.
    #[must_use]
    pub fn generate() -> Nonce {
        Nonce::generate()
    }

    /// Lifetime applied to newly stored nonces.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persists `nonce` as pending, valid for the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::AlreadyExists`] if the nonce was stored before;
    /// the original record is left untouched.
    pub async fn store(&self, nonce: &Nonce) -> Result<(), NonceError> {
        self.store_at(nonce, Utc::now()).await
    }

    /// [`NonceManager::store`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Same as [`NonceManager::store`].
    pub async fn store_at(&self, nonce: &Nonce, now: DateTime<Utc>) -> Result<(), NonceError> {
        self.tenant.store_nonce(nonce.clone(), now, self.ttl).await
    }

    /// Reports the lifecycle state of `nonce` without changing it.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::Storage`] if the tenant store fails.
    pub async fn status(&self, nonce: &Nonce) -> Result<NonceStatus, NonceError> {
        self.status_at(nonce, Utc::now()).await
    }

    /// [`NonceManager::status`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Same as [`NonceManager::status`].
    pub async fn status_at(
        &self,
        nonce: &Nonce,
        now: DateTime<Utc>,
    ) -> Result<NonceStatus, NonceError> {
        self.tenant.nonce_status(nonce.clone(), now).await
    }

    /// Returns `true` iff the nonce is stored, unused and unexpired.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::Storage`] if the tenant store fails.
    pub async fn verify(&self, nonce: &Nonce) -> Result<bool, NonceError> {
        Ok(self.status(nonce).await? == NonceStatus::Pending)
    }

    /// Marks the nonce consumed. Succeeds at most once per nonce.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::NotFound`], [`NonceError::AlreadyConsumed`] or
    /// [`NonceError::Expired`] depending on why the nonce is unusable.
    pub async fn consume(&self, nonce: &Nonce) -> Result<(), NonceError> {
        self.consume_at(nonce, Utc::now()).await
    }

    /// [`NonceManager::consume`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Same as [`NonceManager::consume`].
    pub async fn consume_at(&self, nonce: &Nonce, now: DateTime<Utc>) -> Result<(), NonceError> {
        self.tenant.consume_nonce(nonce.clone(), now).await
    }

    /// Deletes nonces whose expiry is at or before `now`.
    ///
    /// Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::Storage`] if the tenant store fails.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, NonceError> {
        Ok(self.tenant.sweep_expired(now).await?)
    }
}
