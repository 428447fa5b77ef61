//! Per-shop actor runtime.
//!
//! Every shop gets one [`TenantActor`]: a tokio task that owns the shop's
//! SQLite database and executes [`TenantCommand`]s one at a time. Callers
//! talk to it through a cloneable [`TenantHandle`], obtained from the
//! [`TenantRegistry`].
//!
//! # Lifecycle
//!
//! 1. The registry spawns the actor when a shop is written to. Read-only
//!    lookups go through [`TenantRegistry::existing`] and never create
//!    state for a shop that has none.
//! 2. The actor opens its database and applies the embedded migrations
//!    before it reads any command. Commands sent meanwhile queue up.
//! 3. If opening fails, queued commands receive
//!    [`StorageError::Unavailable`], the mailbox closes, and the registry
//!    spawns a fresh actor on the next access.
//! 4. With directory storage an actor stops after an idle period. Its
//!    entry is dropped by [`TenantRegistry::prune`] or replaced on the
//!    next access.
//!
//! [`NonceSweeper`] periodically purges expired nonces for every live actor
//! and every shop database on disk.

mod actor;
mod registry;
mod store;
mod sweeper;

pub use actor::{TenantActor, TenantCommand, TenantHandle};
pub use registry::TenantRegistry;
pub use store::TenantStore;
pub use sweeper::NonceSweeper;

use thiserror::Error;

/// Failures of a tenant's database or actor.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The actor could not start, or stopped before replying.
    #[error("Tenant storage unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },

    /// A query failed.
    #[error("Tenant database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying migrations failed.
    #[error("Tenant migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be decoded.
    #[error("Corrupt tenant record: {reason}")]
    Corrupt {
        /// What could not be decoded.
        reason: String,
    },
}

const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<StorageError>();
};
