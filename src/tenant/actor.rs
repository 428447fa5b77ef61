//! The per-shop actor and its handle.

use crate::auth::oauth::{Nonce, NonceError, NonceStatus, StoredAccessToken};
use crate::config::{ShopDomain, TenantStorage};
use crate::tenant::{StorageError, TenantStore};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

type Reply<T> = oneshot::Sender<T>;

/// A request executed by a [`TenantActor`].
#[derive(Debug)]
pub enum TenantCommand {
    /// Persist a pending nonce.
    StoreNonce {
        /// Nonce to store.
        nonce: Nonce,
        /// Issue time.
        now: DateTime<Utc>,
        /// Validity window.
        ttl: Duration,
        /// Result channel.
        reply: Reply<Result<(), NonceError>>,
    },
    /// Read a nonce's lifecycle state.
    NonceStatus {
        /// Nonce to look up.
        nonce: Nonce,
        /// Clock reading used for expiry.
        now: DateTime<Utc>,
        /// Result channel.
        reply: Reply<Result<NonceStatus, StorageError>>,
    },
    /// Consume a pending nonce.
    ConsumeNonce {
        /// Nonce to consume.
        nonce: Nonce,
        /// Clock reading used for expiry.
        now: DateTime<Utc>,
        /// Result channel.
        reply: Reply<Result<(), NonceError>>,
    },
    /// Delete expired nonces.
    SweepExpired {
        /// Clock reading used for expiry.
        now: DateTime<Utc>,
        /// Result channel.
        reply: Reply<Result<u64, StorageError>>,
    },
    /// Insert or replace the shop's token.
    StoreToken {
        /// Token to persist.
        token: StoredAccessToken,
        /// Result channel.
        reply: Reply<Result<(), StorageError>>,
    },
    /// Read the shop's token.
    RetrieveToken {
        /// Result channel.
        reply: Reply<Result<Option<StoredAccessToken>, StorageError>>,
    },
    /// Delete the shop's token.
    DeleteToken {
        /// Result channel.
        reply: Reply<Result<bool, StorageError>>,
    },
}

impl TenantCommand {
    /// Answers the command with `StorageError::Unavailable`.
    fn reject(self, reason: &str) {
        let unavailable = || StorageError::Unavailable {
            reason: reason.to_string(),
        };
        // A dropped receiver means the caller gave up; nothing to do.
        match self {
            Self::StoreNonce { reply, .. } | Self::ConsumeNonce { reply, .. } => {
                let _ = reply.send(Err(unavailable().into()));
            }
            Self::NonceStatus { reply, .. } => {
                let _ = reply.send(Err(unavailable()));
            }
            Self::SweepExpired { reply, .. } => {
                let _ = reply.send(Err(unavailable()));
            }
            Self::StoreToken { reply, .. } => {
                let _ = reply.send(Err(unavailable()));
            }
            Self::RetrieveToken { reply } => {
                let _ = reply.send(Err(unavailable()));
            }
            Self::DeleteToken { reply } => {
                let _ = reply.send(Err(unavailable()));
            }
        }
    }
}

/// Serial executor for one shop's storage.
#[derive(Debug)]
pub struct TenantActor {
    shop: ShopDomain,
    storage: TenantStorage,
    mailbox: mpsc::Receiver<TenantCommand>,
    idle_timeout: Option<Duration>,
}

impl TenantActor {
    /// Spawns an actor for `shop` and returns its handle.
    ///
    /// With an `idle_timeout`, the actor closes its mailbox and its
    /// database after that long without a command; the handle then reports
    /// [`TenantHandle::is_closed`]. Must be called from within a tokio
    /// runtime.
    #[must_use]
    pub fn spawn(
        shop: ShopDomain,
        storage: TenantStorage,
        mailbox_size: usize,
        idle_timeout: Option<Duration>,
    ) -> TenantHandle {
        let (sender, mailbox) = mpsc::channel(mailbox_size.max(1));
        let actor = Self {
            shop: shop.clone(),
            storage,
            mailbox,
            idle_timeout,
        };
        let span = tracing::info_span!("tenant_actor", shop = %shop);
        tokio::spawn(actor.run().instrument(span));
        TenantHandle { shop, sender }
    }

    async fn run(mut self) {
        let store = match TenantStore::open(&self.storage, &self.shop).await {
            Ok(store) => store,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(error = %reason, "Tenant storage failed to initialize");
                self.mailbox.close();
                while let Some(command) = self.mailbox.recv().await {
                    command.reject(&reason);
                }
                return;
            }
        };

        tracing::debug!("Tenant actor ready");
        while let Some(command) = self.next_command().await {
            Self::handle(&self.shop, &store, command).await;
        }
        store.close().await;
        tracing::debug!("Tenant actor stopped");
    }

    /// Next command, or `None` once every sender is gone or the actor has
    /// been idle for `idle_timeout`. Commands already queued when the idle
    /// timer fires are still served.
    async fn next_command(&mut self) -> Option<TenantCommand> {
        let Some(idle) = self.idle_timeout else {
            return self.mailbox.recv().await;
        };
        match tokio::time::timeout(idle, self.mailbox.recv()).await {
            Ok(command) => command,
            Err(_) => {
                tracing::debug!(idle_secs = idle.as_secs(), "Tenant actor idle, stopping");
                self.mailbox.close();
                self.idle_timeout = None;
                self.mailbox.recv().await
            }
        }
    }

    async fn handle(shop: &ShopDomain, store: &TenantStore, command: TenantCommand) {
        match command {
            TenantCommand::StoreNonce {
                nonce,
                now,
                ttl,
                reply,
            } => {
                let _ = reply.send(store.insert_nonce(&nonce, now, ttl).await);
            }
            TenantCommand::NonceStatus { nonce, now, reply } => {
                let _ = reply.send(store.nonce_status(&nonce, now).await);
            }
            TenantCommand::ConsumeNonce { nonce, now, reply } => {
                let _ = reply.send(store.consume_nonce(&nonce, now).await);
            }
            TenantCommand::SweepExpired { now, reply } => {
                let _ = reply.send(store.sweep_expired(now).await);
            }
            TenantCommand::StoreToken { token, reply } => {
                let _ = reply.send(store.upsert_token(&token).await);
            }
            TenantCommand::RetrieveToken { reply } => {
                let _ = reply.send(store.get_token(shop).await);
            }
            TenantCommand::DeleteToken { reply } => {
                let _ = reply.send(store.delete_token(shop).await);
            }
        }
    }
}

/// Cloneable sender side of a [`TenantActor`].
#[derive(Clone, Debug)]
pub struct TenantHandle {
    shop: ShopDomain,
    sender: mpsc::Sender<TenantCommand>,
}

impl TenantHandle {
    /// Shop served by this actor.
    #[must_use]
    pub const fn shop(&self) -> &ShopDomain {
        &self.shop
    }

    /// Returns `true` once the actor can no longer accept commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> TenantCommand,
    ) -> Result<T, StorageError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| StorageError::Unavailable {
                reason: format!("actor for {} is not running", self.shop),
            })?;
        response.await.map_err(|_| StorageError::Unavailable {
            reason: format!("actor for {} stopped before replying", self.shop),
        })
    }

    /// See [`TenantStore::insert_nonce`].
    ///
    /// # Errors
    ///
    /// Returns [`NonceError`] from the store, or
    /// [`StorageError::Unavailable`] if the actor is gone.
    pub async fn store_nonce(
        &self,
        nonce: Nonce,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), NonceError> {
        self.request(|reply| TenantCommand::StoreNonce {
            nonce,
            now,
            ttl,
            reply,
        })
        .await?
    }

    /// See [`TenantStore::nonce_status`].
    ///
    /// # Errors
    ///
    /// Returns [`NonceError::Storage`] on storage failure.
    pub async fn nonce_status(
        &self,
        nonce: Nonce,
        now: DateTime<Utc>,
    ) -> Result<NonceStatus, NonceError> {
        Ok(self
            .request(|reply| TenantCommand::NonceStatus { nonce, now, reply })
            .await??)
    }

    /// See [`TenantStore::consume_nonce`].
    ///
    /// # Errors
    ///
    /// Returns the store's [`NonceError`].
    pub async fn consume_nonce(&self, nonce: Nonce, now: DateTime<Utc>) -> Result<(), NonceError> {
        self.request(|reply| TenantCommand::ConsumeNonce { nonce, now, reply })
            .await?
    }

    /// See [`TenantStore::sweep_expired`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on failure.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        self.request(|reply| TenantCommand::SweepExpired { now, reply })
            .await?
    }

    /// See [`TenantStore::upsert_token`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on failure.
    pub async fn store_token(&self, token: StoredAccessToken) -> Result<(), StorageError> {
        self.request(|reply| TenantCommand::StoreToken { token, reply })
            .await?
    }

    /// See [`TenantStore::get_token`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on failure.
    pub async fn retrieve_token(&self) -> Result<Option<StoredAccessToken>, StorageError> {
        self.request(|reply| TenantCommand::RetrieveToken { reply })
            .await?
    }

    /// See [`TenantStore::delete_token`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on failure.
    pub async fn delete_token(&self) -> Result<bool, StorageError> {
        self.request(|reply| TenantCommand::DeleteToken { reply })
            .await?
    }
}
