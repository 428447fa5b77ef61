//! Periodic expired-nonce cleanup.

use crate::config::ShopDomain;
use crate::tenant::TenantRegistry;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task that drops expired nonces for every known shop.
///
/// Each sweep covers the live actors plus every database file in
/// directory storage, so shops untouched since a restart are swept too.
/// Actors spawned for the sweep stop again after the registry's idle
/// timeout. Stopped actors are pruned from the registry after each sweep.
/// Failures are logged and never stop the loop.
#[derive(Clone, Debug)]
pub struct NonceSweeper {
    registry: Arc<TenantRegistry>,
    interval: Duration,
}

impl NonceSweeper {
    /// Creates a sweeper that ticks every `interval`.
    #[must_use]
    pub const fn new(registry: Arc<TenantRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Starts the sweep loop. The first sweep runs one `interval` from now.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        })
    }

    /// Runs one sweep over all known shops and returns the total removed.
    pub async fn sweep_once(&self) -> u64 {
        let now = Utc::now();
        let mut shops: BTreeMap<String, ShopDomain> = self
            .registry
            .live_handles()
            .into_iter()
            .map(|handle| (handle.shop().canonical(), handle.shop().clone()))
            .collect();
        match self.registry.stored_shops().await {
            Ok(stored) => {
                for shop in stored {
                    shops.entry(shop.canonical()).or_insert(shop);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Listing tenant databases failed"),
        }

        let mut removed = 0;
        for shop in shops.values() {
            match self.registry.handle(shop).sweep_expired(now).await {
                Ok(count) => removed += count,
                Err(e) => {
                    tracing::warn!(shop = %shop, error = %e, "Nonce sweep failed");
                }
            }
        }
        let pruned = self.registry.prune();
        if removed > 0 || pruned > 0 {
            tracing::info!(removed, pruned, "Swept expired nonces");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::{Nonce, NonceStatus};
    use crate::config::{ShopDomain, TenantStorage};

    #[tokio::test]
    async fn test_sweep_once_covers_every_live_actor() {
        let registry = Arc::new(TenantRegistry::new(TenantStorage::InMemory));
        let ttl = Duration::from_secs(60);
        let stale = Utc::now() - chrono::Duration::minutes(5);

        let mut expired = Vec::new();
        for name in ["one", "two"] {
            let shop = ShopDomain::new(format!("{name}.myshopify.com")).unwrap();
            let handle = registry.handle(&shop);
            let nonce = Nonce::generate();
            handle.store_nonce(nonce.clone(), stale, ttl).await.unwrap();
            handle
                .store_nonce(Nonce::generate(), Utc::now(), ttl)
                .await
                .unwrap();
            expired.push((handle, nonce));
        }

        let sweeper = NonceSweeper::new(Arc::clone(&registry), Duration::from_secs(3600));
        assert_eq!(sweeper.sweep_once().await, 2);
        assert_eq!(sweeper.sweep_once().await, 0);

        for (handle, nonce) in expired {
            assert_eq!(
                handle.nonce_status(nonce, Utc::now()).await.unwrap(),
                NonceStatus::Missing
            );
        }
    }

    #[tokio::test]
    async fn test_sweep_once_with_no_actors_is_zero() {
        let registry = Arc::new(TenantRegistry::new(TenantStorage::InMemory));
        let sweeper = NonceSweeper::new(registry, Duration::from_secs(1));
        assert_eq!(sweeper.sweep_once().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_covers_shops_not_loaded_since_restart() {
        let dir = std::env::temp_dir().join(format!("sweeper-{}", uuid::Uuid::new_v4()));
        let shop = ShopDomain::new("dormant.myshopify.com").unwrap();
        let nonce = Nonce::generate();
        {
            let registry = TenantRegistry::new(TenantStorage::Directory(dir.clone()));
            registry
                .handle(&shop)
                .store_nonce(
                    nonce.clone(),
                    Utc::now() - chrono::Duration::minutes(5),
                    Duration::from_secs(60),
                )
                .await
                .unwrap();
        }

        let restarted = Arc::new(TenantRegistry::new(TenantStorage::Directory(dir.clone())));
        assert!(restarted.is_empty());
        let sweeper = NonceSweeper::new(Arc::clone(&restarted), Duration::from_secs(3600));
        assert_eq!(sweeper.sweep_once().await, 1);
        assert_eq!(
            restarted
                .handle(&shop)
                .nonce_status(nonce, Utc::now())
                .await
                .unwrap(),
            NonceStatus::Missing
        );

        let _ = std::fs::remove_dir_all(dir);
    }
}
