//! Shop → actor routing.

use crate::config::{ShopDomain, TenantStorage};
use crate::tenant::store::DATABASE_EXTENSION;
use crate::tenant::{StorageError, TenantActor, TenantHandle, TenantStore};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;

const DEFAULT_MAILBOX_SIZE: usize = 64;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Lazily spawns and caches one [`TenantActor`] per shop.
///
/// Shops are keyed by their lowercased domain, so `Acme.myshopify.com` and
/// `acme.myshopify.com` share an actor and a database.
///
/// Actors over [`TenantStorage::Directory`] stop after the idle timeout and
/// are respawned on next use; [`TenantRegistry::prune`] drops their
/// entries. In-memory actors never idle out, since their database would
/// go with them.
pub struct TenantRegistry {
    actors: DashMap<String, TenantHandle>,
    storage: TenantStorage,
    mailbox_size: usize,
    idle_timeout: Duration,
}

impl TenantRegistry {
    /// Creates an empty registry backed by `storage`.
    #[must_use]
    pub fn new(storage: TenantStorage) -> Self {
        Self {
            actors: DashMap::new(),
            storage,
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Overrides the per-actor mailbox capacity.
    #[must_use]
    pub const fn with_mailbox_size(mut self, size: usize) -> Self {
        self.mailbox_size = size;
        self
    }

    /// Overrides how long an on-disk actor may sit idle before stopping.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Returns the live actor for `shop`, spawning one if needed.
    ///
    /// A handle whose actor has stopped is replaced. Only use this where
    /// creating the shop's database is intended; read paths go through
    /// [`TenantRegistry::existing`].
    #[must_use]
    pub fn handle(&self, shop: &ShopDomain) -> TenantHandle {
        match self.actors.entry(shop.canonical()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    tracing::debug!(shop = %shop, "Respawning stopped tenant actor");
                    entry.insert(self.spawn(shop));
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(self.spawn(shop)).clone(),
        }
    }

    /// Returns an actor for `shop` only if the shop already has state.
    ///
    /// That is a live actor, or a database file on disk. Unknown shops get
    /// `None` and nothing is spawned or created.
    #[must_use]
    pub fn existing(&self, shop: &ShopDomain) -> Option<TenantHandle> {
        if let Some(entry) = self.actors.get(&shop.canonical()) {
            if !entry.value().is_closed() {
                return Some(entry.value().clone());
            }
        }
        let path = TenantStore::database_path(&self.storage, shop)?;
        path.is_file().then(|| self.handle(shop))
    }

    fn spawn(&self, shop: &ShopDomain) -> TenantHandle {
        let idle_timeout = match self.storage {
            TenantStorage::Directory(_) => Some(self.idle_timeout),
            TenantStorage::InMemory => None,
        };
        TenantActor::spawn(
            shop.clone(),
            self.storage.clone(),
            self.mailbox_size,
            idle_timeout,
        )
    }

    /// Drops entries whose actor has stopped; returns how many.
    pub fn prune(&self) -> usize {
        let before = self.actors.len();
        self.actors.retain(|_, handle| !handle.is_closed());
        before.saturating_sub(self.actors.len())
    }

    /// Shops with a database file in [`TenantStorage::Directory`].
    ///
    /// Empty for in-memory storage or a directory that does not exist yet.
    /// Files whose name is not a valid shop domain are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the directory cannot be
    /// read.
    pub async fn stored_shops(&self) -> Result<Vec<ShopDomain>, StorageError> {
        let TenantStorage::Directory(dir) = &self.storage else {
            return Ok(Vec::new());
        };
        let unreadable = |e: std::io::Error| StorageError::Unavailable {
            reason: format!("cannot list {}: {e}", dir.display()),
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unreadable(e)),
        };

        let mut shops = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DATABASE_EXTENSION) {
                continue;
            }
            if let Some(shop) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| ShopDomain::new(stem).ok())
            {
                shops.push(shop);
            }
        }
        Ok(shops)
    }

    /// Handles of every actor that is still accepting commands.
    #[must_use]
    pub fn live_handles(&self) -> Vec<TenantHandle> {
        self.actors
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of cached actors, live or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Returns `true` if no actor has been spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

impl fmt::Debug for TenantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantRegistry")
            .field("actors", &self.actors.len())
            .field("storage", &self.storage)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("registry-dir-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_same_shop_shares_one_actor() {
        let registry = TenantRegistry::new(TenantStorage::InMemory);
        let upper = ShopDomain::new("Acme.myshopify.com").unwrap();
        let lower = ShopDomain::new("acme.myshopify.com").unwrap();
        let other = ShopDomain::new("other.myshopify.com").unwrap();

        let _ = registry.handle(&upper);
        let _ = registry.handle(&lower);
        assert_eq!(registry.len(), 1);

        let _ = registry.handle(&other);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.live_handles().len(), 2);
    }

    #[tokio::test]
    async fn test_dead_actor_is_replaced_on_next_access() {
        let blocker = std::env::temp_dir().join(format!("registry-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"file").unwrap();
        let registry = TenantRegistry::new(TenantStorage::Directory(blocker.join("x")));
        let shop = ShopDomain::new("broken.myshopify.com").unwrap();

        let first = registry.handle(&shop);
        let err = first.retrieve_token().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        assert!(first.is_closed());
        assert!(registry.live_handles().is_empty());

        let second = registry.handle(&shop);
        assert_eq!(registry.len(), 1);
        assert!(second.retrieve_token().await.is_err());

        let _ = std::fs::remove_file(blocker);
    }

    #[tokio::test]
    async fn test_existing_does_not_spawn_for_unknown_shops() {
        let dir = temp_dir();
        let registry = TenantRegistry::new(TenantStorage::Directory(dir.clone()));
        let shop = ShopDomain::new("unknown.myshopify.com").unwrap();

        assert!(registry.existing(&shop).is_none());
        assert!(registry.is_empty());
        assert!(!dir.exists());

        let memory = TenantRegistry::new(TenantStorage::InMemory);
        assert!(memory.existing(&shop).is_none());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_existing_finds_live_actor_and_database_file() {
        let dir = temp_dir();
        let shop = ShopDomain::new("Known.myshopify.com").unwrap();
        {
            let registry = TenantRegistry::new(TenantStorage::Directory(dir.clone()));
            registry.handle(&shop).retrieve_token().await.unwrap();
            assert!(registry.existing(&shop).is_some());
        }

        let restarted = TenantRegistry::new(TenantStorage::Directory(dir.clone()));
        let handle = restarted.existing(&shop).unwrap();
        assert!(handle.retrieve_token().await.unwrap().is_none());
        assert_eq!(restarted.len(), 1);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_idle_directory_actors_are_pruned() {
        let dir = temp_dir();
        let registry = TenantRegistry::new(TenantStorage::Directory(dir.clone()))
            .with_idle_timeout(Duration::from_millis(50));
        let shop = ShopDomain::new("idle.myshopify.com").unwrap();
        registry.handle(&shop).retrieve_token().await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(registry.live_handles().is_empty());
        assert_eq!(registry.prune(), 1);
        assert!(registry.is_empty());

        // Data survives the actor.
        assert!(registry.existing(&shop).is_some());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_in_memory_actors_do_not_idle_out() {
        let registry = TenantRegistry::new(TenantStorage::InMemory)
            .with_idle_timeout(Duration::from_millis(20));
        let shop = ShopDomain::new("memory.myshopify.com").unwrap();
        registry.handle(&shop).retrieve_token().await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.prune(), 0);
        assert_eq!(registry.live_handles().len(), 1);
    }

    #[tokio::test]
    async fn test_stored_shops_lists_database_files() {
        let dir = temp_dir();
        let registry = TenantRegistry::new(TenantStorage::Directory(dir.clone()));
        assert!(registry.stored_shops().await.unwrap().is_empty());

        for name in ["alpha", "beta"] {
            let shop = ShopDomain::new(format!("{name}.myshopify.com")).unwrap();
            registry.handle(&shop).retrieve_token().await.unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.join("not a shop.sqlite3"), b"x").unwrap();

        let mut shops: Vec<String> = registry
            .stored_shops()
            .await
            .unwrap()
            .iter()
            .map(ShopDomain::canonical)
            .collect();
        shops.sort();
        assert_eq!(shops, ["alpha.myshopify.com", "beta.myshopify.com"]);

        let _ = std::fs::remove_dir_all(dir);
    }
}
