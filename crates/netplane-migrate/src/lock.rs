//! Migration lock on the ClusterInformation singleton
//!
//! The lock is the `datastoreReady` flag: `false` tells every consumer that
//! the datastore is mid-migration and not authoritative. It is advisory;
//! migration itself keeps writing while it is held. Writes carry the
//! resourceVersion read just before, so a concurrent writer makes the lock
//! attempt fail rather than being overwritten.

use std::io::Write;

use tracing::info;

use netplane_common::crd::ClusterInformation;

use crate::client::{ensure_initialized, DatastoreClient};
use crate::error::MigrateError;

/// Takes, checks and releases the migration lock
pub struct LockManager<'a, C: DatastoreClient + ?Sized> {
    client: &'a C,
    product_version: String,
}

impl<'a, C: DatastoreClient + ?Sized> LockManager<'a, C> {
    /// Create a lock manager; `product_version` is stamped into a
    /// ClusterInformation record it has to create.
    pub fn new(client: &'a C, product_version: impl Into<String>) -> Self {
        Self {
            client,
            product_version: product_version.into(),
        }
    }

    async fn load(&self) -> Result<ClusterInformation, MigrateError> {
        self.client
            .get_cluster_info()
            .await?
            .ok_or(MigrateError::ClusterInfoMissing)
    }

    async fn set_ready(&self, ready: bool) -> Result<(), MigrateError> {
        ensure_initialized(self.client, &self.product_version).await?;
        let mut current = self.load().await?;
        if current.spec.datastore_ready == Some(ready) {
            return Ok(());
        }
        current.spec.datastore_ready = Some(ready);
        self.client.update_cluster_info(&current).await?;
        Ok(())
    }

    /// Lock the datastore. Already locked is success; the flag is never
    /// flipped back.
    pub async fn lock<W: Write>(&self, out: &mut W) -> Result<(), MigrateError> {
        self.set_ready(false).await?;
        info!("datastore locked");
        writeln!(out, "Datastore locked.").map_err(|e| MigrateError::io("writing output", e))
    }

    /// Whether the lock is held. Read-only.
    pub async fn check_locked(&self) -> Result<bool, MigrateError> {
        Ok(self.load().await?.is_locked())
    }

    /// Lock unless already locked. Returns whether this call took the lock.
    pub async fn ensure_locked<W: Write>(&self, out: &mut W) -> Result<bool, MigrateError> {
        if self.check_locked().await? {
            info!("datastore already locked");
            return Ok(false);
        }
        self.lock(out).await?;
        Ok(true)
    }

    /// Release the lock once the cluster has been switched to the new
    /// datastore.
    pub async fn unlock<W: Write>(&self, out: &mut W) -> Result<(), MigrateError> {
        self.set_ready(true).await?;
        info!("datastore unlocked");
        writeln!(out, "Datastore unlocked.").map_err(|e| MigrateError::io("writing output", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockDatastoreClient;
    use crate::error::StoreError;
    use crate::fake::FakeDatastore;
    use netplane_common::crd::ClusterInformationSpec;

    fn unlocked_info(rv: &str) -> ClusterInformation {
        let mut info = ClusterInformation::initial("abc123", "v0.1.0");
        info.metadata.resource_version = Some(rv.to_string());
        info
    }

    #[tokio::test]
    async fn test_lock_then_check_reports_locked() {
        let store = FakeDatastore::new();
        let locks = LockManager::new(&store, "v0.1.0");
        let mut out = Vec::new();

        locks.lock(&mut out).await.unwrap();

        assert!(locks.check_locked().await.unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), "Datastore locked.\n");
    }

    #[tokio::test]
    async fn test_locking_twice_keeps_the_lock() {
        let store = FakeDatastore::new();
        let locks = LockManager::new(&store, "v0.1.0");
        let mut out = Vec::new();

        locks.lock(&mut out).await.unwrap();
        let writes = store.write_count();
        locks.lock(&mut out).await.unwrap();

        assert!(locks.check_locked().await.unwrap());
        assert_eq!(store.write_count(), writes);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Datastore locked.\nDatastore locked.\n"
        );
    }

    #[tokio::test]
    async fn test_ensure_locked_only_locks_when_unlocked() {
        let store = FakeDatastore::new();
        store.seed_cluster_info(ClusterInformationSpec {
            cluster_guid: Some("abc123".to_string()),
            product_version: Some("v0.1.0".to_string()),
            datastore_ready: Some(true),
            ..Default::default()
        });
        let locks = LockManager::new(&store, "v0.1.0");
        let mut out = Vec::new();

        assert!(locks.ensure_locked(&mut out).await.unwrap());
        assert!(!locks.ensure_locked(&mut out).await.unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), "Datastore locked.\n");
    }

    #[tokio::test]
    async fn test_unset_flag_reads_as_unlocked() {
        let store = FakeDatastore::new();
        store.seed_cluster_info(ClusterInformationSpec {
            cluster_guid: Some("abc123".to_string()),
            ..Default::default()
        });
        let locks = LockManager::new(&store, "v0.1.0");
        assert!(!locks.check_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_releases_the_lock() {
        let store = FakeDatastore::new();
        let locks = LockManager::new(&store, "v0.1.0");
        let mut out = Vec::new();

        locks.lock(&mut out).await.unwrap();
        locks.unlock(&mut out).await.unwrap();

        assert!(!locks.check_locked().await.unwrap());
        assert!(String::from_utf8(out)
            .unwrap()
            .ends_with("Datastore unlocked.\n"));
    }

    #[tokio::test]
    async fn test_concurrent_write_fails_the_lock() {
        let mut mock = MockDatastoreClient::new();
        mock.expect_get_cluster_info()
            .returning(|| Ok(Some(unlocked_info("10"))));
        mock.expect_update_cluster_info()
            .withf(|info| {
                info.spec.datastore_ready == Some(false)
                    && info.metadata.resource_version.as_deref() == Some("10")
            })
            .times(1)
            .returning(|_| {
                Err(StoreError::Conflict {
                    target: "ClusterInformation 'default'".to_string(),
                    message: "the object has been modified".to_string(),
                })
            });

        let locks = LockManager::new(&mock, "v0.1.0");
        let mut out = Vec::new();
        let err = locks.lock(&mut out).await.unwrap_err();

        assert!(matches!(err, MigrateError::Store(ref e) if e.is_conflict()));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_check_locked_does_not_write() {
        let mut mock = MockDatastoreClient::new();
        mock.expect_get_cluster_info().returning(|| {
            let mut info = unlocked_info("3");
            info.spec.datastore_ready = Some(false);
            Ok(Some(info))
        });
        mock.expect_update_cluster_info().never();
        mock.expect_create_cluster_info().never();

        let locks = LockManager::new(&mock, "v0.1.0");
        assert!(locks.check_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_check_locked_without_record_is_an_error() {
        let mut mock = MockDatastoreClient::new();
        mock.expect_get_cluster_info().returning(|| Ok(None));

        let locks = LockManager::new(&mock, "v0.1.0");
        assert!(matches!(
            locks.check_locked().await,
            Err(MigrateError::ClusterInfoMissing)
        ));
    }
}
