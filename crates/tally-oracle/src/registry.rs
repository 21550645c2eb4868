//! Asset registry.
//!
//! Assets are never destroyed: deregistration only deactivates them, and the
//! registration-order list is append-only.

use std::collections::HashMap;

use tally_types::state::TrackedAsset;
use tally_types::{AssetId, Timestamp};

use crate::{OracleError, Result};

/// Maximum number of assets ever registered.
pub const MAX_ASSETS: usize = 1000;

/// Registered assets in registration order.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: HashMap<AssetId, TrackedAsset>,
    order: Vec<AssetId>,
    active_count: usize,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from records in registration order.
    pub fn from_records(records: impl IntoIterator<Item = TrackedAsset>) -> Self {
        let mut registry = Self::new();
        for record in records {
            if registry.assets.contains_key(&record.id) {
                continue;
            }
            if record.active {
                registry.active_count += 1;
            }
            registry.order.push(record.id);
            registry.assets.insert(record.id, record);
        }
        registry
    }

    /// Register or reactivate an asset.
    ///
    /// Returns `false` when the asset was already active and nothing changed.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ZeroAddress`] for the zero address
    /// - [`OracleError::RegistryFull`] when [`MAX_ASSETS`] distinct assets exist
    pub fn register(&mut self, id: AssetId, now: Timestamp) -> Result<bool> {
        if id.is_zero() {
            return Err(OracleError::ZeroAddress);
        }

        if let Some(existing) = self.assets.get_mut(&id) {
            if existing.active {
                return Ok(false);
            }
            existing.active = true;
            self.active_count += 1;
            return Ok(true);
        }

        if self.order.len() >= MAX_ASSETS {
            return Err(OracleError::RegistryFull { max: MAX_ASSETS });
        }

        self.assets.insert(
            id,
            TrackedAsset {
                id,
                active: true,
                registered_at: now,
            },
        );
        self.order.push(id);
        self.active_count += 1;
        Ok(true)
    }

    /// Deactivate an asset.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NotRegistered`] if the asset is unknown or already inactive
    pub fn deregister(&mut self, id: &AssetId) -> Result<()> {
        match self.assets.get_mut(id) {
            Some(asset) if asset.active => {
                asset.active = false;
                self.active_count -= 1;
                Ok(())
            }
            _ => Err(OracleError::NotRegistered(*id)),
        }
    }

    /// Whether the asset is registered and active.
    pub fn is_active(&self, id: &AssetId) -> bool {
        self.assets.get(id).is_some_and(|a| a.active)
    }

    pub fn get(&self, id: &AssetId) -> Option<&TrackedAsset> {
        self.assets.get(id)
    }

    /// Total number of assets ever registered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// A page of assets in registration order.
    ///
    /// # Errors
    ///
    /// - [`OracleError::OffsetOutOfBounds`] if `offset` exceeds the registry size
    pub fn list(&self, offset: usize, limit: usize) -> Result<Vec<TrackedAsset>> {
        if offset > self.order.len() {
            return Err(OracleError::OffsetOutOfBounds {
                offset,
                size: self.order.len(),
            });
        }
        Ok(self
            .order
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| self.assets.get(id).copied())
            .collect())
    }

    /// Index of the asset in registration order.
    pub fn position(&self, id: &AssetId) -> Option<usize> {
        self.order.iter().position(|a| a == id)
    }

    /// Put back an earlier state of one asset; `None` forgets the asset.
    pub fn restore(&mut self, id: AssetId, prior: Option<TrackedAsset>) {
        if self.is_active(&id) {
            self.active_count -= 1;
        }
        match prior {
            Some(record) => {
                if record.active {
                    self.active_count += 1;
                }
                if !self.assets.contains_key(&id) {
                    self.order.push(id);
                }
                self.assets.insert(id, record);
            }
            None => {
                self.assets.remove(&id);
                self.order.retain(|a| a != &id);
            }
        }
    }

    /// All records in registration order.
    pub fn records(&self) -> Vec<TrackedAsset> {
        self.order
            .iter()
            .filter_map(|id| self.assets.get(id).copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Address;

    fn asset(n: u8) -> AssetId {
        Address::from_low_u8(n)
    }

    #[test]
    fn test_register_and_duplicate_is_noop() {
        let mut registry = AssetRegistry::new();
        assert!(registry.register(asset(1), 100).expect("register"));
        assert!(!registry.register(asset(1), 200).expect("re-register"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.get(&asset(1)).map(|a| a.registered_at), Some(100));
    }

    #[test]
    fn test_register_zero_address() {
        let mut registry = AssetRegistry::new();
        assert_eq!(
            registry.register(Address::ZERO, 0),
            Err(OracleError::ZeroAddress)
        );
    }

    #[test]
    fn test_deregister_twice_fails() {
        let mut registry = AssetRegistry::new();
        registry.register(asset(1), 0).expect("register");
        registry.deregister(&asset(1)).expect("deregister");
        assert!(!registry.is_active(&asset(1)));
        assert_eq!(registry.active_count(), 0);

        let err = registry.deregister(&asset(1)).unwrap_err();
        assert_eq!(err, OracleError::NotRegistered(asset(1)));
    }

    #[test]
    fn test_deregister_unknown() {
        let mut registry = AssetRegistry::new();
        assert!(matches!(
            registry.deregister(&asset(9)),
            Err(OracleError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_reactivate_keeps_single_entry() {
        let mut registry = AssetRegistry::new();
        registry.register(asset(1), 0).expect("register");
        registry.deregister(&asset(1)).expect("deregister");
        assert!(registry.register(asset(1), 50).expect("reactivate"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_pagination() {
        let mut registry = AssetRegistry::new();
        for n in 1..=5 {
            registry.register(asset(n), u64::from(n)).expect("register");
        }
        registry.deregister(&asset(2)).expect("deregister");

        let page = registry.list(1, 2).expect("page");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, asset(2));
        assert!(!page[0].active);
        assert_eq!(page[1].id, asset(3));

        assert!(registry.list(5, 10).expect("end").is_empty());
        assert_eq!(registry.list(3, 10).expect("tail").len(), 2);
        assert_eq!(
            registry.list(6, 1),
            Err(OracleError::OffsetOutOfBounds { offset: 6, size: 5 })
        );
    }

    #[test]
    fn test_registry_full() {
        let mut registry = AssetRegistry::new();
        for n in 0..MAX_ASSETS {
            let mut bytes = [0u8; 20];
            bytes[0] = 1;
            bytes[18] = (n >> 8) as u8;
            bytes[19] = n as u8;
            registry.register(Address(bytes), 0).expect("register");
        }
        assert_eq!(
            registry.register(asset(1), 0),
            Err(OracleError::RegistryFull { max: MAX_ASSETS })
        );
    }

    #[test]
    fn test_restore_undoes_register_and_deregister() {
        let mut registry = AssetRegistry::new();
        registry.register(asset(1), 10).expect("register");
        let before = registry.get(&asset(1)).copied();

        registry.register(asset(2), 20).expect("register");
        registry.deregister(&asset(1)).expect("deregister");
        assert_eq!(registry.position(&asset(2)), Some(1));

        registry.restore(asset(2), None);
        registry.restore(asset(1), before);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_count(), 1);
        assert!(registry.is_active(&asset(1)));
        assert_eq!(registry.position(&asset(2)), None);
    }

    #[test]
    fn test_from_records_roundtrip() {
        let mut registry = AssetRegistry::new();
        registry.register(asset(1), 10).expect("register");
        registry.register(asset(2), 20).expect("register");
        registry.deregister(&asset(1)).expect("deregister");

        let rebuilt = AssetRegistry::from_records(registry.records());
        assert_eq!(rebuilt.records(), registry.records());
        assert_eq!(rebuilt.active_count(), 1);
    }
}
