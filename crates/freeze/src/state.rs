//! FreezeState sub-state.

use std::collections::BTreeSet;
use tallyscan_types::{Address, BlockHeight, PropertyId};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreezeError {
    #[error("freezing is not enabled for property {0}")]
    NotEnabled(PropertyId),

    #[error("freezing is already enabled for property {0}")]
    AlreadyEnabled(PropertyId),
}

/// Which properties may be frozen and which addresses are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeState {
    /// (property, live height).
    enabled: BTreeSet<(PropertyId, BlockHeight)>,
    frozen: BTreeSet<(Address, PropertyId)>,
}

impl FreezeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow freezing of `property` from `live_height` on.
    pub fn enable_freezing(
        &mut self,
        property: PropertyId,
        live_height: BlockHeight,
    ) -> Result<(), FreezeError> {
        if self.live_height(property).is_some() {
            return Err(FreezeError::AlreadyEnabled(property));
        }
        self.enabled.insert((property, live_height));
        info!(%property, %live_height, "Freezing enabled");
        Ok(())
    }

    /// Disallow freezing of `property` and unfreeze every address frozen
    /// under it.
    pub fn disable_freezing(&mut self, property: PropertyId) -> Result<(), FreezeError> {
        let before = self.enabled.len();
        self.enabled.retain(|(p, _)| *p != property);
        if self.enabled.len() == before {
            return Err(FreezeError::NotEnabled(property));
        }

        let unfrozen = self.frozen.iter().filter(|(_, p)| *p == property).count();
        self.frozen.retain(|(_, p)| *p != property);
        info!(%property, unfrozen, "Freezing disabled");
        Ok(())
    }

    /// Height from which freezing of `property` is live, if enabled.
    pub fn live_height(&self, property: PropertyId) -> Option<BlockHeight> {
        self.enabled
            .range((property, BlockHeight(0))..=(property, BlockHeight(u64::MAX)))
            .next()
            .map(|(_, h)| *h)
    }

    pub fn is_freezing_enabled(&self, property: PropertyId, at_height: BlockHeight) -> bool {
        self.live_height(property)
            .is_some_and(|live| at_height >= live)
    }

    pub fn freeze(&mut self, address: Address, property: PropertyId) {
        debug!(%address, %property, "Address frozen");
        self.frozen.insert((address, property));
    }

    pub fn unfreeze(&mut self, address: &Address, property: PropertyId) -> bool {
        let removed = self.frozen.remove(&(address.clone(), property));
        if removed {
            debug!(%address, %property, "Address unfrozen");
        }
        removed
    }

    /// Whether the pair is in the frozen set, regardless of height.
    pub fn is_address_frozen(&self, address: &Address, property: PropertyId) -> bool {
        self.frozen.contains(&(address.clone(), property))
    }

    /// Whether `address` may not spend `property` at `at_height`.
    pub fn is_frozen(&self, address: &Address, property: PropertyId, at_height: BlockHeight) -> bool {
        self.is_freezing_enabled(property, at_height) && self.is_address_frozen(address, property)
    }

    pub fn enabled(&self) -> impl Iterator<Item = (PropertyId, BlockHeight)> + '_ {
        self.enabled.iter().copied()
    }

    pub fn frozen(&self) -> impl Iterator<Item = &(Address, PropertyId)> {
        self.frozen.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.frozen.is_empty()
    }

    pub fn clear(&mut self) {
        self.enabled.clear();
        self.frozen.clear();
    }
}
