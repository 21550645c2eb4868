//! Role checks.
//!
//! Membership is owned by an external provider; the oracle only asks.

use std::collections::HashSet;

use tally_types::Address;

/// Distinguishes admin callers from validator callers.
pub trait AccessControl {
    /// Whether `who` may register assets, change parameters, pause and upgrade.
    fn is_admin(&self, who: &Address) -> bool;

    /// Whether `who` may submit prices.
    fn is_validator(&self, who: &Address) -> bool;
}

/// Fixed role sets, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAccess {
    admins: HashSet<Address>,
    validators: HashSet<Address>,
}

impl StaticAccess {
    pub fn new(
        admins: impl IntoIterator<Item = Address>,
        validators: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            admins: admins.into_iter().collect(),
            validators: validators.into_iter().collect(),
        }
    }

    pub fn add_validator(&mut self, who: Address) {
        self.validators.insert(who);
    }

    pub fn remove_validator(&mut self, who: &Address) {
        self.validators.remove(who);
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }
}

impl AccessControl for StaticAccess {
    fn is_admin(&self, who: &Address) -> bool {
        self.admins.contains(who)
    }

    fn is_validator(&self, who: &Address) -> bool {
        self.validators.contains(who)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_roles() {
        let admin = Address::from_low_u8(1);
        let validator = Address::from_low_u8(2);
        let mut access = StaticAccess::new([admin], [validator]);

        assert!(access.is_admin(&admin));
        assert!(!access.is_validator(&admin));
        assert!(access.is_validator(&validator));
        assert!(!access.is_admin(&validator));

        access.remove_validator(&validator);
        assert!(!access.is_validator(&validator));
        assert_eq!(access.validator_count(), 0);
    }
}
