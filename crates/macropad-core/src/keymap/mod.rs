//! Key name resolution.
//!
//! Config files may name a key in three ways:
//!
//! 1. A raw number (`30`).
//! 2. An alias declared in the config's `mapping` object (`"G1": 183`).
//! 3. A Linux `input-event-codes.h` name (`"KEY_A"`, `"BTN_LEFT"`).
//!
//! Config aliases are checked first, so a config may rebind a built-in name.

pub mod linux_codes;

use std::collections::HashMap;

use crate::domain::trigger::KeyId;

/// Resolves key names to [`KeyId`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyResolver {
    aliases: HashMap<String, KeyId>,
}

impl KeyResolver {
    /// Creates a resolver with the given config aliases.
    pub fn new(aliases: impl IntoIterator<Item = (String, u16)>) -> Self {
        Self {
            aliases: aliases
                .into_iter()
                .map(|(name, code)| (name, KeyId(code)))
                .collect(),
        }
    }

    /// Resolves `name` against the config aliases, then the built-in table.
    pub fn resolve(&self, name: &str) -> Option<KeyId> {
        self.aliases
            .get(name)
            .copied()
            .or_else(|| linux_codes::code_for_name(name).map(KeyId))
    }

    /// Number of config aliases.
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_config_alias() {
        let keys = KeyResolver::new([("G1".to_string(), 183)]);
        assert_eq!(keys.resolve("G1"), Some(KeyId(183)));
    }

    #[test]
    fn test_resolve_falls_back_to_builtin_names() {
        let keys = KeyResolver::default();
        assert_eq!(keys.resolve("KEY_A"), Some(KeyId(30)));
        assert_eq!(keys.resolve("BTN_LEFT"), Some(KeyId(0x110)));
    }

    #[test]
    fn test_alias_shadows_builtin_name() {
        let keys = KeyResolver::new([("KEY_A".to_string(), 48)]);
        assert_eq!(keys.resolve("KEY_A"), Some(KeyId(48)));
    }

    #[test]
    fn test_unknown_name_resolves_to_none() {
        let keys = KeyResolver::new([("G1".to_string(), 183)]);
        assert_eq!(keys.resolve("G99"), None);
        assert_eq!(keys.alias_count(), 1);
    }
}
