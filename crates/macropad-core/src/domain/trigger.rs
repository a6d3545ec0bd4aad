//! Key identifiers, triggers, and the first-match rule.
//!
//! A [`Trigger`] is a non-empty *set* of keys.  It is "held" when every one of
//! its keys is currently down; extra held keys are ignored.  Candidates (layer
//! switch triggers or macros) are checked in declaration order and the first
//! held one wins, see [`first_match`].
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use macropad_core::{KeyId, Trigger};
//!
//! // KEY_LEFTCTRL (29) + KEY_C (46)
//! let copy = Trigger::new([KeyId(29), KeyId(46)]).unwrap();
//!
//! let held: HashSet<KeyId> = [KeyId(29), KeyId(46), KeyId(42)].into_iter().collect();
//! assert!(copy.is_held(&held));
//!
//! let only_ctrl: HashSet<KeyId> = [KeyId(29)].into_iter().collect();
//! assert!(!copy.is_held(&only_ctrl));
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// A physical key, identified by its Linux input event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u16);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of keys the device currently reports as down.
pub type HeldKeys = HashSet<KeyId>;

/// A non-empty, order-independent set of keys that must all be held.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trigger {
    keys: BTreeSet<KeyId>,
}

impl Trigger {
    /// Builds a trigger from the given keys.
    ///
    /// Returns `None` when `keys` is empty: an empty trigger would be held
    /// at all times and is never a valid configuration.
    pub fn new(keys: impl IntoIterator<Item = KeyId>) -> Option<Self> {
        let keys: BTreeSet<KeyId> = keys.into_iter().collect();
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    /// A trigger consisting of exactly one key.
    pub fn single(key: KeyId) -> Self {
        Self {
            keys: BTreeSet::from([key]),
        }
    }

    /// Iterates the trigger's keys in ascending code order.
    pub fn keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.keys.iter().copied()
    }

    /// Returns `true` if every key of the trigger is in `held`.
    pub fn is_held(&self, held: &HeldKeys) -> bool {
        self.keys.iter().all(|k| held.contains(k))
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.keys.iter().map(|k| k.to_string()).collect();
        write!(f, "[{}]", parts.join("+"))
    }
}

/// Anything that can be selected by a trigger: macros and layers.
pub trait Triggered {
    fn trigger(&self) -> &Trigger;
}

/// Returns the first candidate, in iteration order, whose trigger is held.
pub fn first_match<'a, T, I>(held: &HeldKeys, candidates: I) -> Option<&'a T>
where
    T: Triggered + 'a,
    I: IntoIterator<Item = &'a T>,
{
    candidates
        .into_iter()
        .find(|candidate| candidate.trigger().is_held(held))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
