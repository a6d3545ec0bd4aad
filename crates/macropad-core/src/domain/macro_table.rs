//! Layers, macros, and the default-macro merge.
//!
//! The [`MacroTable`] is built once at startup and never mutated afterwards.
//! It holds the declared layers in order; the first layer is the initial
//! active layer.
//!
//! # Default macros
//!
//! The config may declare macros under the reserved `__default__` key.  They
//! are appended to every layer by [`merge_defaults`] unless the layer already
//! has a macro with the *same trigger key set* (names are not compared).  The
//! `__default__` pseudo-layer is never a layer of its own.
//!
//! # Shadowing
//!
//! Within a layer the first declared macro whose trigger is held wins.  Two
//! macros with the same trigger in one layer are legal; the later one is
//! simply unreachable.

use std::collections::BTreeSet;

use crate::domain::action::{Action, CommandSpec};
use crate::domain::trigger::{first_match, HeldKeys, KeyId, Trigger, Triggered};

/// A named trigger → action binding inside a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub trigger: Trigger,
    pub action: Action,
}

impl Triggered for Macro {
    fn trigger(&self) -> &Trigger {
        &self.trigger
    }
}

/// A switchable set of macros.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    /// Holding this trigger activates the layer.
    pub switch_trigger: Trigger,
    /// Spawned each time the layer becomes active.
    pub entry_command: Option<CommandSpec>,
    /// Resolved macro list (own declarations followed by merged defaults).
    pub macros: Vec<Macro>,
}

impl Triggered for Layer {
    fn trigger(&self) -> &Trigger {
        &self.switch_trigger
    }
}

impl Layer {
    /// First macro whose trigger is fully held, skipping `RemapButton`
    /// macros (those only respond to a single raw event code).
    pub fn match_held(&self, held: &HeldKeys) -> Option<&Macro> {
        first_match(
            held,
            self.macros
                .iter()
                .filter(|m| !matches!(m.action, Action::RemapButton(_))),
        )
    }

    /// First macro whose trigger is satisfied by `code` alone.
    pub fn match_single(&self, code: KeyId) -> Option<&Macro> {
        let single: HeldKeys = HeldKeys::from([code]);
        first_match(&single, &self.macros)
    }
}

/// Appends every default macro whose trigger is not already present.
///
/// The comparison is against the growing list, so re-merging an already
/// merged list is a no-op.
pub fn merge_defaults(defaults: &[Macro], mut layer_macros: Vec<Macro>) -> Vec<Macro> {
    for default in defaults {
        let shadowed = layer_macros.iter().any(|m| m.trigger == default.trigger);
        if !shadowed {
            layer_macros.push(default.clone());
        }
    }
    layer_macros
}

/// Error returned when constructing a table with no layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a macro table needs at least one layer")]
pub struct EmptyTable;

/// The immutable, ordered collection of layers.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroTable {
    layers: Vec<Layer>,
}

impl MacroTable {
    /// Builds a table from layers in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyTable`] if `layers` is empty.
    pub fn new(layers: Vec<Layer>) -> Result<Self, EmptyTable> {
        if layers.is_empty() {
            return Err(EmptyTable);
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Index of the initial active layer.
    pub fn initial_layer(&self) -> usize {
        0
    }

    /// The layer at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; indices come from this table.
    pub fn layer(&self, index: usize) -> &Layer {
        &self.layers[index]
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    /// Index of the first layer (across all layers) whose switch trigger is held.
    pub fn match_switch(&self, held: &HeldKeys) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.trigger().is_held(held))
    }

    /// Every key any macro in the table may emit.
    pub fn output_keys(&self) -> BTreeSet<KeyId> {
        self.layers
            .iter()
            .flat_map(|l| l.macros.iter())
            .flat_map(|m| m.action.output_keys())
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
