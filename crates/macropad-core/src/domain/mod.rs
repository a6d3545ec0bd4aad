//! Domain layer: pure data types and rules with no OS dependencies.
//!
//! - **`event`** – The raw `(type, code, value)` input event exchanged with
//!   the kernel input subsystem.
//! - **`trigger`** – Key identifiers, trigger key sets, and the first-match
//!   rule used for both layer switching and macro dispatch.
//! - **`action`** – What a macro does once it matches.
//! - **`macro_table`** – Layers, macros, and the default-macro merge.

pub mod action;
pub mod event;
pub mod macro_table;
pub mod trigger;
