//! Validation of the positional `layers` / `macros` declarations.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::{ConfigError, RawConfig};
use crate::domain::action::{Action, ButtonMap, ComboStep, CommandSpec};
use crate::domain::macro_table::{merge_defaults, Layer, Macro, MacroTable};
use crate::domain::trigger::{KeyId, Trigger};
use crate::keymap::KeyResolver;

/// Reserved `macros` key whose entries are merged into every layer.
pub const DEFAULT_LAYER_KEY: &str = "__default__";

/// Builds the merged, validated [`MacroTable`] from a raw config.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found.  Layers are checked in
/// declaration order, then macro lists, then entries within each list.
pub fn build_macro_table(raw: &RawConfig, keys: &KeyResolver) -> Result<MacroTable, ConfigError> {
    if raw.layers.is_empty() {
        return Err(ConfigError::NoLayers);
    }
    debug!("{} key alias(es) from mapping", keys.alias_count());

    let mut headers = Vec::with_capacity(raw.layers.len());
    let mut seen = HashSet::new();
    for (index, entry) in raw.layers.iter().enumerate() {
        let header = parse_layer(entry, keys)
            .map_err(|reason| ConfigError::MalformedLayer { index, reason })?;
        if !seen.insert(header.name.clone()) {
            return Err(ConfigError::DuplicateLayer(header.name));
        }
        headers.push(header);
    }

    if let Some(name) = raw
        .macros
        .keys()
        .find(|name| name.as_str() != DEFAULT_LAYER_KEY && !seen.contains(name.as_str()))
    {
        return Err(ConfigError::UnknownLayer(name.clone()));
    }

    let defaults = match raw.macros.get(DEFAULT_LAYER_KEY) {
        Some(entries) => parse_macro_list(DEFAULT_LAYER_KEY, entries, keys)?,
        None => Vec::new(),
    };

    let mut layers = Vec::with_capacity(headers.len());
    for header in headers {
        let own = match raw.macros.get(&header.name) {
            Some(entries) => parse_macro_list(&header.name, entries, keys)?,
            None => Vec::new(),
        };
        let macros = merge_defaults(&defaults, own);
        warn_duplicate_names(&header.name, &macros);
        debug!(
            "layer {}: switch {} with {} macro(s)",
            header.name,
            header.switch_trigger,
            macros.len()
        );
        layers.push(Layer {
            name: header.name,
            switch_trigger: header.switch_trigger,
            entry_command: header.entry_command,
            macros,
        });
    }

    MacroTable::new(layers).map_err(|_| ConfigError::NoLayers)
}

struct LayerHeader {
    name: String,
    switch_trigger: Trigger,
    entry_command: Option<CommandSpec>,
}

fn parse_layer(entry: &Value, keys: &KeyResolver) -> Result<LayerHeader, String> {
    let fields = entry
        .as_array()
        .ok_or_else(|| "expected [name, keys, command?]".to_string())?;
    if !(2..=3).contains(&fields.len()) {
        return Err(format!("expected 2 or 3 fields, found {}", fields.len()));
    }

    let name = fields[0]
        .as_str()
        .ok_or_else(|| "layer name must be a string".to_string())?
        .to_string();
    if name == DEFAULT_LAYER_KEY {
        return Err(format!("{DEFAULT_LAYER_KEY} is reserved"));
    }
    let switch_trigger = parse_trigger(&fields[1], keys)?;
    let entry_command = match fields.get(2) {
        None | Some(Value::Null) => None,
        Some(cmd) => Some(parse_command(cmd)?),
    };

    Ok(LayerHeader {
        name,
        switch_trigger,
        entry_command,
    })
}

fn parse_macro_list(
    layer: &str,
    entries: &[Value],
    keys: &KeyResolver,
) -> Result<Vec<Macro>, ConfigError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_macro(entry, keys).map_err(|reason| ConfigError::MalformedMacro {
                layer: layer.to_string(),
                index,
                reason,
            })
        })
        .collect()
}

fn parse_macro(entry: &Value, keys: &KeyResolver) -> Result<Macro, String> {
    let fields = entry
        .as_array()
        .ok_or_else(|| "expected [name, keys, type, payload]".to_string())?;
    if !(3..=4).contains(&fields.len()) {
        return Err(format!("expected 3 or 4 fields, found {}", fields.len()));
    }

    let name = fields[0]
        .as_str()
        .ok_or_else(|| "macro name must be a string".to_string())?
        .to_string();
    let trigger = parse_trigger(&fields[1], keys).map_err(|e| format!("{name}: {e}"))?;
    let tag = fields[2]
        .as_str()
        .ok_or_else(|| format!("{name}: action type must be a string"))?;
    let payload = fields.get(3);

    let action = parse_action(tag, payload, keys).map_err(|e| format!("{name}: {e}"))?;
    Ok(Macro {
        name,
        trigger,
        action,
    })
}

fn parse_action(tag: &str, payload: Option<&Value>, keys: &KeyResolver) -> Result<Action, String> {
    if tag == "dispose" {
        return Ok(Action::Dispose);
    }
    let payload = payload.ok_or_else(|| format!("{tag:?} needs a payload"))?;

    match tag {
        "key" => {
            let key = match payload {
                Value::Array(items) if items.len() == 1 => parse_key(&items[0], keys)?,
                Value::Array(items) => {
                    return Err(format!("\"key\" takes exactly one key, found {}", items.len()))
                }
                single => parse_key(single, keys)?,
            };
            Ok(Action::KeyTap(key))
        }
        "keylist" => {
            let items = non_empty_array(payload, "\"keylist\"")?;
            let keys = items
                .iter()
                .map(|item| parse_key(item, keys))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Action::KeyTapSequence(keys))
        }
        "keycomb" => {
            let items = non_empty_array(payload, "\"keycomb\"")?;
            let steps = items
                .iter()
                .map(|item| parse_combo_step(item, keys))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Action::KeyCombo(steps))
        }
        "button" => {
            let object = payload
                .as_object()
                .ok_or_else(|| "\"button\" payload must map event values to keys".to_string())?;
            let mut by_value = BTreeMap::new();
            for (value, key) in object {
                let value: i32 = value
                    .parse()
                    .map_err(|_| format!("button event value {value:?} is not an integer"))?;
                by_value.insert(value, parse_key(key, keys)?);
            }
            Ok(Action::RemapButton(ButtonMap::new(by_value)))
        }
        "cmd" => Ok(Action::RunCommand(parse_command(payload)?)),
        other => Err(format!("unknown action type {other:?}")),
    }
}

fn parse_combo_step(item: &Value, keys: &KeyResolver) -> Result<ComboStep, String> {
    match item {
        Value::Number(n) => {
            if let Some(code) = n.as_i64() {
                let key = key_from_i64(code.abs())?;
                Ok(if code > 0 {
                    ComboStep::Down(key)
                } else {
                    ComboStep::Up(key)
                })
            } else {
                let seconds = n
                    .as_f64()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .ok_or_else(|| format!("invalid pause {n}"))?;
                let pause = Duration::try_from_secs_f64(seconds)
                    .map_err(|e| format!("invalid pause {n}: {e}"))?;
                Ok(ComboStep::Sleep(pause))
            }
        }
        Value::String(name) => match name.strip_prefix('-') {
            Some(released) => Ok(ComboStep::Up(resolve_name(released, keys)?)),
            None => Ok(ComboStep::Down(resolve_name(name, keys)?)),
        },
        Value::Array(group) => {
            let keys = group
                .iter()
                .map(|k| parse_key(k, keys))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ComboStep::Tap(keys))
        }
        other => Err(format!("invalid keycomb step {other}")),
    }
}

fn parse_trigger(value: &Value, keys: &KeyResolver) -> Result<Trigger, String> {
    let items = value
        .as_array()
        .ok_or_else(|| "trigger must be a list of keys".to_string())?;
    let parsed = items
        .iter()
        .map(|item| parse_key(item, keys))
        .collect::<Result<Vec<_>, _>>()?;
    Trigger::new(parsed).ok_or_else(|| "trigger must not be empty".to_string())
}

fn parse_key(value: &Value, keys: &KeyResolver) -> Result<KeyId, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("key code {n} is not an integer"))
            .and_then(key_from_i64),
        Value::String(name) => resolve_name(name, keys),
        other => Err(format!("invalid key {other}")),
    }
}

fn resolve_name(name: &str, keys: &KeyResolver) -> Result<KeyId, String> {
    keys.resolve(name)
        .ok_or_else(|| format!("unknown key name {name:?}"))
}

fn key_from_i64(code: i64) -> Result<KeyId, String> {
    u16::try_from(code)
        .ok()
        .filter(|&c| c > 0)
        .map(KeyId)
        .ok_or_else(|| format!("key code {code} is out of range"))
}

fn parse_command(value: &Value) -> Result<CommandSpec, String> {
    match value {
        Value::String(program) if !program.is_empty() => Ok(CommandSpec::Program(program.clone())),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("command argument {item} is not a string"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(CommandSpec::Argv),
        _ => Err("command must be a non-empty string or list of strings".to_string()),
    }
}

fn non_empty_array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, String> {
    match value.as_array() {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(format!("{what} payload must be a non-empty list")),
    }
}

fn warn_duplicate_names(layer: &str, macros: &[Macro]) {
    let mut names = HashSet::new();
    for m in macros {
        if !names.insert(m.name.as_str()) {
            warn!("layer {layer}: macro name {:?} is used more than once", m.name);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
