//! Layer merging over untyped TOML trees.
//!
//! Layers are merged before deserialization: a key absent from a later
//! layer keeps whatever an earlier layer put there. Every leaf that a layer
//! writes is recorded in [`FieldSources`] so `config show` can say where each
//! value came from.

use std::collections::HashMap;
use std::fmt;

use toml::Value;

/// Origin of a resolved setting, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// `~/.evidentia/config.toml`.
    User,
    /// The file given with `--config`.
    Explicit,
    /// An `EVIDENTIA_*` variable filling an otherwise default field.
    Environment,
}

impl ConfigLayer {
    /// Short label used in `config show` annotations.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Defaults => "defaults",
            Self::User => "user",
            Self::Explicit => "--config",
            Self::Environment => "env",
        }
    }
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dotted field path to the layer that last wrote it.
pub type FieldSources = HashMap<String, ConfigLayer>;

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

/// Apply `overlay` on top of `base`.
///
/// Tables are merged key by key. Any other value, arrays included, replaces
/// the base value wholesale. Only leaves present in `overlay` are attributed
/// to `layer`.
pub fn deep_merge_tracking(
    base: &mut Value,
    overlay: &Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if !(base.is_table() && overlay.is_table()) {
        *base = overlay.clone();
        record_leaves(overlay, prefix, layer, sources);
        return;
    }
    let (Some(into), Some(from)) = (base.as_table_mut(), overlay.as_table()) else {
        return;
    };

    for (key, incoming) in from {
        let path = child_path(prefix, key);
        match into.get_mut(key) {
            Some(existing) if existing.is_table() && incoming.is_table() => {
                deep_merge_tracking(existing, incoming, &path, layer, sources);
            },
            Some(existing) => {
                *existing = incoming.clone();
                record_leaves(incoming, &path, layer, sources);
            },
            None => {
                into.insert(key.clone(), incoming.clone());
                record_leaves(incoming, &path, layer, sources);
            },
        }
    }
}

/// Attribute every leaf beneath `value` to `layer`.
pub fn record_leaves(value: &Value, prefix: &str, layer: &ConfigLayer, sources: &mut FieldSources) {
    match value {
        Value::Table(table) => {
            for (key, child) in table {
                record_leaves(child, &child_path(prefix, key), layer, sources);
            }
        },
        _ => {
            sources.insert(prefix.to_owned(), *layer);
        },
    }
}
