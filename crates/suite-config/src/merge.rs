//! Deep merge of TOML documents.

use toml::Value;

/// Merge `overlay` into `base` in place.
///
/// Tables merge recursively. Any other value in `overlay`, arrays included,
/// replaces the value in `base`. A user `[[task]]` list therefore replaces
/// the default list instead of appending to it.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_val) if base_val.is_table() && overlay_val.is_table() => {
                        deep_merge(base_val, overlay_val);
                    },
                    _ => {
                        base_table.insert(key, overlay_val);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}
