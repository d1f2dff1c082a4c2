//! Formatting-preserving edits of JSON locale files.

use jsonc_parser::ParseOptions;
use jsonc_parser::cst::{
    CstInputValue,
    CstObject,
    CstRootNode,
};
use thiserror::Error;

/// Reasons a locale file cannot take the requested values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum JsonEditError {
    #[error("existing content is not valid JSON")]
    Parse,
    #[error("top-level value is not an object")]
    NotAnObject,
    /// A leaf stands where a branch is needed, or the other way around
    #[error("'{key}' conflicts with an existing value of another shape")]
    Conflict { key: String },
}

/// Inserts or updates string values, creating intermediate objects as needed.
///
/// `entries` are `(key, value)` pairs. Keys are matched against existing
/// property names longest first, so a key stored flat as `"page.title"` is
/// updated in place; the unmatched remainder is split on `separator` into
/// nested properties. Existing properties keep their position and formatting.
/// An empty or whitespace-only `json_text` starts from an empty object.
///
/// Nothing is returned unless every entry applies.
pub(crate) fn upsert_keys_in_json_text(
    json_text: &str,
    entries: &[(String, String)],
    separator: &str,
) -> Result<String, JsonEditError> {
    let source = if json_text.trim().is_empty() { "{}\n" } else { json_text };
    let root = CstRootNode::parse(source, &ParseOptions::default())
        .map_err(|_| JsonEditError::Parse)?;
    let root_obj = root.object_value_or_create().ok_or(JsonEditError::NotAnObject)?;

    for (key, value) in entries {
        let parts: Vec<&str> = key.split(separator).collect();
        if !upsert_entry(&root_obj, &parts, separator, value) {
            return Err(JsonEditError::Conflict { key: key.clone() });
        }
    }

    Ok(root.to_string())
}

/// Sets `value` at `parts` below `obj`. Returns `false` on a shape conflict.
fn upsert_entry(obj: &CstObject, parts: &[&str], separator: &str, value: &str) -> bool {
    for len in (1..=parts.len()).rev() {
        let (head, rest) = parts.split_at(len);
        let name = head.join(separator);
        let Some(prop) = obj.get(&name) else {
            continue;
        };
        let child = obj.object_value(&name);
        match (rest.is_empty(), child) {
            (true, None) => {
                prop.set_value(CstInputValue::String(value.to_string()));
                return true;
            }
            (true, Some(_)) => return false,
            (false, Some(child)) => return upsert_entry(&child, rest, separator, value),
            // A leaf under a shorter name may still leave room for this key.
            (false, None) => {}
        }
    }

    let Some((last, parents)) = parts.split_last() else {
        return false;
    };
    let mut current = obj.clone();
    for part in parents {
        match current.object_value_or_create(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current.append(last, CstInputValue::String(value.to_string()));
    true
}
