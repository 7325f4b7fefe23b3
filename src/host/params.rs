//! Parameter helpers: JSON attribute values, merging and `hx-params` filtering.

use serde_json::Value;

use super::Parameters;

/// Parse an attribute holding a JSON object (`hx-vals`, `hx-headers`).
///
/// Malformed values and script-evaluated values are logged and ignored.
pub fn parse_json_object(raw: &str, attribute: &str) -> Option<Parameters> {
    let raw = raw.trim();
    if raw.starts_with("js:") || raw.starts_with("javascript:") {
        tracing::warn!(attribute, "script-evaluated values are not supported");
        return None;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::warn!(attribute, "expected a JSON object");
            None
        }
        Err(e) => {
            tracing::warn!(attribute, error = %e, "malformed JSON attribute");
            None
        }
    }
}

/// Merge `overrides` into `base`; keys in `overrides` win.
pub fn merge_parameters(mut base: Parameters, overrides: Parameters) -> Parameters {
    for (key, value) in overrides {
        base.insert(key, value);
    }
    base
}

/// Add a form value, turning repeated names into arrays.
pub fn add_value(params: &mut Parameters, name: &str, value: Value) {
    match params.get_mut(name) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            params.insert(name.to_string(), value);
        }
    }
}

/// Parameter filter declared with `hx-params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamsFilter {
    All,
    None,
    Not(Vec<String>),
    Only(Vec<String>),
}

impl ParamsFilter {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value {
            "" | "*" => Self::All,
            "none" => Self::None,
            _ => match value.strip_prefix("not ") {
                Some(rest) => Self::Not(split_names(rest)),
                None => Self::Only(split_names(value)),
            },
        }
    }

    pub fn apply(&self, params: Parameters) -> Parameters {
        match self {
            Self::All => params,
            Self::None => Parameters::new(),
            Self::Not(names) => params
                .into_iter()
                .filter(|(k, _)| !names.contains(k))
                .collect(),
            Self::Only(names) => params
                .into_iter()
                .filter(|(k, _)| names.contains(k))
                .collect(),
        }
    }
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
