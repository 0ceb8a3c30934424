//! Grid search over strategy parameters
//!
//! Grid keys name strategy params; a dotted key (`fair_values.KELP`)
//! reaches into nested objects, creating them as needed.

use anyhow::{bail, Result};
use itertools::Itertools;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::Config;

/// One config per combination of grid values, in deterministic key order.
///
/// With no grid the base config is the only combination.
pub fn generate_grid_configs(config: &Config) -> Result<Vec<Config>> {
    let grid = match &config.grid {
        Some(g) if !g.is_empty() => g,
        _ => return Ok(vec![config.clone()]),
    };

    let keys: Vec<&String> = grid.keys().sorted().collect();
    if let Some(key) = keys.iter().find(|k| grid[**k].is_empty()) {
        bail!("grid parameter '{}' has no values", key);
    }

    keys.iter()
        .map(|k| grid[*k].iter())
        .multi_cartesian_product()
        .map(|combo| {
            let mut cfg = config.clone();
            cfg.grid = None;
            for (key, value) in keys.iter().zip(combo) {
                set_param(&mut cfg.strategy, key, value.clone())?;
            }
            Ok(cfg)
        })
        .collect()
}

/// Set `path` (dot separated) inside the strategy object
fn set_param(strategy: &mut Value, path: &str, value: Value) -> Result<()> {
    let mut node = strategy;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let Some(obj) = node.as_object_mut() else {
            bail!("cannot set '{}': '{}' is not an object", path, part);
        };
        if parts.peek().is_none() {
            obj.insert(part.to_string(), value);
            return Ok(());
        }
        node = obj
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    bail!("empty grid parameter name")
}

/// Get total number of grid combinations
pub fn total_combinations(config: &Config) -> usize {
    match &config.grid {
        Some(grid) if !grid.is_empty() => grid.values().map(Vec::len).product(),
        _ => 1,
    }
}

/// Parse CLI override into grid format
/// Format: "param=val1,val2,val3"
pub fn parse_grid_override(s: &str) -> Option<(String, Vec<Value>)> {
    let (key, raw) = s.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let values: Vec<Value> = raw
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            if let Ok(n) = v.parse::<i64>() {
                Value::from(n)
            } else if let Ok(n) = v.parse::<f64>() {
                Value::from(n)
            } else if let Ok(b) = v.parse::<bool>() {
                Value::from(b)
            } else {
                Value::from(v)
            }
        })
        .collect();

    (!values.is_empty()).then(|| (key.to_string(), values))
}

/// Apply CLI overrides to config grid
pub fn apply_overrides(config: &mut Config, overrides: &[String]) -> Result<()> {
    for override_str in overrides {
        let Some((key, values)) = parse_grid_override(override_str) else {
            bail!("invalid grid override '{}', expected param=v1,v2", override_str);
        };
        config
            .grid
            .get_or_insert_with(HashMap::new)
            .insert(key, values);
    }
    Ok(())
}

/// Flattened scalar strategy params, keyed by dotted path
pub fn extract_params(config: &Config) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    flatten("", &config.strategy, &mut params);
    params
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(obj) => {
            for (k, v) in obj {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        Value::Array(_) | Value::Null => {}
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

/// Format params for display
pub fn format_params(params: &BTreeMap<String, Value>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .join(", ")
}
