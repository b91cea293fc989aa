use crate::error::{PipelineError, PipelineResult};
use crate::models::rules::{
    EngineConfig, RuleConfig, ValidationPolicy, DEFAULT_COMPONENT, DEFAULT_COMPONENT_PREFIXES,
    DEFAULT_HOURS_IN_MONTH, DEFAULT_MAX_REJECTION_RATE, DEFAULT_TIME_BUCKETS_HOURS,
};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

const CONFIG_SCHEMA_VERSION: i64 = 1;

/// Read and validate the rule configuration file. Any problem is fatal.
pub fn load_engine_config(path: &Path) -> PipelineResult<EngineConfig> {
    let raw = fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!("failed to read {}: {e}", path.display()))
    })?;
    let value = serde_json::from_str::<Value>(&raw).map_err(|e| {
        PipelineError::Configuration(format!("{} is not valid JSON: {e}", path.display()))
    })?;
    parse_engine_config(value)
}

pub fn parse_engine_config(input: Value) -> PipelineResult<EngineConfig> {
    let settings = migrate_config(input)?;
    let rules = settings
        .get("rules")
        .and_then(Value::as_object)
        .ok_or_else(|| config_error("rules must be an object"))?;
    let validation = settings
        .get("validation")
        .and_then(Value::as_object)
        .ok_or_else(|| config_error("validation must be an object"))?;

    let critical_labels = string_list(rules, "rules.critical_labels", "critical_labels")?;
    if critical_labels.is_empty() {
        return Err(config_error("rules.critical_labels must not be empty"));
    }

    let rules = RuleConfig {
        component_prefixes: string_list(rules, "rules.component_prefixes", "component_prefixes")?,
        critical_labels: critical_labels.into_iter().collect(),
        sla_hours_critical: positive_number(rules, "rules.sla_hours_critical", "sla_hours_critical")?,
        hours_in_month: positive_number(rules, "rules.hours_in_month", "hours_in_month")?,
        default_component: non_empty_string(rules, "rules.default_component", "default_component")?,
        time_buckets_hours: positive_number_list(rules, "rules.time_buckets_hours", "time_buckets_hours")?,
    };

    let max_rejection_rate = validation
        .get("max_rejection_rate")
        .and_then(Value::as_f64)
        .filter(|rate| (0.0..=1.0).contains(rate))
        .ok_or_else(|| config_error("validation.max_rejection_rate must be a number between 0 and 1"))?;

    Ok(EngineConfig {
        rules,
        validation: ValidationPolicy { max_rejection_rate },
    })
}

/// Write a config file in the current layout.
pub fn save_engine_config(path: &Path, config: &EngineConfig) -> PipelineResult<()> {
    let value = json!({
        "schema_version": CONFIG_SCHEMA_VERSION,
        "rules": config.rules,
        "validation": config.validation,
    });
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

fn migrate_config(input: Value) -> PipelineResult<Value> {
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => return Err(config_error("configuration root must be a JSON object")),
    };

    let version = out
        .get("schema_version")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if version > CONFIG_SCHEMA_VERSION {
        return Err(config_error(&format!(
            "schema_version {version} is newer than supported version {CONFIG_SCHEMA_VERSION}"
        )));
    }

    if version < 1 {
        migrate_lakehouse_rules(&mut out);
    }

    deep_merge_defaults(&mut out, &default_config());
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(CONFIG_SCHEMA_VERSION));
    }

    Ok(out)
}

/// Optional keys only: critical labels and the SLA have no sensible default.
fn default_config() -> Value {
    json!({
        "schema_version": CONFIG_SCHEMA_VERSION,
        "rules": {
            "component_prefixes": DEFAULT_COMPONENT_PREFIXES,
            "hours_in_month": DEFAULT_HOURS_IN_MONTH,
            "default_component": DEFAULT_COMPONENT,
            "time_buckets_hours": DEFAULT_TIME_BUCKETS_HOURS,
        },
        "validation": {
            "max_rejection_rate": DEFAULT_MAX_REJECTION_RATE,
        }
    })
}

/// Version 0 configs nest prefixes under `rules.component` and keep the
/// critical rules inside per-severity maps.
fn migrate_lakehouse_rules(settings: &mut Value) {
    let Some(rules) = settings.get_mut("rules").and_then(Value::as_object_mut) else {
        return;
    };

    if let Some(Value::Object(component)) = rules.remove("component") {
        if let Some(prefixes) = component.get("prefixes") {
            rules
                .entry("component_prefixes".to_string())
                .or_insert_with(|| prefixes.clone());
        }
    }

    if let Some(Value::Object(severity)) = rules.remove("severity_labels") {
        if let Some(critical) = severity.get("critical") {
            rules
                .entry("critical_labels".to_string())
                .or_insert_with(|| critical.clone());
        }
    }

    if let Some(Value::Object(sla)) = rules.remove("sla_hours_by_severity") {
        if let Some(critical) = sla.get("critical") {
            rules
                .entry("sla_hours_critical".to_string())
                .or_insert_with(|| critical.clone());
        }
    }
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn string_list(map: &Map<String, Value>, name: &str, key: &str) -> PipelineResult<Vec<String>> {
    let items = map
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| config_error(&format!("{name} must be a list of strings")))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| config_error(&format!("{name} entries must be non-empty strings")))
        })
        .collect()
}

fn positive_number(map: &Map<String, Value>, name: &str, key: &str) -> PipelineResult<f64> {
    map.get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| config_error(&format!("{name} must be a positive number")))
}

fn positive_number_list(map: &Map<String, Value>, name: &str, key: &str) -> PipelineResult<Vec<f64>> {
    let items = map
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| config_error(&format!("{name} must be a list of numbers")))?;

    items
        .iter()
        .map(|item| {
            item.as_f64()
                .filter(|v| v.is_finite() && *v > 0.0)
                .ok_or_else(|| config_error(&format!("{name} entries must be positive numbers")))
        })
        .collect()
}

fn non_empty_string(map: &Map<String, Value>, name: &str, key: &str) -> PipelineResult<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| config_error(&format!("{name} must be a non-empty string")))
}

fn config_error(message: &str) -> PipelineError {
    PipelineError::Configuration(message.to_string())
}
