// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic OOM resource back-off, applied before a recovery restart
//! classified as out-of-memory.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OomPolicyConfig {
    pub enabled: bool,
    pub min_batch_size: i64,
    pub default_batch_size: i64,
    pub max_grad_accum: i64,
    pub min_seq_len: i64,
    pub batch_env_keys: Vec<String>,
    pub accum_env_keys: Vec<String>,
    pub seq_env_keys: Vec<String>,
}

/// Outcome of one OOM policy application: whether anything changed, the
/// resulting env overrides (superset of the input), and a human-readable
/// `KEY: before -> after` line per mutated key.
#[derive(Debug, Clone, Default)]
pub struct OomPolicyOutcome {
    pub applied: bool,
    pub overrides: HashMap<String, String>,
    pub log_lines: Vec<String>,
}

/// Pick the first key in `keys` that already has a value in `overrides` or
/// `env`, falling back to the list's first key if none do.
fn select_key<'a>(keys: &'a [String], overrides: &HashMap<String, String>, env: &HashMap<String, String>) -> Option<&'a str> {
    keys.iter()
        .find(|k| overrides.contains_key(k.as_str()) || env.contains_key(k.as_str()))
        .or_else(|| keys.first())
        .map(String::as_str)
}

fn current_value(key: &str, overrides: &HashMap<String, String>, env: &HashMap<String, String>, default: i64) -> i64 {
    overrides
        .get(key)
        .or_else(|| env.get(key))
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

/// Apply the batch/grad-accum/seq-len mutations against `overrides`
/// (mutated in place, starting from a copy of `env`) and return the
/// outcome.
pub fn apply_oom_policy(config: &OomPolicyConfig, env: &HashMap<String, String>, overrides: &HashMap<String, String>) -> OomPolicyOutcome {
    let mut next = overrides.clone();
    let mut log_lines = Vec::new();
    let mut applied = false;

    if let Some(key) = select_key(&config.batch_env_keys, overrides, env) {
        let current = current_value(key, overrides, env, config.default_batch_size);
        let new_val = if current <= 1 { 1 } else { (current / 2).max(config.min_batch_size) };
        if new_val != current {
            log_lines.push(format!("{key}: {current} -> {new_val}"));
            next.insert(key.to_string(), new_val.to_string());
            applied = true;
        }
    }

    if let Some(key) = select_key(&config.accum_env_keys, overrides, env) {
        let current = current_value(key, overrides, env, 1).max(1);
        let new_val = (current * 2).min(config.max_grad_accum);
        if new_val != current {
            log_lines.push(format!("{key}: {current} -> {new_val}"));
            next.insert(key.to_string(), new_val.to_string());
            applied = true;
        }
    }

    if let Some(key) = select_key(&config.seq_env_keys, overrides, env) {
        let current = current_value(key, overrides, env, 0);
        if current > 0 {
            let new_val = (((current as f64) * 0.8) as i64).max(config.min_seq_len);
            if new_val != current {
                log_lines.push(format!("{key}: {current} -> {new_val}"));
                next.insert(key.to_string(), new_val.to_string());
                applied = true;
            }
        }
    }

    OomPolicyOutcome { applied, overrides: next, log_lines }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OomPolicyConfig {
        OomPolicyConfig {
            enabled: true,
            min_batch_size: 1,
            default_batch_size: 32,
            max_grad_accum: 8,
            min_seq_len: 256,
            batch_env_keys: vec!["BATCH".to_string()],
            accum_env_keys: vec!["GRAD_ACCUM".to_string()],
            seq_env_keys: vec!["SEQ_LEN".to_string()],
        }
    }

    #[test]
    fn halves_batch_size_when_present() {
        let env = HashMap::from([("BATCH".to_string(), "32".to_string())]);
        let outcome = apply_oom_policy(&config(), &env, &HashMap::new());
        assert!(outcome.applied);
        assert_eq!(outcome.overrides.get("BATCH"), Some(&"16".to_string()));
    }

    #[test]
    fn batch_at_one_is_unchanged() {
        let env = HashMap::from([("BATCH".to_string(), "1".to_string())]);
        let outcome = apply_oom_policy(&config(), &env, &HashMap::new());
        assert_eq!(outcome.overrides.get("BATCH"), Some(&"1".to_string()));
    }

    #[test]
    fn batch_floors_at_min_batch_size() {
        let mut cfg = config();
        cfg.min_batch_size = 8;
        let env = HashMap::from([("BATCH".to_string(), "10".to_string())]);
        let outcome = apply_oom_policy(&cfg, &env, &HashMap::new());
        assert_eq!(outcome.overrides.get("BATCH"), Some(&"8".to_string()));
    }

    #[test]
    fn grad_accum_doubles_and_caps() {
        let env = HashMap::from([("GRAD_ACCUM".to_string(), "4".to_string())]);
        let outcome = apply_oom_policy(&config(), &env, &HashMap::new());
        assert_eq!(outcome.overrides.get("GRAD_ACCUM"), Some(&"8".to_string()));
    }

    #[test]
    fn grad_accum_at_cap_does_not_grow() {
        let env = HashMap::from([("GRAD_ACCUM".to_string(), "8".to_string())]);
        let outcome = apply_oom_policy(&config(), &env, &HashMap::new());
        assert_eq!(outcome.overrides.get("GRAD_ACCUM"), Some(&"8".to_string()));
    }

    #[test]
    fn seq_len_truncates_and_floors() {
        let env = HashMap::from([("SEQ_LEN".to_string(), "2048".to_string())]);
        let outcome = apply_oom_policy(&config(), &env, &HashMap::new());
        assert_eq!(outcome.overrides.get("SEQ_LEN"), Some(&"1638".to_string()));
    }

    #[test]
    fn seq_len_never_drops_below_floor() {
        let env = HashMap::from([("SEQ_LEN".to_string(), "300".to_string())]);
        let outcome = apply_oom_policy(&config(), &env, &HashMap::new());
        assert_eq!(outcome.overrides.get("SEQ_LEN"), Some(&"256".to_string()));
    }

    #[test]
    fn seq_len_skipped_when_not_positive() {
        let outcome = apply_oom_policy(&config(), &HashMap::new(), &HashMap::new());
        assert!(!outcome.overrides.contains_key("SEQ_LEN"));
    }

    #[test]
    fn applied_is_false_when_nothing_changes() {
        let env = HashMap::from([
            ("BATCH".to_string(), "1".to_string()),
            ("GRAD_ACCUM".to_string(), "8".to_string()),
        ]);
        let outcome = apply_oom_policy(&config(), &env, &HashMap::new());
        assert!(!outcome.applied);
    }
}
