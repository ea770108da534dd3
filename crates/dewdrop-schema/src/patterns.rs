//! Compiled-once regular expressions for naming and default-literal heuristics.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Thread-safe cache of compiled patterns.
struct RegexCache {
    cache: RwLock<HashMap<&'static str, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &'static str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(pattern, regex.clone());
        }
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Compile (or fetch) a pattern. Invalid patterns are logged and yield `None`.
pub(crate) fn compiled(pattern: &'static str) -> Option<Regex> {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(pattern = pattern, error = %e, "Invalid heuristic pattern, skipping");
            None
        }
    }
}

/// Whether `value` matches `pattern`.
pub(crate) fn is_match(value: &str, pattern: &'static str) -> bool {
    compiled(pattern).is_some_and(|re| re.is_match(value))
}

/// First capture group of `pattern` in `value`.
pub(crate) fn capture(value: &str, pattern: &'static str) -> Option<String> {
    let re = compiled(pattern)?;
    let caps = re.captures(value)?;
    caps.get(1).map(|m| m.as_str().to_string())
}
