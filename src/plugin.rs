//! The plugin contract.
//!
//! Plugins intercept resolution and loading through filtered callbacks.
//! Filters are compiled regular expressions matched against the import
//! path; a namespace tag isolates plugin-owned paths from real files.

use crate::resolver::{LoadResult, ResolveResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// Arguments to an `on_resolve` callback.
#[derive(Debug, Clone)]
pub struct OnResolveArgs {
    pub path: String,
    pub importer: String,
    pub namespace: String,
}

/// Arguments to an `on_load` callback.
#[derive(Debug, Clone)]
pub struct OnLoadArgs {
    pub path: String,
    pub namespace: String,
}

pub type OnStartFn = Box<dyn Fn() -> Result<(), String> + Send + Sync>;
pub type OnResolveFn =
    Box<dyn Fn(&OnResolveArgs) -> Option<Result<ResolveResult, String>> + Send + Sync>;
pub type OnLoadFn = Box<dyn Fn(&OnLoadArgs) -> Option<Result<LoadResult, String>> + Send + Sync>;

pub struct OnResolveHook {
    pub filter: String,
    /// Empty matches every namespace.
    pub namespace: String,
    pub callback: OnResolveFn,
}

pub struct OnLoadHook {
    pub filter: String,
    pub namespace: String,
    pub callback: OnLoadFn,
}

#[derive(Default)]
pub struct Plugin {
    pub name: String,
    pub on_start: Option<OnStartFn>,
    pub on_resolve: Vec<OnResolveHook>,
    pub on_load: Vec<OnLoadHook>,
}

impl Plugin {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Plugin {
        Plugin {
            name: name.into(),
            ..Plugin::default()
        }
    }
}

/// A path as seen by plugin filters.
#[derive(Debug, Clone, Copy)]
pub struct FilterPath<'a> {
    pub text: &'a str,
    pub namespace: &'a str,
}

/// The documented applicability rule:
/// `(namespace == "" || path.namespace == namespace) && filter.matches(path.text)`.
#[must_use]
pub fn plugin_applies_to_path(path: FilterPath<'_>, filter: &str, namespace: &str) -> bool {
    if !namespace.is_empty() && path.namespace != namespace {
        return false;
    }
    match compiled_filter(filter) {
        Some(regex) => regex.is_match(path.text),
        None => false,
    }
}

/// Compiled-filter cache, guarded by a single mutex; misses allocate and
/// insert under the lock.
static FILTER_CACHE: Lazy<Mutex<FxHashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

fn compiled_filter(filter: &str) -> Option<Regex> {
    let mut cache = FILTER_CACHE.lock().unwrap();
    if let Some(entry) = cache.get(filter) {
        return entry.clone();
    }
    let compiled = Regex::new(filter).ok();
    cache.insert(filter.to_string(), compiled.clone());
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_to_path() {
        let path = FilterPath {
            text: "/src/app.css",
            namespace: "file",
        };
        assert!(plugin_applies_to_path(path, r"\.css$", ""));
        assert!(plugin_applies_to_path(path, r"\.css$", "file"));
        assert!(!plugin_applies_to_path(path, r"\.css$", "virtual"));
        assert!(!plugin_applies_to_path(path, r"\.js$", ""));
    }

    #[test]
    fn test_filter_cache_handles_invalid_regex() {
        let path = FilterPath {
            text: "x",
            namespace: "",
        };
        assert!(!plugin_applies_to_path(path, "(unclosed", ""));
        // Second query hits the cached failure
        assert!(!plugin_applies_to_path(path, "(unclosed", ""));
    }
}
