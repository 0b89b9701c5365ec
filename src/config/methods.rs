//! Validation, pattern compilation and partial updates for `CrawlConfig`.

use serde_json::Value;

use super::types::CrawlConfig;
use crate::crawl_engine::crawl_types::CrawlError;

/// Sentinel requests/sec when `delay == 0`: still smooth, effectively
/// unthrottled, and callers may skip the rate gate entirely.
pub const FAST_PATH_RPS: f64 = 100.0;

impl CrawlConfig {
    /// Check every bound the engine accepts and compile the URL patterns.
    /// Called on every snapshot and after every patch.
    pub fn validate(&mut self) -> Result<(), CrawlError> {
        fn bound<T: PartialOrd + std::fmt::Display>(
            name: &str,
            value: T,
            min: T,
            max: T,
        ) -> Result<(), CrawlError> {
            if value < min || value > max {
                return Err(CrawlError::Config(format!(
                    "{name} must be between {min} and {max}, got {value}"
                )));
            }
            Ok(())
        }

        // Depth 0 is the single-page mode the orchestrator selects for
        // seeds with a path; API consumers normally pass 1..=10.
        bound("max_depth", self.max_depth, 0, 10)?;
        bound("max_urls", self.max_urls, 1, 5_000_000)?;
        bound("delay", self.delay, 0.0, 60.0)?;
        bound("timeout", self.timeout, 1, 120)?;
        bound("retries", self.retries, 0, 10)?;
        bound(
            "max_file_size",
            self.max_file_size,
            1,
            1000 * 1024 * 1024,
        )?;
        bound("concurrency", self.concurrency, 1, 50)?;
        bound(
            "memory_limit",
            self.memory_limit,
            64 * 1024 * 1024,
            4096 * 1024 * 1024,
        )?;
        bound("js_wait_time", self.js_wait_time, 0, 30)?;
        bound("js_timeout", self.js_timeout, 5, 120)?;
        bound(
            "js_max_concurrent_pages",
            self.js_max_concurrent_pages,
            1,
            10,
        )?;
        bound(
            "duplication_threshold",
            self.duplication_threshold,
            0.0,
            1.0,
        )?;

        if self.enable_proxy && self.proxy_url.as_deref().unwrap_or("").is_empty() {
            return Err(CrawlError::Config(
                "enable_proxy requires proxy_url".to_string(),
            ));
        }

        self.compile_patterns()?;
        Ok(())
    }

    /// Pre-compile include/exclude regexes so filtering never compiles in
    /// the hot path. Invalid patterns are a configuration error.
    pub fn compile_patterns(&mut self) -> Result<(), CrawlError> {
        fn compile(patterns: &[String]) -> Result<Vec<regex::Regex>, CrawlError> {
            patterns
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| {
                    regex::Regex::new(p)
                        .map_err(|e| CrawlError::Config(format!("invalid pattern {p:?}: {e}")))
                })
                .collect()
        }

        self.include_patterns_compiled = compile(&self.include_patterns)?;
        self.exclude_patterns_compiled = compile(&self.exclude_patterns)?;
        Ok(())
    }

    #[must_use]
    pub fn include_patterns_compiled(&self) -> &[regex::Regex] {
        &self.include_patterns_compiled
    }

    #[must_use]
    pub fn exclude_patterns_compiled(&self) -> &[regex::Regex] {
        &self.exclude_patterns_compiled
    }

    /// Requests per second derived from the configured delay.
    #[must_use]
    pub fn requests_per_second(&self) -> f64 {
        if self.delay > 0.0 {
            1.0 / self.delay
        } else {
            FAST_PATH_RPS
        }
    }

    /// Whether callers may bypass the rate gate entirely.
    #[must_use]
    pub fn is_fast_path(&self) -> bool {
        self.delay <= 0.0
    }

    /// Merge a JSON partial over this config, then re-validate.
    ///
    /// Unknown keys are rejected so typos surface instead of silently doing
    /// nothing. On any error the config is left unchanged.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<(), CrawlError> {
        let Value::Object(fields) = patch else {
            return Err(CrawlError::Config(
                "config update must be a JSON object".to_string(),
            ));
        };

        let mut merged = serde_json::to_value(&*self)
            .map_err(|e| CrawlError::Config(format!("serialize config: {e}")))?;
        let Value::Object(target) = &mut merged else {
            return Err(CrawlError::Config("config is not an object".to_string()));
        };

        for (key, value) in fields {
            if !target.contains_key(key) {
                return Err(CrawlError::Config(format!("unknown config key {key:?}")));
            }
            target.insert(key.clone(), value.clone());
        }

        let mut updated: CrawlConfig = serde_json::from_value(merged)
            .map_err(|e| CrawlError::Config(format!("invalid config value: {e}")))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let mut config = CrawlConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.requests_per_second() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_delay_selects_fast_path() {
        let mut config = CrawlConfig {
            delay: 0.0,
            ..CrawlConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_fast_path());
        assert!((config.requests_per_second() - FAST_PATH_RPS).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_bounds_depth_rejected() {
        let mut config = CrawlConfig {
            max_depth: 11,
            ..CrawlConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn patch_merges_and_revalidates() {
        let mut config = CrawlConfig::default();
        config
            .apply_patch(&serde_json::json!({"max_depth": 5, "delay": 0.5}))
            .unwrap();
        assert_eq!(config.max_depth, 5);
        assert!((config.delay - 0.5).abs() < f64::EPSILON);

        let err = config.apply_patch(&serde_json::json!({"max_depth": 99}));
        assert!(err.is_err());
        assert_eq!(config.max_depth, 5);
    }

    #[test]
    fn patch_rejects_unknown_keys() {
        let mut config = CrawlConfig::default();
        assert!(config.apply_patch(&serde_json::json!({"max_dpeth": 5})).is_err());
    }

    #[test]
    fn invalid_exclude_pattern_rejected() {
        let mut config = CrawlConfig {
            exclude_patterns: vec!["(unclosed".to_string()],
            ..CrawlConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
