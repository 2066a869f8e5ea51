use crate::timing::source::{FileTimingSource, HttpTimingSource, TimingSource};
use crate::timing::store::TimingIndex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where timing tables come from and how long to wait for them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// HTTP base serving `{segment}.json`; preferred over `dir` when set
    pub base_url: Option<String>,

    /// Local directory holding `{segment}.json`
    pub dir: Option<PathBuf>,

    pub fetch_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            dir: Some(PathBuf::from("timing")),
            fetch_timeout_ms: 3000,
        }
    }
}

impl TimingConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_url = None;
        self.dir = Some(dir.into());
        self
    }

    pub fn source(&self) -> Result<Arc<dyn TimingSource>, String> {
        match (&self.base_url, &self.dir) {
            (Some(url), _) => Ok(Arc::new(HttpTimingSource::new(url.clone()))),
            (None, Some(dir)) => Ok(Arc::new(FileTimingSource::new(dir.clone()))),
            (None, None) => Err("Timing needs either base_url or dir".to_string()),
        }
    }

    /// Build an empty index over the configured source
    pub fn build_index(&self) -> Result<TimingIndex, String> {
        Ok(TimingIndex::with_timeout(self.source()?, self.fetch_timeout()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Timing base URL must be http(s): {}", url));
            }
        }
        if self.fetch_timeout_ms == 0 {
            return Err("Timing fetch timeout must be greater than 0".to_string());
        }
        self.source().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_directory() {
        let config = TimingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_requires_a_source() {
        let config = TimingConfig {
            base_url: None,
            dir: None,
            fetch_timeout_ms: 100,
        };
        assert!(config.validate().is_err());
        assert!(config.build_index().is_err());
    }

    #[test]
    fn test_rejects_non_http_base() {
        let config = TimingConfig::default().with_base_url("ftp://host/timing");
        assert!(config.validate().is_err());
        let config = TimingConfig::default().with_base_url("https://cdn.example/timing");
        assert!(config.validate().is_ok());
    }
}
