//! Centralized configuration for the snapshot manager.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - SnapConfig::from_env() reads QS_* variables; builder-style setters override them.
//!
//! Tunables:
//! - auto_cleanup (ENV QS_AUTO_CLEANUP): run cleanup right after the committed snapshot advances.
//! - allow_overwrite (ENV QS_ALLOW_OVERWRITE): insert_snapshot may replace an existing key.
//!   Default false: an existing key is rejected with SnapError::SnapshotExists.
//! - wait_timeout_ms (ENV QS_WAIT_TIMEOUT_MS): upper bound for WriteUnit::wait_for_turn
//!   (0 = wait forever).

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapConfig {
    /// Run cleanup_unneeded_snapshots() after every advancing set_committed_snapshot().
    /// Env: QS_AUTO_CLEANUP (default false)
    pub auto_cleanup: bool,

    /// Permit insert_snapshot() to replace an already registered timestamp.
    /// Env: QS_ALLOW_OVERWRITE (default false)
    pub allow_overwrite: bool,

    /// Wait bound (ms) for a write unit waiting for its commit turn; 0 disables the bound.
    /// Env: QS_WAIT_TIMEOUT_MS (default 0)
    pub wait_timeout_ms: u64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            auto_cleanup: false,
            allow_overwrite: false,
            wait_timeout_ms: 0,
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let s = v.trim().to_ascii_lowercase();
        s == "1" || s == "true" || s == "yes" || s == "on"
    })
}

impl SnapConfig {
    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(on) = env_bool("QS_AUTO_CLEANUP") {
            cfg.auto_cleanup = on;
        }
        if let Some(on) = env_bool("QS_ALLOW_OVERWRITE") {
            cfg.allow_overwrite = on;
        }
        if let Ok(v) = std::env::var("QS_WAIT_TIMEOUT_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.wait_timeout_ms = n;
            }
        }

        cfg
    }

    pub fn with_auto_cleanup(mut self, on: bool) -> Self {
        self.auto_cleanup = on;
        self
    }

    pub fn with_allow_overwrite(mut self, on: bool) -> Self {
        self.allow_overwrite = on;
        self
    }

    pub fn with_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.wait_timeout_ms = ms;
        self
    }

    /// Wait bound as a Duration (None when unbounded).
    pub fn wait_timeout(&self) -> Option<std::time::Duration> {
        if self.wait_timeout_ms == 0 {
            None
        } else {
            Some(std::time::Duration::from_millis(self.wait_timeout_ms))
        }
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for SnapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SnapConfig {{ auto_cleanup: {}, allow_overwrite: {}, wait_timeout_ms: {} }}",
            self.auto_cleanup,
            self.allow_overwrite,
            if self.wait_timeout_ms == 0 {
                "unbounded".to_string()
            } else {
                self.wait_timeout_ms.to_string()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reject_overwrite_and_wait_forever() {
        let cfg = SnapConfig::default();
        assert!(!cfg.allow_overwrite);
        assert!(!cfg.auto_cleanup);
        assert!(cfg.wait_timeout().is_none());
    }

    #[test]
    fn builder_overrides() {
        let cfg = SnapConfig::default()
            .with_auto_cleanup(true)
            .with_allow_overwrite(true)
            .with_wait_timeout_ms(250)
            .build();
        assert!(cfg.auto_cleanup && cfg.allow_overwrite);
        assert_eq!(cfg.wait_timeout(), Some(std::time::Duration::from_millis(250)));
        assert!(cfg.to_string().contains("wait_timeout_ms: 250"));
    }
}
