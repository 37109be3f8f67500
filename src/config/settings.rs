//! Runtime settings for the controller
//!
//! All knobs are plain values resolved once at startup from CLI flags and
//! environment variables; the rest of the crate only ever sees this struct.

use std::time::Duration;

/// Label keys, preemptible policy, and timeout budgets
#[derive(Debug, Clone)]
pub struct Settings {
    /// Label key written with the nodepool hostname prefix
    pub nodepool_label: String,

    /// Whether the preemptible label/taint lifecycle is managed
    pub preemptible: bool,

    /// Gate label a node must carry to enter preemptible handling
    pub prepare_label: String,

    /// Label key marking a node as preemptible (terminal state)
    pub preemptible_label: String,

    /// Hours after node creation before the preemptible transition fires
    pub preemptible_delay_hours: u32,

    /// Budget for one bounded cache-refresh watch pass
    pub watch_timeout: Duration,

    /// Overall budget for a single downstream node patch
    pub patch_timeout: Duration,

    /// TCP connect timeout for downstream cluster clients
    pub connect_timeout: Duration,
}

impl Settings {
    /// Delay before a prepared node may be marked preemptible
    pub fn preemptible_delay(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.preemptible_delay_hours))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nodepool_label: default_nodepool_label(),
            preemptible: false,
            prepare_label: default_prepare_label(),
            preemptible_label: default_preemptible_label(),
            preemptible_delay_hours: default_preemptible_delay_hours(),
            watch_timeout: Duration::from_secs(default_watch_timeout_secs()),
            patch_timeout: Duration::from_secs(default_patch_timeout_secs()),
            connect_timeout: Duration::from_secs(default_connect_timeout_secs()),
        }
    }
}

// Default value functions
pub fn default_nodepool_label() -> String {
    "cattle.io/nodepool".to_string()
}

pub fn default_prepare_label() -> String {
    "prepare-preemptible".to_string()
}

pub fn default_preemptible_label() -> String {
    "preemptible".to_string()
}

pub fn default_preemptible_delay_hours() -> u32 {
    23
}

pub fn default_watch_timeout_secs() -> u64 {
    10
}

pub fn default_patch_timeout_secs() -> u64 {
    30
}

pub fn default_connect_timeout_secs() -> u64 {
    5
}
