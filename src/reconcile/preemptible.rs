//! Preemptible node lifecycle
//!
//! Nodes flagged with the prepare-marker label are promoted to preemptible
//! once a configured delay has elapsed since their creation. The delay gives
//! external provisioning and drain workflows time to finish before the taint
//! starts repelling new workloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::Settings;

/// Where a node stands in the preemptible lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreemptibleState {
    /// No prepare-marker label; preemptible handling does not apply
    Ineligible,
    /// Marker present, preemptible label not yet set; waiting out the delay
    AwaitingDelay,
    /// Preemptible label present; terminal, no further writes
    Preempted,
}

/// Classify a node's lifecycle state from its current labels
pub fn classify(labels: &BTreeMap<String, String>, settings: &Settings) -> PreemptibleState {
    if labels.contains_key(&settings.preemptible_label) {
        PreemptibleState::Preempted
    } else if labels.contains_key(&settings.prepare_label) {
        PreemptibleState::AwaitingDelay
    } else {
        PreemptibleState::Ineligible
    }
}

/// Whether the delay since node creation has fully elapsed
///
/// A node without a creation timestamp never becomes due.
pub fn transition_due(
    created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    delay: Duration,
) -> bool {
    match created_at {
        Some(created) => now >= created + delay,
        None => false,
    }
}

/// The NoSchedule taint written by the preemptible transition
#[derive(Clone, Debug, PartialEq)]
pub struct PreemptionTaint {
    /// Timestamp-derived key, fresh per patch
    pub key: String,
    /// Marks the taint as the preemption taint
    pub value: String,
    /// Always NoSchedule
    pub effect: String,
}

/// Build the taint for a transition happening at `now`
///
/// The key is derived from the patch-time timestamp, so every transition
/// writes a distinct key rather than reusing a fixed one.
pub fn preemption_taint(settings: &Settings, now: DateTime<Utc>) -> PreemptionTaint {
    PreemptionTaint {
        key: now.timestamp().to_string(),
        value: settings.preemptible_label.clone(),
        effect: "NoSchedule".to_string(),
    }
}
