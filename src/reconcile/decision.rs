//! Pure reconciliation decisions
//!
//! `decide` is referentially transparent: the same observation, cached
//! prefix, settings, and instant always produce the same decision, which is
//! what makes watch redelivery harmless.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::config::Settings;
use crate::hub::resources::NodeObservation;
use crate::reconcile::preemptible::{
    self, PreemptibleState, PreemptionTaint, classify, transition_due,
};

/// What, if anything, needs to be written to the downstream node
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Labels already match policy; write nothing
    NoOp,
    /// Set the nodepool label to the given value
    SetNodepoolLabel(String),
    /// Set nodepool and preemptible labels and add the preemption taint
    SetPreemptibleLabelAndTaint {
        /// Nodepool label value
        value: String,
        /// The taint to add
        taint: PreemptionTaint,
    },
}

/// Decide what a node needs, given the prefix its pool resolves to
pub fn decide(
    obs: &NodeObservation,
    target_prefix: &str,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Decision {
    if settings.preemptible {
        match classify(&obs.existing_labels, settings) {
            // Terminal: the transition already wrote everything this
            // controller manages for the node
            PreemptibleState::Preempted => return Decision::NoOp,
            PreemptibleState::AwaitingDelay => {
                if transition_due(obs.created_at, now, settings.preemptible_delay()) {
                    return Decision::SetPreemptibleLabelAndTaint {
                        value: target_prefix.to_string(),
                        taint: preemptible::preemption_taint(settings, now),
                    };
                }
                // Not due yet: only the ordinary nodepool check applies
            }
            PreemptibleState::Ineligible => {}
        }
    }

    let current = obs.existing_labels.get(&settings.nodepool_label);
    if current.map(String::as_str) == Some(target_prefix) {
        Decision::NoOp
    } else {
        Decision::SetNodepoolLabel(target_prefix.to_string())
    }
}

/// Render the merge-patch document for a decision
///
/// Returns None for `NoOp`, so callers cannot accidentally patch a node that
/// already matches policy.
pub fn patch_body(decision: &Decision, settings: &Settings) -> Option<Value> {
    match decision {
        Decision::NoOp => None,
        Decision::SetNodepoolLabel(value) => {
            let mut labels = serde_json::Map::new();
            labels.insert(settings.nodepool_label.clone(), json!(value));
            Some(json!({ "metadata": { "labels": labels } }))
        }
        Decision::SetPreemptibleLabelAndTaint { value, taint } => {
            let mut labels = serde_json::Map::new();
            labels.insert(settings.nodepool_label.clone(), json!(value));
            labels.insert(settings.preemptible_label.clone(), json!("true"));
            Some(json!({
                "metadata": { "labels": labels },
                "spec": {
                    "taints": [{
                        "key": taint.key,
                        "value": taint.value,
                        "effect": taint.effect,
                    }]
                }
            }))
        }
    }
}
