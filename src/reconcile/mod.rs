//! Node reconciliation
//!
//! Split into a pure decision layer (`decision`, `preemptible`) computed from
//! one node observation plus the cache snapshots, and an executor (`node`)
//! that routes the resulting patch to the owning downstream cluster.

pub mod decision;
pub mod node;
pub mod preemptible;

pub use decision::{Decision, decide, patch_body};
pub use node::{NodeReconciler, Outcome, run_node_stream};
pub use preemptible::PreemptibleState;
