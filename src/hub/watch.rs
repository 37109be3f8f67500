//! Bounded watch passes over hub resources
//!
//! A cache refresh is one watch subscription held open until a fixed budget
//! elapses. The watcher's initial list phase delivers the current inventory
//! as apply events, so everything that exists is observed at least once per
//! pass; whatever changes during the remainder of the budget is folded in as
//! it arrives.

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use kube::Resource;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::warn;

/// A single observation made during a bounded pass
pub enum PassEvent<K> {
    /// Resource exists (initial listing or add/modify during the pass)
    Applied(K),
    /// Resource was deleted during the pass
    Deleted(K),
}

/// How a bounded pass ended
///
/// A pass that ends on a watch error has not seen the full inventory, so its
/// observations must not be treated as a complete snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassEnd {
    /// Budget elapsed or the stream finished; everything current was seen
    Complete,
    /// The watch failed before the budget elapsed
    Failed,
}

/// Run one bounded watch pass, feeding every observation to `handle`
///
/// The caller decides when the next pass runs and what a `Failed` end means
/// for the observations gathered so far.
pub async fn bounded_pass<K>(
    api: Api<K>,
    budget: Duration,
    mut handle: impl FnMut(PassEvent<K>),
) -> PassEnd
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let mut stream = watcher::watcher(api, watcher::Config::default()).boxed();
    let deadline = Instant::now() + budget;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PassEnd::Complete;
        }

        match tokio::time::timeout(remaining, stream.try_next()).await {
            // Budget exhausted: the pass is complete, not an error
            Err(_) => return PassEnd::Complete,
            Ok(Ok(Some(event))) => match event {
                Event::Apply(obj) | Event::InitApply(obj) => handle(PassEvent::Applied(obj)),
                Event::Delete(obj) => handle(PassEvent::Deleted(obj)),
                Event::Init | Event::InitDone => {}
            },
            Ok(Ok(None)) => return PassEnd::Complete,
            Ok(Err(e)) => {
                warn!(error = %e, "watch error ended refresh pass early");
                return PassEnd::Failed;
            }
        }
    }
}
