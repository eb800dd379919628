//! Escalation of the account-wide interaction limit when the collector shows
//! burst activity.

use anyhow::{Context, Result};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::collector::{
    NewItemListener, WindowCollector, WINDOW_1_HOUR, WINDOW_30_SECS, WINDOW_5_MIN,
};
use crate::github::{InteractionLimit, InteractionsApi, RestrictionExpiry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub window: Duration,
    pub min_items: usize,
}

pub const DEFAULT_THRESHOLDS: [Threshold; 3] = [
    Threshold {
        window: WINDOW_30_SECS,
        min_items: 2,
    },
    Threshold {
        window: WINDOW_5_MIN,
        min_items: 70,
    },
    Threshold {
        window: WINDOW_1_HOUR,
        min_items: 400,
    },
];

pub struct EscalationPolicy {
    api: Arc<dyn InteractionsApi>,
    thresholds: Vec<Threshold>,
}

impl EscalationPolicy {
    pub fn new(api: Arc<dyn InteractionsApi>) -> Self {
        Self::with_thresholds(api, DEFAULT_THRESHOLDS.to_vec())
    }

    pub fn with_thresholds(api: Arc<dyn InteractionsApi>, thresholds: Vec<Threshold>) -> Self {
        Self { api, thresholds }
    }

    /// First threshold the collector currently meets, if any. Thresholds are
    /// independent; windows the collector doesn't track never trigger.
    pub fn triggered_by<T>(&self, collector: &WindowCollector<T>) -> Option<Threshold>
    where
        T: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.thresholds.iter().copied().find(|t| {
            collector
                .size_of(t.window)
                .is_some_and(|size| size >= t.min_items)
        })
    }
}

impl<T> NewItemListener<T> for EscalationPolicy
where
    T: Eq + Hash + Clone + Send + Sync + Debug + 'static,
{
    fn on_new_item(&self, collector: &WindowCollector<T>, item: &T) {
        info!("New item {:?}", item);

        let Some(threshold) = self.triggered_by(collector) else {
            return;
        };
        warn!(
            window_secs = threshold.window.as_secs(),
            min_items = threshold.min_items,
            "Burst threshold reached"
        );

        // Local state is reset whatever happens to the remote call.
        collector.clear();

        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = escalate(api.as_ref()).await {
                error!("Escalation failed: {:?}", e);
            }
        });
    }
}

/// Two tiers: anything below `existing_users` goes there for a day, and a
/// repeat offence while it is in place goes to `collaborators_only`.
pub fn next_restriction(
    current: Option<InteractionLimit>,
) -> (InteractionLimit, RestrictionExpiry) {
    match current {
        Some(InteractionLimit::ExistingUsers) => (
            InteractionLimit::CollaboratorsOnly,
            RestrictionExpiry::ThreeDays,
        ),
        _ => (InteractionLimit::ExistingUsers, RestrictionExpiry::OneDay),
    }
}

pub async fn escalate(
    api: &dyn InteractionsApi,
) -> Result<(InteractionLimit, RestrictionExpiry)> {
    let current = api
        .current_restriction()
        .await
        .context("Failed to read current interaction limit")?;
    let (limit, expiry) = next_restriction(current.map(|r| r.limit));

    warn!("[ ! ] Restricting to '{}' for '{}'", limit, expiry);
    api.set_restriction(limit, expiry)
        .await
        .context("Failed to set interaction limit")?;
    Ok((limit, expiry))
}
