use tracing::{debug, warn};

use crate::error::DiscoveryError;
use crate::pipeline::PipelineConfig;
use crate::source::{ObjectEntry, ObjectSource};

use super::trigger::BatchTrigger;

/// Members admitted to a batch, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub members: Vec<ObjectEntry>,
    /// The listing hit `max_items`; later objects were not considered.
    pub truncated: bool,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Lists the batch prefix, or takes the trigger's pre-supplied members, and
/// keeps only real documents with an allowed extension.
pub fn discover(
    source: &dyn ObjectSource,
    config: &PipelineConfig,
    trigger: &BatchTrigger,
) -> Result<Discovery, DiscoveryError> {
    // The sentinel takes one slot; one more tells a full listing apart from
    // one that stopped early.
    let listing_limit = config.max_items.saturating_add(2);

    let (candidates, listing_truncated) = match trigger.members {
        Some(ref members) => {
            debug!(count = members.len(), "Using pre-supplied batch members");
            (members.clone(), false)
        }
        None => {
            let listed = source
                .list_objects(&trigger.location, &trigger.prefix, listing_limit)
                .map_err(|source| DiscoveryError::Listing {
                    location: trigger.location.clone(),
                    prefix: trigger.prefix.clone(),
                    source,
                })?;
            let truncated = listed.len() >= listing_limit;
            (listed, truncated)
        }
    };

    let mut members: Vec<ObjectEntry> = candidates
        .into_iter()
        .filter(|entry| is_member(entry, config, trigger))
        .collect();
    members.sort_by(|a, b| a.name.cmp(&b.name));
    members.dedup_by(|a, b| a.name == b.name);

    let truncated = listing_truncated || members.len() > config.max_items;
    if truncated {
        warn!(
            max_items = config.max_items,
            "Batch listing capped; remaining objects were not admitted"
        );
        members.truncate(config.max_items);
    }

    Ok(Discovery { members, truncated })
}

fn is_member(entry: &ObjectEntry, config: &PipelineConfig, trigger: &BatchTrigger) -> bool {
    !entry.is_directory_placeholder()
        && entry.name.starts_with(&trigger.prefix)
        && entry.name != trigger.sentinel_name
        && !config.is_sentinel(&entry.name)
        && config.is_allowed(&entry.name)
}
