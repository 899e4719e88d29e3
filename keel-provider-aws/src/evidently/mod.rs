//! CloudWatch Evidently features and projects

pub mod api;
pub mod feature;
pub mod id;
pub mod memory;
mod project;
pub mod sdk;

use std::collections::HashMap;

pub use api::EvidentlyApi;
pub use feature::find_feature_with_project_name_or_arn;
pub use id::{FeatureId, FeatureIdError};

use crate::error::ApiError;

/// Bring the tags on `arn` from `old` to `new`
///
/// Keys missing from `new` are untagged first; added or changed keys are
/// then tagged in one call.
pub(crate) async fn update_tags(
    api: &dyn EvidentlyApi,
    arn: &str,
    old: &HashMap<String, String>,
    new: &HashMap<String, String>,
) -> Result<(), ApiError> {
    let mut removed: Vec<String> = old
        .keys()
        .filter(|k| !new.contains_key(*k))
        .cloned()
        .collect();
    removed.sort();
    if !removed.is_empty() {
        log::debug!("untagging {}: {:?}", arn, removed);
        api.untag_resource(arn, removed).await?;
    }

    let changed: HashMap<String, String> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !changed.is_empty() {
        log::debug!("tagging {} with {} key(s)", arn, changed.len());
        api.tag_resource(arn, changed).await?;
    }

    Ok(())
}
