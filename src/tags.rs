//! Conversion of Kubernetes-style tags into tags Azure Resource Manager accepts.
use std::collections::BTreeMap;

/// Tag key marking resources as owned by a cluster's node provisioner.
pub const KARPENTER_MANAGED_TAG_KEY: &str = "karpenter.azure.com/cluster";

/// Merges tag maps into one map with ARM-safe keys.
///
/// Sources are applied in order, so a later source wins on key collision.
/// Every `/` in a key is replaced with `_`, since ARM rejects `/` in tag
/// names; keys that collide after this replacement also follow "later wins".
/// Values are copied, so the result does not borrow from any source.
pub fn merge_tags<'a, I>(sources: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a BTreeMap<String, String>>,
{
    sources
        .into_iter()
        .flat_map(|source| source.iter())
        .fold(BTreeMap::new(), |mut merged, (key, value)| {
            merged.insert(arm_safe_key(key), value.clone());
            merged
        })
}

fn arm_safe_key(key: &str) -> String {
    key.replace('/', "_")
}
