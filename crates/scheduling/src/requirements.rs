use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::NodeSelectorRequirement;
use tracing::trace;

use crate::{ParseError, Requirement};

/// The reasons two sets of requirements cannot be satisfied together.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("incompatible requirements: {}", .reasons.join("; "))]
pub struct Incompatible {
    reasons: Vec<String>,
}

impl Incompatible {
    /// One entry per conflicting label key.
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

/// A set of requirements keyed by label.
///
/// Adding a second requirement for a key narrows the existing one to the
/// values both allow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Requirements(BTreeMap<String, Requirement>);

impl Requirements {
    /// Creates an empty requirement set.
    pub fn new() -> Self {
        Requirements::default()
    }

    /// Parses the node selector requirements of a Kubernetes object.
    pub fn from_node_selector_requirements(
        requirements: &[NodeSelectorRequirement],
    ) -> Result<Self, ParseError> {
        requirements.iter().map(Requirement::try_from).collect()
    }

    /// Adds a requirement, intersecting it with any requirement already held
    /// for the same key.
    pub fn add(&mut self, requirement: Requirement) {
        let requirement = match self.0.get(requirement.key()) {
            Some(existing) => existing.intersection(&requirement),
            None => requirement,
        };
        self.0.insert(requirement.key().to_owned(), requirement);
    }

    /// The requirement held for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Requirement> {
        self.0.get(key)
    }

    /// Returns true if there is a requirement for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The constrained label keys, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over the held requirements.
    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.0.values()
    }

    /// The number of constrained keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is constrained.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that every key constrained by both sets has at least one value
    /// in common.
    ///
    /// Keys where both sides only exclude values (`NotIn` or `DoesNotExist`)
    /// are satisfied by a node without the label, so they never conflict.
    pub fn intersects(&self, other: &Requirements) -> Result<(), Incompatible> {
        let reasons = self.intersection_conflicts(other);
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(Incompatible { reasons })
        }
    }

    /// Checks that `other` can be satisfied by something offering `self`.
    ///
    /// Every key `other` constrains must be defined here unless it appears in
    /// `allow_undefined` or `other` only excludes values for it. Shared keys
    /// must intersect.
    pub fn compatible(
        &self,
        other: &Requirements,
        allow_undefined: &BTreeSet<String>,
    ) -> Result<(), Incompatible> {
        let mut reasons: Vec<String> = other
            .iter()
            .filter(|incoming| {
                !allow_undefined.contains(incoming.key())
                    && !self.has(incoming.key())
                    && !incoming.operator().tolerates_absence()
            })
            .map(|incoming| format!("label {:?} does not have known values", incoming.key()))
            .collect();
        reasons.extend(self.intersection_conflicts(other));

        if reasons.is_empty() {
            Ok(())
        } else {
            trace!(?reasons, "requirements are not compatible");
            Err(Incompatible { reasons })
        }
    }

    fn intersection_conflicts(&self, other: &Requirements) -> Vec<String> {
        other
            .iter()
            .filter_map(|incoming| {
                let existing = self.get(incoming.key())?;
                if !existing.intersection(incoming).is_empty() {
                    return None;
                }
                if incoming.operator().tolerates_absence() && existing.operator().tolerates_absence() {
                    return None;
                }
                Some(format!("key {}, {} not in {}", incoming.key(), incoming, existing))
            })
            .collect()
    }
}

impl FromIterator<Requirement> for Requirements {
    fn from_iter<T: IntoIterator<Item = Requirement>>(iter: T) -> Self {
        let mut requirements = Requirements::new();
        for requirement in iter {
            requirements.add(requirement);
        }
        requirements
    }
}

impl Extend<Requirement> for Requirements {
    fn extend<T: IntoIterator<Item = Requirement>>(&mut self, iter: T) {
        for requirement in iter {
            self.add(requirement);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Operator;

    const ARCH: &str = "kubernetes.io/arch";
    const ZONE: &str = "topology.kubernetes.io/zone";

    fn arch(values: Vec<&str>) -> Requirements {
        vec![Requirement::one_of(ARCH, values)].into_iter().collect()
    }

    #[test]
    fn add_narrows_existing_key() {
        let mut reqs = arch(vec!["amd64", "arm64"]);
        reqs.add(Requirement::none_of(ARCH, vec!["amd64"]));

        assert_eq!(reqs.len(), 1);
        let narrowed = reqs.get(ARCH).unwrap();
        assert_eq!(narrowed.operator(), Operator::In);
        assert_eq!(narrowed.values().collect::<Vec<_>>(), vec!["arm64"]);
    }

    #[test]
    fn compatible_when_values_overlap() {
        assert!(arch(vec!["amd64", "arm64"])
            .compatible(&arch(vec!["arm64"]), &BTreeSet::new())
            .is_ok());
    }

    #[test]
    fn incompatible_when_values_disjoint() {
        let err = arch(vec!["amd64"])
            .compatible(&arch(vec!["arm64"]), &BTreeSet::new())
            .unwrap_err();
        assert_eq!(err.reasons().len(), 1);
        assert!(err.to_string().contains(ARCH));
    }

    #[test]
    fn undefined_key_is_rejected_unless_allowed() {
        let offered = Requirements::new();
        let wanted = arch(vec!["arm64"]);

        let err = offered.compatible(&wanted, &BTreeSet::new()).unwrap_err();
        assert_eq!(
            err.reasons(),
            &["label \"kubernetes.io/arch\" does not have known values".to_owned()]
        );

        let allowed: BTreeSet<String> = vec![ARCH.to_owned()].into_iter().collect();
        assert!(offered.compatible(&wanted, &allowed).is_ok());
    }

    #[test]
    fn undefined_key_with_exclusion_is_fine() {
        let wanted: Requirements = vec![Requirement::none_of(ZONE, vec!["westus2-1"])]
            .into_iter()
            .collect();
        assert!(Requirements::new().compatible(&wanted, &BTreeSet::new()).is_ok());
    }

    #[test]
    fn exclusions_on_both_sides_do_not_conflict() {
        let offered: Requirements = vec![Requirement::does_not_exist(ZONE)].into_iter().collect();
        let wanted: Requirements = vec![Requirement::none_of(ZONE, vec!["westus2-1"])]
            .into_iter()
            .collect();
        assert!(offered.intersects(&wanted).is_ok());

        let wanted: Requirements = vec![Requirement::exists(ZONE)].into_iter().collect();
        assert!(offered.intersects(&wanted).is_err());
    }

    #[test]
    fn parses_node_selector_requirements() {
        let raw: Vec<NodeSelectorRequirement> = serde_json::from_str(
            r#"[
                {"key": "kubernetes.io/arch", "operator": "In", "values": ["amd64"]},
                {"key": "kubernetes.io/arch", "operator": "In", "values": ["amd64", "arm64"]},
                {"key": "karpenter.azure.com/sku-cpu", "operator": "Lt", "values": ["33"]}
            ]"#,
        )
        .expect("parse requirements");
        let reqs = Requirements::from_node_selector_requirements(&raw).unwrap();

        assert_eq!(
            reqs.keys().collect::<Vec<_>>(),
            vec!["karpenter.azure.com/sku-cpu", ARCH]
        );
        assert_eq!(reqs.get(ARCH).unwrap().values().collect::<Vec<_>>(), vec!["amd64"]);
        assert!(reqs.get("karpenter.azure.com/sku-cpu").unwrap().has("32"));
    }

    #[test]
    fn rejects_unknown_operator() {
        let raw = vec![NodeSelectorRequirement {
            key: ARCH.to_owned(),
            operator: "Like".to_owned(),
            values: None,
        }];
        assert_eq!(
            Requirements::from_node_selector_requirements(&raw).err(),
            Some(ParseError::UnknownOperator("Like".to_owned()))
        );
    }
}
