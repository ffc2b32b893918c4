use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::NodeSelectorRequirement;

use crate::ParseError;

/// The operators a node selector requirement can use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// The label value must be one of the listed values
    In,
    /// The label value must not be one of the listed values
    NotIn,
    /// The label must be present
    Exists,
    /// The label must be absent
    DoesNotExist,
    /// The label value must be an integer greater than the bound
    Gt,
    /// The label value must be an integer lower than the bound
    Lt,
}

impl Operator {
    /// The operator as it is spelled in Kubernetes manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
            Operator::Gt => "Gt",
            Operator::Lt => "Lt",
        }
    }

    // NotIn and DoesNotExist are satisfied by nodes that lack the label
    pub(crate) fn tolerates_absence(&self) -> bool {
        matches!(self, Operator::NotIn | Operator::DoesNotExist)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" => Ok(Operator::In),
            "NotIn" => Ok(Operator::NotIn),
            "Exists" => Ok(Operator::Exists),
            "DoesNotExist" => Ok(Operator::DoesNotExist),
            "Gt" => Ok(Operator::Gt),
            "Lt" => Ok(Operator::Lt),
            other => Err(ParseError::UnknownOperator(other.to_owned())),
        }
    }
}

/// A requirement on a single label key.
///
/// Internally this is a set of values plus a `complement` flag: `In` is the
/// set of its values, `NotIn` is the complement of its values, `Exists` is the
/// complement of the empty set and `DoesNotExist` is the empty set. `Gt` and
/// `Lt` are complements of the empty set restricted by integer bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    values: BTreeSet<String>,
    complement: bool,
    greater_than: Option<i64>,
    less_than: Option<i64>,
}

impl Requirement {
    /// Creates a requirement from a Kubernetes operator and its values.
    ///
    /// `Gt` and `Lt` take the first value as their integer bound. Values are
    /// ignored for `Exists` and `DoesNotExist`.
    pub fn new<I, S>(key: &str, operator: Operator, values: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requirement = match operator {
            Operator::In => Requirement::one_of(key, values),
            Operator::NotIn => Requirement::none_of(key, values),
            Operator::Exists => Requirement::exists(key),
            Operator::DoesNotExist => Requirement::does_not_exist(key),
            Operator::Gt | Operator::Lt => {
                let value: String = values
                    .into_iter()
                    .next()
                    .map(Into::into)
                    .ok_or_else(|| ParseError::MissingBound {
                        key: key.to_owned(),
                        operator,
                    })?;
                let bound = value.trim().parse::<i64>().map_err(|_| ParseError::InvalidBound {
                    key: key.to_owned(),
                    value: value.clone(),
                })?;
                if operator == Operator::Gt {
                    Requirement::greater_than(key, bound)
                } else {
                    Requirement::less_than(key, bound)
                }
            }
        };
        Ok(requirement)
    }

    /// The label must have one of `values`.
    pub fn one_of<I, S>(key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement {
            key: key.to_owned(),
            values: values.into_iter().map(Into::into).collect(),
            complement: false,
            greater_than: None,
            less_than: None,
        }
    }

    /// The label must not have any of `values`.
    pub fn none_of<I, S>(key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement {
            complement: true,
            ..Requirement::one_of(key, values)
        }
    }

    /// The label must be present, with any value.
    pub fn exists(key: &str) -> Self {
        Requirement::none_of(key, Vec::<String>::new())
    }

    /// The label must be absent.
    pub fn does_not_exist(key: &str) -> Self {
        Requirement::one_of(key, Vec::<String>::new())
    }

    /// The label must hold an integer strictly greater than `bound`.
    pub fn greater_than(key: &str, bound: i64) -> Self {
        Requirement {
            greater_than: Some(bound),
            ..Requirement::exists(key)
        }
    }

    /// The label must hold an integer strictly lower than `bound`.
    pub fn less_than(key: &str, bound: i64) -> Self {
        Requirement {
            less_than: Some(bound),
            ..Requirement::exists(key)
        }
    }

    /// The label key this requirement constrains.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The explicitly listed values. For complemented requirements these are
    /// the excluded values.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    /// The operator that describes this requirement.
    ///
    /// Bounded requirements report `Exists`, since they allow any value within
    /// their bounds.
    pub fn operator(&self) -> Operator {
        if self.complement {
            if self.values.is_empty() {
                Operator::Exists
            } else {
                Operator::NotIn
            }
        } else if self.values.is_empty() {
            Operator::DoesNotExist
        } else {
            Operator::In
        }
    }

    /// The number of values allowed. Complemented sets are treated as
    /// unbounded minus their exclusions.
    pub fn len(&self) -> usize {
        if self.complement {
            usize::MAX - self.values.len()
        } else {
            self.values.len()
        }
    }

    /// Returns true if no value satisfies this requirement.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `value` satisfies this requirement.
    pub fn has(&self, value: &str) -> bool {
        let listed = self.values.contains(value);
        listed != self.complement && within_bounds(value, self.greater_than, self.less_than)
    }

    /// The values allowed by both `self` and `other`. The result keeps the key
    /// of `self`.
    pub fn intersection(&self, other: &Requirement) -> Requirement {
        let complement = self.complement && other.complement;
        let greater_than = max_bound(self.greater_than, other.greater_than);
        let less_than = min_bound(self.less_than, other.less_than);
        if let (Some(gt), Some(lt)) = (greater_than, less_than) {
            if gt >= lt {
                return Requirement::does_not_exist(&self.key);
            }
        }

        let values: BTreeSet<String> = match (self.complement, other.complement) {
            (true, true) => self.values.union(&other.values).cloned().collect(),
            (true, false) => other.values.difference(&self.values).cloned().collect(),
            (false, true) => self.values.difference(&other.values).cloned().collect(),
            (false, false) => self.values.intersection(&other.values).cloned().collect(),
        };
        let values = values
            .into_iter()
            .filter(|value| within_bounds(value, greater_than, less_than))
            .collect();

        Requirement {
            key: self.key.clone(),
            values,
            complement,
            greater_than,
            less_than,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator() {
            Operator::Exists | Operator::DoesNotExist => write!(f, "{} {}", self.key, self.operator())?,
            operator => {
                let values: Vec<&str> = self.values().collect();
                write!(f, "{} {} [{}]", self.key, operator, values.join(", "))?
            }
        }
        if let Some(gt) = self.greater_than {
            write!(f, " >{}", gt)?;
        }
        if let Some(lt) = self.less_than {
            write!(f, " <{}", lt)?;
        }
        Ok(())
    }
}

impl TryFrom<&NodeSelectorRequirement> for Requirement {
    type Error = ParseError;

    fn try_from(requirement: &NodeSelectorRequirement) -> Result<Self, Self::Error> {
        let operator: Operator = requirement.operator.parse()?;
        Requirement::new(
            &requirement.key,
            operator,
            requirement.values.iter().flatten().cloned(),
        )
    }
}

fn within_bounds(value: &str, greater_than: Option<i64>, less_than: Option<i64>) -> bool {
    if greater_than.is_none() && less_than.is_none() {
        return true;
    }
    let value = match value.parse::<i64>() {
        Ok(v) => v,
        Err(_) => return false,
    };
    greater_than.map_or(true, |gt| value > gt) && less_than.map_or(true, |lt| value < lt)
}

fn max_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn min_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
