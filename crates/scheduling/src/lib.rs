//! Node selector requirement algebra for matching instance types against scheduling constraints.
//!
//! A [`Requirement`] models a Kubernetes node selector requirement as a set of
//! allowed label values, so requirements can be intersected and compared the
//! way the scheduler does. [`Requirements`] groups them by label key.
//!
//! # Example
//!
//! ```
//! use scheduling::{Requirement, Requirements};
//!
//! let instance_type: Requirements = vec![
//!     Requirement::one_of("kubernetes.io/arch", vec!["amd64", "arm64"]),
//! ]
//! .into_iter()
//! .collect();
//! let wants_arm: Requirements = vec![Requirement::one_of("kubernetes.io/arch", vec!["arm64"])]
//!     .into_iter()
//!     .collect();
//!
//! assert!(instance_type.compatible(&wants_arm, &Default::default()).is_ok());
//! ```
#![cfg_attr(not(test), deny(missing_docs))]

mod requirement;
mod requirements;

#[doc(inline)]
pub use requirement::{Operator, Requirement};
#[doc(inline)]
pub use requirements::{Incompatible, Requirements};

/// An error raised when a node selector requirement cannot be understood.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// The operator is not one of the Kubernetes node selector operators
    #[error("unknown node selector operator {0:?}")]
    UnknownOperator(String),
    /// A `Gt` or `Lt` requirement was given no value to compare against
    #[error("requirement {key} {operator} needs exactly one integer value")]
    MissingBound {
        /// The label key of the requirement
        key: String,
        /// The comparison operator
        operator: Operator,
    },
    /// A `Gt` or `Lt` value is not an integer
    #[error("requirement {key} has a non-integer bound {value:?}")]
    InvalidBound {
        /// The label key of the requirement
        key: String,
        /// The offending value
        value: String,
    },
}
