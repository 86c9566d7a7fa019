use std::{collections::BTreeSet, fmt};

use ekp_openapi::ResourceId;
use serde::Serialize;

/// Why a predecessor must complete before its successor starts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EdgeReason {
    /// Declared by hand with `depends_on`.
    Explicit,
    /// The successor consumes one of the predecessor's outputs.
    Reference { attribute: String },
    /// Produced by a row of the rule table.
    Rule { name: &'static str },
}

impl fmt::Display for EdgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => f.write_str("explicit"),
            Self::Reference { attribute } => write!(f, "reference({attribute})"),
            Self::Rule { name } => write!(f, "rule({name})"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Edge<'a> {
    pub predecessor: &'a ResourceId,
    pub successor: &'a ResourceId,
    pub reasons: &'a BTreeSet<EdgeReason>,
}
