use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// A construct path: `Stack/Construct/Resource`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub const SEPARATOR: char = '/';

    pub fn new(stack: &str) -> Self {
        Self(stack.into())
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}{}{name}", self.0, Self::SEPARATOR))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The stack this resource is synthesized into.
    pub fn stack(&self) -> &str {
        self.0
            .split_once(Self::SEPARATOR)
            .map(|(stack, _)| stack)
            .unwrap_or(&self.0)
    }

    /// Path segments below the stack.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(Self::SEPARATOR).skip(1)
    }

    /// A reference token for one of this resource's output attributes.
    pub fn attr(&self, attribute: &str) -> String {
        format!("${{{}.{attribute}}}", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_paths_keep_their_stack() {
        let id = ResourceId::new("EksClusterStack")
            .child("Prometheus")
            .child("Deployment");

        assert_eq!(id.as_str(), "EksClusterStack/Prometheus/Deployment");
        assert_eq!(id.stack(), "EksClusterStack");
        assert_eq!(id.segments().collect::<Vec<_>>(), ["Prometheus", "Deployment"]);
        assert_eq!(
            id.attr("Name"),
            "${EksClusterStack/Prometheus/Deployment.Name}",
        );
    }
}
