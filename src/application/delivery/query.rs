use std::fmt;

use serde::{Deserialize, Serialize};

/// One delivery query parameter, such as `depth=2` or `elements.category[contains]=coffee`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: String,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn depth(depth: u32) -> Self {
        Self::new("depth", depth.to_string())
    }

    pub fn limit(limit: u32) -> Self {
        Self::new("limit", limit.to_string())
    }

    pub fn skip(skip: u32) -> Self {
        Self::new("skip", skip.to_string())
    }

    pub fn equals(element: &str, value: impl Into<String>) -> Self {
        Self::new(element, value)
    }

    /// Form used in cache keys.
    pub fn to_query_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QueryParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for QueryParameter {
    fn from((name, value): (N, V)) -> Self {
        Self::new(name, value)
    }
}
