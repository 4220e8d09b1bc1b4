use std::fmt;

use serde::{Deserialize, Serialize};

/// What a cache slot holds: resource kind, owning user and an optional
/// sub-filter (e.g. a restaurant id or "unread").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub kind: String,
    pub owner: String,
    pub sub_filter: Option<String>,
}

impl ResourceIdentity {
    pub fn new(kind: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            owner: owner.into(),
            sub_filter: None,
        }
    }

    pub fn with_sub_filter(mut self, sub_filter: impl Into<String>) -> Self {
        self.sub_filter = Some(sub_filter.into());
        self
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.owner)?;
        if let Some(sub) = &self.sub_filter {
            write!(f, "/{}", sub)?;
        }
        Ok(())
    }
}
