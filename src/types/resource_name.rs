// ABOUTME: Validated names for compute groups, target groups and load balancers.
// ABOUTME: Rejects empty, oversized, or whitespace-bearing names before any gateway call.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_LEN: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceNameError {
    #[error("resource name cannot be empty")]
    Empty,

    #[error("resource name exceeds maximum length of 255 characters")]
    TooLong,

    #[error("invalid character in resource name: {0:?}")]
    InvalidChar(char),
}

/// Name of a provider-managed resource, looked up by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(value: &str) -> Result<Self, ResourceNameError> {
        if value.is_empty() {
            return Err(ResourceNameError::Empty);
        }

        if value.chars().count() > MAX_LEN {
            return Err(ResourceNameError::TooLong);
        }

        if let Some(c) = value
            .chars()
            .find(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ResourceNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourceName {
    type Err = ResourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ResourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ResourceName::new(&s).map_err(serde::de::Error::custom)
    }
}
