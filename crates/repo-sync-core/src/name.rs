//! Hierarchical names.
//!
//! Every request and every object is identified by a `/`-separated name.
//! Names order component-wise, which gives the sync tree its deterministic
//! creator order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A hierarchical name such as `/repo/a/fetch/7`.
///
/// The root name `/` has no components.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name(Vec<String>);

impl Name {
    /// The root name `/`.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a URI-style name. Empty components are ignored, so `/a//b/`
    /// parses as `/a/b`.
    pub fn parse(uri: &str) -> Result<Self, CoreError> {
        if !uri.starts_with('/') {
            return Err(CoreError::InvalidName(format!(
                "name must start with '/': {uri:?}"
            )));
        }
        Ok(Self(
            uri.split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
                .collect(),
        ))
    }

    /// Build a name from components.
    pub fn from_components<I, S>(components: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut name = Self::root();
        for component in components {
            name = name.try_append(component)?;
        }
        Ok(name)
    }

    /// Append one component.
    ///
    /// Components may not be empty or contain `/`.
    pub fn try_append(mut self, component: impl Into<String>) -> Result<Self, CoreError> {
        let component = component.into();
        if component.is_empty() || component.contains('/') {
            return Err(CoreError::InvalidName(format!(
                "invalid name component: {component:?}"
            )));
        }
        self.0.push(component);
        Ok(self)
    }

    /// Append every component of another name.
    pub fn join(mut self, other: &Name) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }

    /// Append a sequence number as a decimal component.
    pub fn append_seq(mut self, seq: u64) -> Self {
        self.0.push(seq.to_string());
        self
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root name.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component at `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// The last component.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Parse the last component as a sequence number.
    pub fn last_seq(&self) -> Option<u64> {
        self.last().and_then(|c| c.parse().ok())
    }

    /// Components `[start, end)`.
    pub fn sub_name(&self, start: usize, end: usize) -> Name {
        let end = end.min(self.0.len());
        let start = start.min(end);
        Self(self.0[start..end].to_vec())
    }

    /// Everything but the last component.
    pub fn parent(&self) -> Name {
        self.sub_name(0, self.0.len().saturating_sub(1))
    }

    /// Whether `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// Iterate over components.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The URI form, e.g. `/a/b`. The root is `/`.
    pub fn to_uri(&self) -> String {
        if self.0.is_empty() {
            return "/".to_owned();
        }
        let mut uri = String::new();
        for component in &self.0 {
            uri.push('/');
            uri.push_str(component);
        }
        uri
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_uri())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for Name {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
