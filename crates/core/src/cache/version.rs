//! Cache version tags.
//!
//! Every partition key is prefixed with a `name:version` tag. Bumping the
//! version on deploy orphans all partitions of the previous tag until the
//! activation cleanup deletes them.

use crate::Error;

/// The `name:version` tag that namespaces every partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVersion {
    name: String,
    version: String,
}

impl CacheVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let version = version.into();
        for (field, value) in [("cache name", &name), ("cache version", &version)] {
            if value.is_empty() {
                return Err(Error::InvalidInput(format!("{field} must not be empty")));
            }
            if value.contains(':') {
                return Err(Error::InvalidInput(format!("{field} must not contain ':' ({value})")));
            }
        }
        Ok(Self { name, version })
    }

    /// Parse a tag previously produced by [`CacheVersion::tag`].
    pub fn parse(tag: &str) -> Result<Self, Error> {
        let (name, version) = tag
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("malformed version tag: {tag}")))?;
        Self::new(name, version)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn tag(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// Storage key of a partition under this version.
    pub fn partition_key(&self, partition: &str) -> String {
        format!("{}:{}:{partition}", self.name, self.version)
    }
}

impl std::fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}
