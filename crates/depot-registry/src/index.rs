use std::collections::BTreeMap;

use depot_resource::ResourceVersion;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A published mapping from resource identifier to its current version.
///
/// On the wire this is a flat JSON object:
/// `{"linux_amd64/core/portmaster": "1.2.3", ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIndex(BTreeMap<String, String>);

impl ResourceIndex {
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.0.get(identifier).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Validate every entry into a fetchable [`ResourceVersion`].
    pub fn resources(&self) -> Result<Vec<ResourceVersion>> {
        self.iter()
            .map(|(identifier, version)| Ok(ResourceVersion::new(identifier, version)?))
            .collect()
    }
}

impl FromIterator<(String, String)> for ResourceIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
