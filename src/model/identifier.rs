use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, comparable package identity.
///
/// Used both as the key of the controller's in-memory tables and as the row
/// key of every storage backend, so it derives `Ord` to give callers a
/// deterministic iteration order over `BTreeMap<Identifier, _>`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    #[serde(rename = "type")]
    pub package_type: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl Identifier {
    pub fn new(
        package_type: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            package_type: package_type.into(),
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.package_type)?;
        if !self.namespace.is_empty() {
            write!(f, "{}/", self.namespace)?;
        }
        write!(f, "{}@{}", self.name, self.version)
    }
}
