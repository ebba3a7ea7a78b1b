use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kinds of resource definitions exchanged with the virtualization layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Domain,
    DomainSnapshot,
    Network,
    Pool,
    Volume,
    Capabilities,
    Device,
    Filter,
    FilterBinding,
    Secret,
    Interface,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Domain,
        ResourceKind::DomainSnapshot,
        ResourceKind::Network,
        ResourceKind::Pool,
        ResourceKind::Volume,
        ResourceKind::Capabilities,
        ResourceKind::Device,
        ResourceKind::Filter,
        ResourceKind::FilterBinding,
        ResourceKind::Secret,
        ResourceKind::Interface,
    ];

    /// Root element tag of a definition, also the root segment of comparison paths
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Domain => "domain",
            ResourceKind::DomainSnapshot => "domainsnapshot",
            ResourceKind::Network => "network",
            ResourceKind::Pool => "pool",
            ResourceKind::Volume => "volume",
            ResourceKind::Capabilities => "capabilities",
            ResourceKind::Device => "device",
            ResourceKind::Filter => "filter",
            ResourceKind::FilterBinding => "filterbinding",
            ResourceKind::Secret => "secret",
            ResourceKind::Interface => "interface",
        }
    }

    /// Name of the grammar describing this kind of definition
    pub fn schema_name(self) -> &'static str {
        match self {
            ResourceKind::Domain => "domain",
            ResourceKind::DomainSnapshot => "domainsnapshot",
            ResourceKind::Network => "network",
            ResourceKind::Pool => "storagepool",
            ResourceKind::Volume => "storagevol",
            ResourceKind::Capabilities => "capability",
            ResourceKind::Device => "nodedev",
            ResourceKind::Filter => "nwfilter",
            ResourceKind::FilterBinding => "nwfilterbinding",
            ResourceKind::Secret => "secret",
            ResourceKind::Interface => "interface",
        }
    }

    pub fn from_root_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.label() == tag)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_root_tag(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}

/// Outcome of an idempotency check between a desired and an observed definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub kind: ResourceKind,
    pub changed: bool,
    /// Dotted location of the first divergence
    pub path: Option<String>,
    /// Human-readable reason for the divergence
    pub cause: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Default units per kind label, merged over the built-in table
    /// (e.g. `domain = "KiB"`)
    #[serde(default)]
    pub units: BTreeMap<String, String>,

    /// Indentation width for encoded documents; compact output when unset
    #[serde(default)]
    pub indent: Option<usize>,
}
