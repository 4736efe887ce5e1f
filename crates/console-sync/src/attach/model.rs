use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::query::ResourceDescriptor;

/// Reserved prefix for networks that exist on every host.
pub const SYSTEM_NETWORK_LINK: &str = "/system-networks-link";

/// Network modes backed by a system network.
pub const SYSTEM_NETWORK_MODES: [&str; 2] = ["bridge", "host"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedKind {
    Network,
    Volume,
}

impl fmt::Display for SharedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedKind::Network => write!(f, "network"),
            SharedKind::Volume => write!(f, "volume"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDescriptor {
    pub link: String,
    pub name: String,
    pub kind: SharedKind,
}

impl SharedDescriptor {
    pub fn new(link: impl Into<String>, name: impl Into<String>, kind: SharedKind) -> Self {
        Self {
            link: link.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn from_resource(resource: &ResourceDescriptor, kind: SharedKind) -> Self {
        let name = resource
            .name()
            .unwrap_or(resource.document_id.as_str())
            .to_string();
        Self::new(resource.self_link.clone(), name, kind)
    }

    /// Synthesized descriptor for a system network mode, `None` for anything
    /// that is not `bridge` or `host`. Modes compare case-insensitively.
    pub fn system_network(mode: &str) -> Option<Self> {
        let mode = mode.to_ascii_lowercase();
        SYSTEM_NETWORK_MODES.contains(&mode.as_str()).then(|| {
            Self::new(
                format!("{}/{}", SYSTEM_NETWORK_LINK, mode),
                mode,
                SharedKind::Network,
            )
        })
    }

    pub fn is_system(&self) -> bool {
        is_system_link(&self.link)
    }
}

pub(crate) fn is_system_link(link: &str) -> bool {
    link.strip_prefix(SYSTEM_NETWORK_LINK)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryDescriptor {
    pub link: String,
    pub name: String,
    #[serde(default)]
    pub network_links: Vec<String>,
    #[serde(default)]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub volume_links: Vec<String>,
}

impl PrimaryDescriptor {
    pub fn new(link: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_network_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.network_links = links.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = Some(mode.into());
        self
    }

    pub fn with_volume_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volume_links = links.into_iter().map(Into::into).collect();
        self
    }

    /// Read the attachment fields out of a container description payload.
    /// Non-string entries are ignored.
    pub fn from_resource(resource: &ResourceDescriptor) -> Self {
        let name = resource
            .name()
            .unwrap_or(resource.document_id.as_str())
            .to_string();
        Self {
            link: resource.self_link.clone(),
            name,
            network_links: string_list(resource.field("networkLinks")),
            network_mode: resource
                .str_field("networkMode")
                .filter(|mode| !mode.is_empty())
                .map(str::to_string),
            volume_links: string_list(resource.field("volumeLinks")),
        }
    }

    pub fn links(&self, kind: SharedKind) -> &[String] {
        match kind {
            SharedKind::Network => &self.network_links,
            SharedKind::Volume => &self.volume_links,
        }
    }

    pub(crate) fn links_mut(&mut self, kind: SharedKind) -> &mut Vec<String> {
        match kind {
            SharedKind::Network => &mut self.network_links,
            SharedKind::Volume => &mut self.volume_links,
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Derived view of which primaries reference which shared descriptors.
///
/// `networks` and `volumes` list every referenced shared descriptor once, in
/// first-discovery order. The per-primary maps only contain primaries with at
/// least one edge of that kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentGraph {
    pub networks: Vec<SharedDescriptor>,
    pub volumes: Vec<SharedDescriptor>,
    pub network_links: BTreeMap<String, Vec<String>>,
    pub volume_links: BTreeMap<String, Vec<String>>,
}

impl AttachmentGraph {
    pub fn shared(&self, kind: SharedKind) -> &[SharedDescriptor] {
        match kind {
            SharedKind::Network => &self.networks,
            SharedKind::Volume => &self.volumes,
        }
    }

    pub fn links_of(&self, primary_link: &str, kind: SharedKind) -> &[String] {
        let map = match kind {
            SharedKind::Network => &self.network_links,
            SharedKind::Volume => &self.volume_links,
        };
        map.get(primary_link).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_edge(&self, primary_link: &str, shared_link: &str) -> bool {
        self.network_links
            .get(primary_link)
            .into_iter()
            .chain(self.volume_links.get(primary_link))
            .any(|links| links.iter().any(|l| l == shared_link))
    }

    /// All `(primary, shared)` pairs, networks first.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.network_links
            .iter()
            .chain(self.volume_links.iter())
            .flat_map(|(primary, links)| links.iter().map(move |l| (primary.as_str(), l.as_str())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.network_links.is_empty() && self.volume_links.is_empty()
    }
}
