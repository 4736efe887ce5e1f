//! Engine: owns the primaries and the shared catalog, applies attach/detach
//! to primaries' own link lists and rebuilds the graph from scratch after
//! every change.

use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::model::{
    is_system_link, AttachmentGraph, PrimaryDescriptor, SharedDescriptor, SharedKind,
    SYSTEM_NETWORK_LINK,
};

/// Lookup over the shared catalog plus the synthesized system networks.
struct Catalog<'a> {
    by_link: HashMap<&'a str, &'a SharedDescriptor>,
    entries: &'a [SharedDescriptor],
}

impl<'a> Catalog<'a> {
    fn new(entries: &'a [SharedDescriptor]) -> Self {
        let by_link = entries.iter().map(|s| (s.link.as_str(), s)).collect();
        Self { by_link, entries }
    }

    fn find(&self, link: &str) -> Option<SharedDescriptor> {
        if let Some(shared) = self.by_link.get(link) {
            return Some((*shared).clone());
        }
        if is_system_link(link) {
            let mode = &link[SYSTEM_NETWORK_LINK.len() + 1..];
            return SharedDescriptor::system_network(mode);
        }
        None
    }

    fn find_kind(&self, link: &str, kind: SharedKind) -> Option<SharedDescriptor> {
        self.find(link).filter(|s| s.kind == kind)
    }

    /// Network selected by a `networkMode` value.
    fn network_for_mode(&self, mode: &str) -> Option<SharedDescriptor> {
        if let Some(system) = SharedDescriptor::system_network(mode) {
            return Some(self.find(&system.link).unwrap_or(system));
        }
        self.entries
            .iter()
            .find(|s| s.kind == SharedKind::Network && s.name.eq_ignore_ascii_case(mode))
            .cloned()
    }
}

#[derive(Default)]
struct GraphBuilder {
    graph: AttachmentGraph,
    discovered: HashSet<String>,
}

impl GraphBuilder {
    fn add_edge(&mut self, primary_link: &str, shared: SharedDescriptor) {
        let per_primary = match shared.kind {
            SharedKind::Network => &mut self.graph.network_links,
            SharedKind::Volume => &mut self.graph.volume_links,
        };
        let links = per_primary.entry(primary_link.to_string()).or_default();
        if !links.contains(&shared.link) {
            links.push(shared.link.clone());
        }

        if self.discovered.insert(shared.link.clone()) {
            match shared.kind {
                SharedKind::Network => self.graph.networks.push(shared),
                SharedKind::Volume => self.graph.volumes.push(shared),
            }
        }
    }
}

/// Derive the graph as the closure of the primaries' link lists.
///
/// Explicit lists of every primary are scanned before any `networkMode`
/// default. Links without a catalog entry of the right kind produce no edge.
pub fn rebuild(primaries: &[PrimaryDescriptor], catalog: &[SharedDescriptor]) -> AttachmentGraph {
    let catalog = Catalog::new(catalog);
    let mut builder = GraphBuilder::default();

    for primary in primaries {
        for kind in [SharedKind::Network, SharedKind::Volume] {
            for link in primary.links(kind) {
                match catalog.find_kind(link, kind) {
                    Some(shared) => builder.add_edge(&primary.link, shared),
                    None => debug!(primary = %primary.link, %link, %kind, "Dangling link omitted"),
                }
            }
        }
    }

    for primary in primaries {
        let Some(mode) = primary.network_mode.as_deref() else {
            continue;
        };
        match catalog.network_for_mode(mode) {
            Some(network) => builder.add_edge(&primary.link, network),
            None => debug!(primary = %primary.link, mode, "Network mode has no attachment"),
        }
    }

    builder.graph
}

/// PATCH body carrying a primary's attachment fields.
///
/// A cleared mode is sent as `""`: the document store skips `null` fields
/// when merging a PATCH.
pub fn patch_body(primary: &PrimaryDescriptor) -> Value {
    json!({
        "networkLinks": primary.network_links,
        "networkMode": primary.network_mode.as_deref().unwrap_or(""),
        "volumeLinks": primary.volume_links,
    })
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentEngine {
    primaries: Vec<PrimaryDescriptor>,
    catalog: Vec<SharedDescriptor>,
    graph: AttachmentGraph,
}

impl AttachmentEngine {
    pub fn new(primaries: Vec<PrimaryDescriptor>, catalog: Vec<SharedDescriptor>) -> Self {
        let graph = rebuild(&primaries, &catalog);
        Self {
            primaries,
            catalog,
            graph,
        }
    }

    pub fn graph(&self) -> &AttachmentGraph {
        &self.graph
    }

    pub fn primaries(&self) -> &[PrimaryDescriptor] {
        &self.primaries
    }

    pub fn catalog(&self) -> &[SharedDescriptor] {
        &self.catalog
    }

    pub fn primary(&self, link: &str) -> Option<&PrimaryDescriptor> {
        self.primaries.iter().find(|p| p.link == link)
    }

    pub fn replace_primaries(&mut self, primaries: Vec<PrimaryDescriptor>) {
        self.primaries = primaries;
        self.refresh();
    }

    pub fn set_catalog(&mut self, catalog: Vec<SharedDescriptor>) {
        self.catalog = catalog;
        self.refresh();
    }

    /// Replace the primary with the same link, or append it.
    pub fn upsert_primary(&mut self, primary: PrimaryDescriptor) {
        match self.primaries.iter_mut().find(|p| p.link == primary.link) {
            Some(existing) => *existing = primary,
            None => self.primaries.push(primary),
        }
        self.refresh();
    }

    /// Add the edge `primary -> shared`. Returns `false` when nothing changed.
    pub fn attach(&mut self, primary_link: &str, shared_link: &str) -> bool {
        let Some(shared) = Catalog::new(&self.catalog).find(shared_link) else {
            warn!(primary = primary_link, shared = shared_link, "Attach to unknown shared descriptor ignored");
            return false;
        };
        let Some(primary) = self.primaries.iter_mut().find(|p| p.link == primary_link) else {
            warn!(primary = primary_link, "Attach on unknown primary ignored");
            return false;
        };
        if self.graph.has_edge(primary_link, shared_link) {
            return false;
        }

        if shared.is_system() {
            primary.network_mode = Some(shared.name.clone());
        } else {
            primary.links_mut(shared.kind).push(shared.link.clone());
        }

        debug!(primary = primary_link, shared = shared_link, kind = %shared.kind, "Attached");
        self.refresh();
        true
    }

    /// Remove the edge through every path. Returns `false` when there was none.
    pub fn detach(&mut self, primary_link: &str, shared_link: &str) -> bool {
        let mode_link = self
            .primary(primary_link)
            .and_then(|p| p.network_mode.as_deref())
            .and_then(|mode| Catalog::new(&self.catalog).network_for_mode(mode))
            .map(|network| network.link);

        let Some(primary) = self.primaries.iter_mut().find(|p| p.link == primary_link) else {
            warn!(primary = primary_link, "Detach on unknown primary ignored");
            return false;
        };

        let mut changed = false;
        for kind in [SharedKind::Network, SharedKind::Volume] {
            let links = primary.links_mut(kind);
            let before = links.len();
            links.retain(|l| l != shared_link);
            changed |= links.len() != before;
        }
        if mode_link.as_deref() == Some(shared_link) {
            primary.network_mode = None;
            changed = true;
        }

        if changed {
            debug!(primary = primary_link, shared = shared_link, "Detached");
            self.refresh();
        }
        changed
    }

    fn refresh(&mut self) {
        self.graph = rebuild(&self.primaries, &self.catalog);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDPRESS: &str = "/resources/container-descriptions/wordpress";
    const MYSQL: &str = "/resources/container-descriptions/mysql";
    const HAPROXY: &str = "/resources/container-descriptions/haproxy";
    const MYNET: &str = "/resources/network-descriptions/mynet";
    const BRIDGE: &str = "/system-networks-link/bridge";
    const DATA: &str = "/resources/volume-descriptions/data";
    const LOGS: &str = "/resources/volume-descriptions/logs";

    fn catalog() -> Vec<SharedDescriptor> {
        vec![
            SharedDescriptor::new(MYNET, "mynet", SharedKind::Network),
            SharedDescriptor::new(DATA, "data", SharedKind::Volume),
            SharedDescriptor::new(LOGS, "logs", SharedKind::Volume),
        ]
    }

    fn three_containers() -> Vec<PrimaryDescriptor> {
        vec![
            PrimaryDescriptor::new(WORDPRESS, "wordpress").with_network_mode("bridge"),
            PrimaryDescriptor::new(MYSQL, "mysql")
                .with_network_links([MYNET])
                .with_network_mode("bridge"),
            PrimaryDescriptor::new(HAPROXY, "haproxy").with_network_mode("bridge"),
        ]
    }

    fn links(graph: &AttachmentGraph, primary: &str) -> Vec<String> {
        graph.links_of(primary, SharedKind::Network).to_vec()
    }

    // ─────────────────────────────────────────────────────────
    // rebuild
    // ─────────────────────────────────────────────────────────

    #[test]
    fn explicit_links_discovered_before_defaults() {
        let graph = rebuild(&three_containers(), &catalog());

        let networks: Vec<&str> = graph.networks.iter().map(|n| n.link.as_str()).collect();
        assert_eq!(networks, vec![MYNET, BRIDGE]);
        assert_eq!(links(&graph, MYSQL), vec![MYNET, BRIDGE]);
        assert_eq!(links(&graph, WORDPRESS), vec![BRIDGE]);
        assert_eq!(links(&graph, HAPROXY), vec![BRIDGE]);
    }

    #[test]
    fn same_network_through_both_paths_counts_once() {
        let primaries = vec![PrimaryDescriptor::new(MYSQL, "mysql")
            .with_network_links([BRIDGE])
            .with_network_mode("bridge")];
        let graph = rebuild(&primaries, &catalog());
        assert_eq!(graph.networks.len(), 1);
        assert_eq!(links(&graph, MYSQL), vec![BRIDGE]);
    }

    #[test]
    fn dangling_and_wrong_kind_links_are_omitted() {
        let primaries = vec![PrimaryDescriptor::new(MYSQL, "mysql")
            .with_network_links(["/resources/network-descriptions/gone", DATA])
            .with_network_mode("none")];
        let graph = rebuild(&primaries, &catalog());
        assert!(graph.is_empty());
        assert!(graph.networks.is_empty());
    }

    #[test]
    fn mode_can_name_declared_network() {
        let primaries = vec![PrimaryDescriptor::new(MYSQL, "mysql").with_network_mode("mynet")];
        let graph = rebuild(&primaries, &catalog());
        assert_eq!(links(&graph, MYSQL), vec![MYNET]);
    }

    #[test]
    fn uppercase_mode_keeps_system_edge() {
        let primaries = vec![PrimaryDescriptor::new(MYSQL, "mysql").with_network_mode("BRIDGE")];
        let graph = rebuild(&primaries, &[]);
        assert_eq!(links(&graph, MYSQL), vec![BRIDGE]);
        assert_eq!(graph.networks[0].name, "bridge");
    }

    #[test]
    fn volumes_in_first_discovery_order() {
        let primaries = vec![
            PrimaryDescriptor::new(WORDPRESS, "wordpress").with_volume_links([LOGS]),
            PrimaryDescriptor::new(MYSQL, "mysql").with_volume_links([DATA, LOGS]),
        ];
        let graph = rebuild(&primaries, &catalog());
        let volumes: Vec<&str> = graph.volumes.iter().map(|v| v.link.as_str()).collect();
        assert_eq!(volumes, vec![LOGS, DATA]);
        assert_eq!(graph.links_of(MYSQL, SharedKind::Volume), [DATA, LOGS]);
    }

    // ─────────────────────────────────────────────────────────
    // attach / detach
    // ─────────────────────────────────────────────────────────

    #[test]
    fn attach_then_detach_wordpress() {
        let mut engine = AttachmentEngine::new(three_containers(), catalog());
        let mysql_before = links(engine.graph(), MYSQL);
        let haproxy_before = links(engine.graph(), HAPROXY);

        assert!(engine.attach(WORDPRESS, MYNET));
        assert!(engine.detach(WORDPRESS, BRIDGE));

        assert_eq!(links(engine.graph(), WORDPRESS), vec![MYNET]);
        assert_eq!(links(engine.graph(), MYSQL), mysql_before);
        assert_eq!(links(engine.graph(), HAPROXY), haproxy_before);
        assert_eq!(engine.primary(WORDPRESS).unwrap().network_mode, None);
    }

    #[test]
    fn attach_is_idempotent() {
        let mut engine = AttachmentEngine::new(three_containers(), catalog());
        assert!(engine.attach(WORDPRESS, DATA));
        let graph = engine.graph().clone();

        assert!(!engine.attach(WORDPRESS, DATA));
        assert_eq!(engine.graph(), &graph);
        assert_eq!(engine.primary(WORDPRESS).unwrap().volume_links, vec![DATA]);
    }

    #[test]
    fn detach_missing_edge_is_noop() {
        let mut engine = AttachmentEngine::new(three_containers(), catalog());
        let graph = engine.graph().clone();
        assert!(!engine.detach(WORDPRESS, MYNET));
        assert_eq!(engine.graph(), &graph);
    }

    #[test]
    fn attach_system_network_sets_mode() {
        let primaries = vec![PrimaryDescriptor::new(MYSQL, "mysql")];
        let mut engine = AttachmentEngine::new(primaries, catalog());
        assert!(engine.attach(MYSQL, "/system-networks-link/host"));

        let mysql = engine.primary(MYSQL).unwrap();
        assert_eq!(mysql.network_mode.as_deref(), Some("host"));
        assert!(mysql.network_links.is_empty());
        assert!(engine.graph().has_edge(MYSQL, "/system-networks-link/host"));
    }

    #[test]
    fn unknown_links_are_ignored() {
        let mut engine = AttachmentEngine::new(three_containers(), catalog());
        assert!(!engine.attach("/resources/container-descriptions/nope", MYNET));
        assert!(!engine.attach(WORDPRESS, "/resources/network-descriptions/nope"));
        assert!(!engine.detach("/resources/container-descriptions/nope", MYNET));
    }

    #[test]
    fn every_edge_is_named_by_its_primary() {
        let mut engine = AttachmentEngine::new(three_containers(), catalog());
        engine.attach(HAPROXY, LOGS);
        engine.detach(MYSQL, BRIDGE);

        let resolver = Catalog::new(engine.catalog());
        for (primary_link, shared_link) in engine.graph().edges() {
            let primary = engine.primary(primary_link).unwrap();
            let by_mode = primary
                .network_mode
                .as_deref()
                .and_then(|m| resolver.network_for_mode(m))
                .is_some_and(|n| n.link == shared_link);
            let explicit = primary.network_links.iter().chain(&primary.volume_links).any(|l| l == shared_link);
            assert!(by_mode || explicit, "{primary_link} -> {shared_link}");
        }
    }

    #[test]
    fn upsert_replaces_existing_primary() {
        let mut engine = AttachmentEngine::new(three_containers(), catalog());
        engine.upsert_primary(PrimaryDescriptor::new(WORDPRESS, "wordpress").with_network_links([MYNET]));
        assert_eq!(engine.primaries().len(), 3);
        assert_eq!(links(engine.graph(), WORDPRESS), vec![MYNET]);
    }

    #[test]
    fn detach_uppercase_mode_clears_it() {
        let primaries = vec![PrimaryDescriptor::new(WORDPRESS, "wordpress").with_network_mode("Bridge")];
        let mut engine = AttachmentEngine::new(primaries, catalog());
        assert!(engine.detach(WORDPRESS, BRIDGE));
        assert!(engine.graph().is_empty());
    }

    #[test]
    fn cleared_mode_is_sent_as_empty_string() {
        let mut engine = AttachmentEngine::new(three_containers(), catalog());
        assert!(engine.detach(WORDPRESS, BRIDGE));
        assert_eq!(
            patch_body(engine.primary(WORDPRESS).unwrap()),
            json!({"networkLinks": [], "networkMode": "", "volumeLinks": []})
        );
    }

    #[test]
    fn patch_body_carries_attachment_fields() {
        let primary = PrimaryDescriptor::new(MYSQL, "mysql")
            .with_network_links([MYNET])
            .with_network_mode("bridge");
        assert_eq!(
            patch_body(&primary),
            json!({"networkLinks": [MYNET], "networkMode": "bridge", "volumeLinks": []})
        );
    }
}
