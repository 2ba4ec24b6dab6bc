//! Topology diagrams rendered from a host selection and an edge set.

pub mod dot;
pub mod mermaid;

use infralink_core::{Edge, EdgeSet, Host, HostFilter, HostStatus, Registry};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Group label for hosts without one.
pub const UNGROUPED: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Mermaid,
    Dot,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Mermaid, Format::Dot];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Mermaid => "mermaid",
            Format::Dot => "dot",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Format::Mermaid => "infrastructure.md",
            Format::Dot => "infrastructure.dot",
        }
    }

    pub fn render(&self, hosts: &[&Host], edges: &EdgeSet) -> String {
        match self {
            Format::Mermaid => mermaid::render(hosts, edges),
            Format::Dot => dot::render(hosts, edges),
        }
    }
}

/// Active hosts, or every host with `include_terminated`, narrowed to `group`.
pub fn select_hosts<'a>(registry: &'a Registry, group: Option<&str>, include_terminated: bool) -> Vec<&'a Host> {
    let mut filter = HostFilter::default();
    if !include_terminated {
        filter = filter.status(HostStatus::Active);
    }
    if let Some(g) = group {
        filter = filter.group(g);
    }
    registry.filter(&filter)
}

/// Hosts bucketed by group (sorted), each bucket sorted by canonical name.
pub(crate) fn by_group<'a>(hosts: &[&'a Host]) -> BTreeMap<&'a str, Vec<&'a Host>> {
    let mut groups: BTreeMap<&str, Vec<&Host>> = BTreeMap::new();
    for h in hosts {
        groups.entry(h.group().unwrap_or(UNGROUPED)).or_default().push(h);
    }
    for members in groups.values_mut() {
        members.sort_by(|a, b| a.canonical_name().cmp(b.canonical_name()));
    }
    groups
}

/// One drawn arrow: the first edge seen for a (source, target) pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Connection<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub edge: &'a Edge,
}

/// Connections between selected hosts. Only explicit source lists are drawn;
/// wildcard and selector sources would connect everything to everything.
pub(crate) fn connections<'a>(hosts: &[&'a Host], edges: &'a EdgeSet) -> Vec<Connection<'a>> {
    let selected: HashSet<&str> = hosts.iter().map(|h| h.id().as_str()).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for edge in edges {
        if edge.is_wildcard_source() {
            continue;
        }
        let target = edge.target_host().as_str();
        for source in edge.source_hosts() {
            let source = source.as_str();
            if !seen.insert((source, target)) {
                continue;
            }
            if selected.contains(source) && selected.contains(target) {
                out.push(Connection { source, target, edge });
            }
        }
    }
    out
}

/// `s` with every character outside `[A-Za-z0-9]` replaced by `_`.
pub(crate) fn ident(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}

/// Diagram node identifiers keyed by host id. A host's short id is used when
/// it is unique within the selection, otherwise its full id, then a counter.
pub(crate) struct NodeIds<'a> {
    ids: HashMap<&'a str, String>,
}

impl<'a> NodeIds<'a> {
    pub fn new(hosts: &[&'a Host]) -> Self {
        let mut taken: HashMap<String, usize> = HashMap::new();
        for h in hosts {
            *taken.entry(ident(h.prefix())).or_default() += 1;
        }
        let mut used = HashSet::new();
        let mut ids = HashMap::new();
        for h in hosts {
            let short = ident(h.prefix());
            let mut id = if taken.get(&short).copied().unwrap_or(0) > 1 { ident(h.id().as_str()) } else { short };
            if !used.insert(id.clone()) {
                let base = id.clone();
                let mut n = 2;
                while !used.insert(format!("{}_{}", base, n)) {
                    n += 1;
                }
                id = format!("{}_{}", base, n);
            }
            ids.insert(h.id().as_str(), id);
        }
        NodeIds { ids }
    }

    pub fn get<'s>(&'s self, host_id: &'s str) -> &'s str {
        self.ids.get(host_id).map(String::as_str).unwrap_or(host_id)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use infralink_core::load::topology_from_str;
    use infralink_core::Topology;

    pub const DB: &str = "d1b9e5d5-36b0-459d-a556-96622811fbd5";
    pub const APP: &str = "fa2b9872-d94c-4b20-a73a-57a205560769";
    pub const OLD: &str = "0a1d0000-0000-4000-8000-000000000000";

    pub fn topology() -> Topology {
        let yaml = format!(
            r#"
hosts:
  {DB}:
    canonical_name: prod-database
    group: production
    tailscale_ip: 100.78.109.111
  {APP}:
    canonical_name: prod-app
    group: production
  {OLD}:
    canonical_name: old-box
    status: terminated
edges:
  - id: app-to-postgres
    type: database
    from: {{ hosts: [{APP}] }}
    to: {{ host: {DB}, service: postgresql, port: 5432 }}
    metadata: {{ criticality: critical }}
  - id: app-to-redis
    type: queue
    from: {{ hosts: [{APP}] }}
    to: {{ host: {DB}, service: redis, port: 6379 }}
  - id: all-to-db
    type: telemetry
    from: {{ hosts: "*" }}
    to: {{ host: {DB}, service: otel, port: 4317 }}
  - id: old-to-db
    type: api
    from: {{ hosts: [{OLD}] }}
    to: {{ host: {DB}, service: http, port: 80 }}
"#
        );
        topology_from_str(&yaml).unwrap()
    }
}
