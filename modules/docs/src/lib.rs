//! Markdown reference pages: one page per host, a host index and an edge index.
//!
//! Renderers are pure; the caller supplies the `generated` stamp written into
//! each page footer (see [`generated_at`]).

use infralink_core::{Edge, EdgeSet, EdgeType, Host, HostFilter, Registry};
use std::fmt::Write;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const INDEX_FILE: &str = "index.md";
/// Edge index location, relative to the output directory.
pub const EDGE_INDEX_FILE: &str = "edges/index.md";
/// Source hosts listed by name before the rest are summarised.
const SOURCE_PREVIEW: usize = 3;
const SERVICE_PREVIEW: usize = 3;
const NOT_AVAILABLE: &str = "N/A";

pub fn generated_at() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

/// File name of a host's page.
pub fn page_file_name(host: &Host) -> String {
    let stem: String = host
        .canonical_name()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{}.md", stem)
}

/// Escape a value for use inside a Markdown table cell.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn or_dash(s: Option<&str>) -> String {
    s.map(cell).unwrap_or_else(|| "-".to_string())
}

fn host_name(registry: &Registry, id: &str) -> String {
    match registry.get_by_id(id) {
        Some(h) => cell(h.canonical_name()),
        None => id.chars().take(infralink_core::ids::HOST_ID_PREFIX_LEN).collect(),
    }
}

fn sources_cell(edge: &Edge, registry: &Registry) -> String {
    if edge.is_wildcard_source() {
        return "*".to_string();
    }
    if let Some(sel) = edge.selector() {
        return cell(&sel.to_string());
    }
    let ids = edge.source_hosts();
    let mut out = ids
        .iter()
        .take(SOURCE_PREVIEW)
        .map(|id| host_name(registry, id.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    if ids.len() > SOURCE_PREVIEW {
        let _ = write!(out, " (+{} more)", ids.len() - SOURCE_PREVIEW);
    }
    if out.is_empty() {
        out.push('-');
    }
    out
}

fn footer(out: &mut String, generated: &str) {
    let _ = write!(out, "---\n*Generated: {}*\n", generated);
}

pub fn host_page(host: &Host, edges: &EdgeSet, registry: &Registry, generated: &str) -> String {
    let mut out = String::new();
    let addr = |ip: Option<std::net::IpAddr>| ip.map(|ip| ip.to_string()).unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let _ = writeln!(out, "# {}\n", host.canonical_name());
    let _ = writeln!(out, "**UUID:** `{}`  ", host.id());
    let _ = writeln!(out, "**Status:** {}  ", host.status().as_str());
    let _ = writeln!(out, "**Cloud:** {}  ", host.cloud().unwrap_or("unknown"));
    let _ = writeln!(out, "**Group:** {}  \n", host.group().unwrap_or("unknown"));

    out.push_str("## Network\n\n| Type | Address |\n|------|---------|\n");
    let _ = writeln!(out, "| Tailscale | `{}` |", addr(host.tailscale_ip()));
    let _ = writeln!(out, "| Public IPv4 | `{}` |", addr(host.public_ip()));
    let _ = writeln!(out, "| Private | `{}` |\n", addr(host.private_ip()));

    out.push_str("## Services\n\n");
    if host.services().is_empty() {
        out.push_str("*No services declared*\n\n");
    } else {
        out.push_str("| Service | Port | Protocol | Inbound Edges |\n|---------|------|----------|---------------|\n");
        for (name, svc) in host.services() {
            let inbound = edges
                .targeting_service(name)
                .into_iter()
                .filter(|e| e.target_host() == host.id())
                .count();
            let port = svc.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
            let _ = writeln!(out, "| {} | {} | {} | {} |", cell(name), port, cell(&svc.protocol), inbound);
        }
        out.push('\n');
    }

    let inbound = edges.targeting_host(host.id().as_str());
    if !inbound.is_empty() {
        out.push_str("## Inbound Connections\n\n");
        out.push_str("| Source | Service | Port | Protocol | Criticality |\n");
        out.push_str("|--------|---------|------|----------|-------------|\n");
        for e in inbound {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                sources_cell(e, registry),
                cell(e.target_service()),
                e.target_port(),
                or_dash(e.protocol()),
                e.criticality().as_str()
            );
        }
        out.push('\n');
    }

    let outbound = edges.from_host(host.id().as_str());
    if !outbound.is_empty() {
        out.push_str("## Outbound Connections\n\n");
        out.push_str("| Target | Service | Port | Purpose |\n|--------|---------|------|---------|\n");
        for e in outbound {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                host_name(registry, e.target_host().as_str()),
                cell(e.target_service()),
                e.target_port(),
                or_dash(e.purpose())
            );
        }
        out.push('\n');
    }

    footer(&mut out, generated);
    out
}

/// Host index: active hosts linked to their pages, plus per-group and
/// per-cloud active counts.
pub fn host_index(registry: &Registry, edges: &EdgeSet, generated: &str) -> String {
    let mut active = registry.active_hosts();
    active.sort_by(|a, b| a.canonical_name().cmp(b.canonical_name()));

    let mut out = String::from("# Infrastructure Host Index\n\n");
    let _ = writeln!(out, "Total hosts: {} ({} active)  ", registry.len(), active.len());
    let _ = writeln!(out, "Total edges: {}  \n", edges.len());

    out.push_str("## Active Hosts\n\n| Host | UUID | Group | Cloud | Services |\n");
    out.push_str("|------|------|-------|-------|----------|\n");
    for h in &active {
        let names: Vec<&str> = h.services().keys().map(String::as_str).collect();
        let mut services = names.iter().take(SERVICE_PREVIEW).copied().collect::<Vec<_>>().join(", ");
        if names.len() > SERVICE_PREVIEW {
            services.push_str("...");
        }
        let _ = writeln!(
            out,
            "| [{}]({}) | `{}...` | {} | {} | {} |",
            cell(h.canonical_name()),
            page_file_name(h),
            h.prefix(),
            or_dash(h.group()),
            or_dash(h.cloud()),
            cell(&services)
        );
    }

    out.push_str("\n## By Group\n\n");
    for g in registry.groups() {
        let n = registry.filter(&HostFilter::default().group(g)).iter().filter(|h| h.is_active()).count();
        let _ = writeln!(out, "- **{}**: {} active hosts", g, n);
    }
    out.push_str("\n## By Cloud Provider\n\n");
    for c in registry.clouds() {
        let n = registry.filter(&HostFilter::default().cloud(c)).iter().filter(|h| h.is_active()).count();
        let _ = writeln!(out, "- **{}**: {} active hosts", c, n);
    }
    out.push('\n');
    footer(&mut out, generated);
    out
}

/// Edge index sorted by id, with per-type counts. Source column shows `*` for
/// wildcards, the selector for selector edges, else the number of listed hosts.
pub fn edge_index(edges: &EdgeSet, registry: &Registry, generated: &str) -> String {
    let mut out = String::from("# Infrastructure Edge Index\n\n");
    let _ = writeln!(out, "Total edges: {}  ", edges.len());
    let _ = writeln!(out, "Critical edges: {}  \n", edges.critical_edges().len());

    out.push_str("## All Edges\n\n| ID | Type | Target | Port | Criticality | Sources |\n");
    out.push_str("|----|------|--------|------|-------------|---------|\n");
    let mut sorted: Vec<&Edge> = edges.iter().collect();
    sorted.sort_by(|a, b| a.id().cmp(b.id()));
    for e in sorted {
        let sources = if e.is_wildcard_source() {
            "*".to_string()
        } else if let Some(sel) = e.selector() {
            cell(&sel.to_string())
        } else {
            e.source_hosts().len().to_string()
        };
        let _ = writeln!(
            out,
            "| {} | {} | {}/{} | {} | {} | {} |",
            cell(e.id().as_str()),
            e.kind().as_str(),
            host_name(registry, e.target_host().as_str()),
            cell(e.target_service()),
            e.target_port(),
            e.criticality().as_str(),
            sources
        );
    }

    out.push_str("\n## By Type\n\n");
    for kind in EdgeType::ALL {
        let n = edges.by_type(kind).len();
        if n > 0 {
            let _ = writeln!(out, "- **{}**: {} edges", kind.as_str(), n);
        }
    }
    out.push('\n');
    footer(&mut out, generated);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use infralink_core::load::topology_from_str;
    use infralink_core::Topology;

    const DB: &str = "d1b9e5d5-36b0-459d-a556-96622811fbd5";
    const APP: &str = "fa2b9872-d94c-4b20-a73a-57a205560769";
    const OLD: &str = "0a1d0000-0000-4000-8000-000000000000";
    const STAMP: &str = "2026-01-01T00:00:00Z";

    fn topology() -> Topology {
        let yaml = format!(
            r#"
hosts:
  {DB}:
    canonical_name: prod-database
    group: production
    cloud: hetzner
    tailscale_ip: 100.78.109.111
    public_ip: 91.99.122.86
    services:
      postgresql: {{ port: 5432 }}
      redis: {{ port: 6379 }}
  {APP}:
    canonical_name: prod-app
    group: production
    cloud: hetzner
    services: [web, worker, cron, metrics]
  {OLD}:
    canonical_name: old-box
    status: terminated
edges:
  - id: app-to-postgres
    type: database
    from: {{ hosts: [{APP}] }}
    to: {{ host: {DB}, service: postgresql, port: 5432 }}
    protocol: postgresql
    metadata: {{ criticality: critical, purpose: primary store }}
  - id: all-to-redis
    type: queue
    from: {{ hosts: "*" }}
    to: {{ host: {DB}, service: redis, port: 6379 }}
  - id: monitors-to-db
    type: monitoring
    from: {{ selector: {{ role: monitor }} }}
    to: {{ host: {DB}, service: exporter, port: 9100 }}
  - id: many-to-db
    type: telemetry
    from: {{ hosts: [{APP}, {OLD}, 11111111-0000-4000-8000-000000000000, 22222222-0000-4000-8000-000000000000] }}
    to: {{ host: {DB}, service: postgresql, port: 5432 }}
"#
        );
        topology_from_str(&yaml).unwrap()
    }

    #[test]
    fn host_page_network_and_services() {
        let t = topology();
        let db = t.registry.get_by_id(DB).unwrap();
        let page = host_page(db, &t.edges, &t.registry, STAMP);
        assert!(page.starts_with("# prod-database\n\n**UUID:** `d1b9e5d5-36b0-459d-a556-96622811fbd5`  \n"));
        assert!(page.contains("**Status:** active  \n**Cloud:** hetzner  \n**Group:** production  \n"));
        assert!(page.contains(
            "| Type | Address |\n|------|---------|\n| Tailscale | `100.78.109.111` |\n| Public IPv4 | `91.99.122.86` |\n| Private | `N/A` |\n"
        ));
        assert!(page.contains("| postgresql | 5432 | tcp | 2 |\n"));
        assert!(page.contains("| redis | 6379 | tcp | 1 |\n"));
        assert!(page.ends_with("---\n*Generated: 2026-01-01T00:00:00Z*\n"));
    }

    #[test]
    fn host_page_inbound_rows() {
        let t = topology();
        let page = host_page(t.registry.get_by_id(DB).unwrap(), &t.edges, &t.registry, STAMP);
        assert!(page.contains("## Inbound Connections\n\n| Source | Service | Port | Protocol | Criticality |\n"));
        assert!(page.contains("| prod-app | postgresql | 5432 | postgresql | critical |\n"));
        assert!(page.contains("| * | redis | 6379 | - | medium |\n"));
        assert!(page.contains("| role=monitor | exporter | 9100 | - | medium |\n"));
        assert!(page.contains("| prod-app, old-box, 11111111 (+1 more) | postgresql | 5432 | - | medium |\n"));
        assert!(!page.contains("## Outbound Connections"));
    }

    #[test]
    fn host_page_outbound_rows() {
        let t = topology();
        let app = t.registry.get_by_id(APP).unwrap();
        let page = host_page(app, &t.edges, &t.registry, STAMP);
        assert!(page.contains("## Outbound Connections\n\n| Target | Service | Port | Purpose |\n|--------|---------|------|---------|\n"));
        assert!(page.contains("| prod-database | postgresql | 5432 | primary store |\n"));
        assert!(page.contains("| prod-database | redis | 6379 | - |\n"));
        assert!(page.contains("| web | - | tcp | 0 |\n"));
        assert!(!page.contains("## Inbound Connections"));

        let old = host_page(t.registry.get_by_id(OLD).unwrap(), &t.edges, &t.registry, STAMP);
        assert!(old.contains("*No services declared*"));
        assert!(old.contains("**Cloud:** unknown  "));
    }

    #[test]
    fn host_index_tables() {
        let t = topology();
        let idx = host_index(&t.registry, &t.edges, STAMP);
        assert!(idx.contains("Total hosts: 3 (2 active)  \nTotal edges: 4  \n"));
        assert!(idx.contains("| [prod-app](prod-app.md) | `fa2b9872...` | production | hetzner | cron, metrics, web... |\n"));
        assert!(idx.contains("| [prod-database](prod-database.md) | `d1b9e5d5...` | production | hetzner | postgresql, redis |\n"));
        assert!(!idx.contains("old-box"));
        assert!(idx.contains("## By Group\n\n- **production**: 2 active hosts\n"));
        assert!(idx.contains("## By Cloud Provider\n\n- **hetzner**: 2 active hosts\n"));
    }

    #[test]
    fn edge_index_rows_and_types() {
        let t = topology();
        let idx = edge_index(&t.edges, &t.registry, STAMP);
        assert!(idx.contains("Total edges: 4  \nCritical edges: 1  \n"));
        let rows: Vec<&str> = idx.lines().filter(|l| l.starts_with("| ") && !l.starts_with("| ID")).collect();
        assert_eq!(
            rows,
            [
                "| all-to-redis | queue | prod-database/redis | 6379 | medium | * |",
                "| app-to-postgres | database | prod-database/postgresql | 5432 | critical | 1 |",
                "| many-to-db | telemetry | prod-database/postgresql | 5432 | medium | 4 |",
                "| monitors-to-db | monitoring | prod-database/exporter | 9100 | medium | role=monitor |",
            ]
        );
        assert!(idx.contains("## By Type\n\n- **database**: 1 edges\n- **queue**: 1 edges\n"));
        assert!(!idx.contains("**cluster**"));
    }

    #[test]
    fn cells_and_file_names_are_safe() {
        assert_eq!(cell("a|b\nc"), "a\\|b c");
        let t = topology_from_str("hosts:\n  aaaaaaaa-0-0-0-1:\n    canonical_name: edge/01 eu\n").unwrap();
        assert_eq!(page_file_name(t.registry.get_by_id("aaaaaaaa-0-0-0-1").unwrap()), "edge_01_eu.md");
        assert!(generated_at().ends_with('Z'));
    }
}
