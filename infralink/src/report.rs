//! Text and structured renderings for the CLI commands.

use anyhow::Result;
use health_check::HealthCheckResult;
use infralink_core::{Edge, EdgeResolver, EdgeType, Host, IpPreference, ResolveError, Topology};
use serde_json::{json, Value};
use std::io::Write;

#[derive(Debug, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn passed(&self, strict: bool) -> bool {
        self.errors.is_empty() && (!strict || self.warnings.is_empty())
    }
}

/// Cross-reference checks that need both documents. Schema problems never get
/// here; they fail the load.
pub fn validate(t: &Topology, check_resolution: bool) -> Validation {
    let res = t.resolver();
    let mut v = Validation::default();

    v.errors.extend(res.validate_all());
    v.errors.extend(res.dangling_sources());

    for edge in &t.edges {
        if let Some(target) = t.registry.get_by_id(edge.target_host().as_str()) {
            if !target.is_active() {
                v.warnings.push(format!(
                    "edge {}: target host is not active: {} ({})",
                    edge.id(),
                    target.canonical_name(),
                    target.status()
                ));
            }
        }
    }
    for (prefix, ids) in t.registry.prefix_collisions() {
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        v.warnings.push(format!("host id prefix {} is shared by: {}", prefix, ids.join(", ")));
    }

    if check_resolution {
        for edge in &t.edges {
            // dangling targets are already reported above
            if let Err(e @ ResolveError::NoAddressAvailable { .. }) =
                res.get_target_ip(edge.id().as_str(), IpPreference::default())
            {
                v.errors.push(e.to_string());
            }
        }
    }
    v
}

pub fn info_text(t: &Topology, registry_path: &str, edges_path: &str) -> String {
    let mut lines = vec![
        format!("infralink {}", infralink_core::version()),
        String::new(),
        "Registry".to_string(),
        format!("  path:          {}", registry_path),
        format!("  total hosts:   {}", t.registry.len()),
        format!("  active hosts:  {}", t.registry.active_hosts().len()),
        format!("  groups:        {}", t.registry.groups().into_iter().collect::<Vec<_>>().join(", ")),
        format!("  clouds:        {}", t.registry.clouds().into_iter().collect::<Vec<_>>().join(", ")),
        String::new(),
        "Edges".to_string(),
        format!("  path:          {}", edges_path),
        format!("  schema:        {}", t.edges.schema_version()),
        format!("  total edges:   {}", t.edges.len()),
        format!("  critical:      {}", t.edges.critical_edges().len()),
    ];
    for kind in EdgeType::ALL {
        let n = t.edges.by_type(kind).len();
        if n > 0 {
            lines.push(format!("    {:<12} {}", kind.as_str(), n));
        }
    }
    lines.join("\n")
}

fn dash(s: Option<impl ToString>) -> String {
    s.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn host_line(h: &Host) -> String {
    format!(
        "{:<28} {:<11} {:<12} {:<14} {:<16} {}",
        h.canonical_name(),
        format!("{}...", h.prefix()),
        h.status().as_str(),
        dash(h.group()),
        dash(h.cloud()),
        dash(h.tailscale_ip())
    )
}

fn sources_summary(e: &Edge) -> String {
    if e.is_wildcard_source() {
        "*".to_string()
    } else if let Some(sel) = e.selector().filter(|_| e.source_hosts().is_empty()) {
        sel.to_string()
    } else {
        e.source_hosts().len().to_string()
    }
}

pub fn edge_line(e: &Edge) -> String {
    format!(
        "{:<32} {:<11} {:<18} {:>5}  {:<9} {}",
        e.id().as_str(),
        e.kind().as_str(),
        e.target_service(),
        e.target_port(),
        e.criticality().as_str(),
        sources_summary(e)
    )
}

pub fn resolve_json(res: &EdgeResolver<'_>, edge_id: &str) -> Result<Value, ResolveError> {
    let edge = res.get_edge(edge_id)?;
    let host = res.get_target_host(edge_id)?;
    Ok(json!({
        "edge_id": edge.id(),
        "type": edge.kind(),
        "target": {
            "host_uuid": host.id(),
            "host_name": host.canonical_name(),
            "service": edge.target_service(),
            "port": edge.target_port(),
            "ip": {
                "tailscale": host.tailscale_ip(),
                "public": host.public_ip(),
                "private": host.private_ip(),
            },
        },
        "protocol": edge.protocol(),
        "criticality": edge.criticality(),
    }))
}

/// `s` as a single-quoted POSIX shell word.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Shell `export` lines, variables prefixed with the upper-cased edge id.
pub fn env_lines(
    res: &EdgeResolver<'_>,
    edge_id: &str,
    prefer: IpPreference,
    user: Option<&str>,
    database: Option<&str>,
) -> Result<Vec<String>, ResolveError> {
    let ip = res.get_target_ip(edge_id, prefer)?;
    let port = res.get_target_port(edge_id)?;
    let endpoint = res.get_target_endpoint(edge_id, prefer)?;
    let prefix: String = edge_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    let mut lines = vec![
        format!("export {}_HOST={}", prefix, ip),
        format!("export {}_PORT={}", prefix, port),
        format!("export {}_ENDPOINT={}", prefix, endpoint),
    ];
    if let Some(u) = user.filter(|u| !u.is_empty()) {
        lines.push(format!("export {}_USER={}", prefix, shell_quote(u)));
    }
    if let Some(d) = database.filter(|d| !d.is_empty()) {
        lines.push(format!("export {}_DATABASE={}", prefix, shell_quote(d)));
    }
    Ok(lines)
}

pub fn check_line(r: &HealthCheckResult) -> String {
    let status = if r.healthy { " OK " } else { "FAIL" };
    let latency = r.latency_ms.map(|ms| format!(" {:.1} ms", ms)).unwrap_or_default();
    let message = r.message.as_deref().map(|m| format!(" - {}", m)).unwrap_or_default();
    format!(
        "[{}] {} ({}, {}) {}{}{}",
        status, r.edge_id, r.check_type, r.criticality, r.target_endpoint, latency, message
    )
}

pub fn check_summary(results: &[HealthCheckResult]) -> String {
    let healthy = results.iter().filter(|r| r.healthy).count();
    let critical = results.iter().filter(|r| r.is_critical_failure()).count();
    format!("{}/{} healthy, {} critical failure(s)", healthy, results.len(), critical)
}

/// 0 when all healthy, 2 when any critical edge failed, 1 otherwise.
pub fn check_exit_code(results: &[HealthCheckResult]) -> i32 {
    if results.iter().any(|r| r.is_critical_failure()) {
        2
    } else if results.iter().any(|r| !r.healthy) {
        1
    } else {
        0
    }
}

pub fn write_check_csv<W: Write>(w: W, results: &[HealthCheckResult]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record([
        "edge_id",
        "edge_type",
        "target_endpoint",
        "healthy",
        "latency_ms",
        "message",
        "criticality",
        "check_type",
        "timestamp",
    ])?;
    for r in results {
        wtr.write_record([
            r.edge_id.clone(),
            r.edge_type.to_string(),
            r.target_endpoint.clone(),
            r.healthy.to_string(),
            r.latency_ms.map(|v| format!("{:.3}", v)).unwrap_or_default(),
            r.message.clone().unwrap_or_default(),
            r.criticality.to_string(),
            r.check_type.clone(),
            r.timestamp.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use infralink_core::load::topology_from_str;
    use infralink_core::Criticality;

    const DB: &str = "d1b9e5d5-36b0-459d-a556-96622811fbd5";
    const APP: &str = "fa2b9872-d94c-4b20-a73a-57a205560769";
    const TWIN: &str = "d1b9e5d5-0000-4000-8000-000000000000";
    const GONE: &str = "90e90e90-0000-4000-8000-000000000000";

    fn topology() -> Topology {
        let yaml = format!(
            r#"
hosts:
  {DB}:
    canonical_name: prod-database
    group: production
    cloud: hetzner-cloud
    tailscale_ip: 100.78.109.111
    public_ip: 91.99.122.86
  {APP}:
    canonical_name: prod-app
    status: terminated
    private_ip: 10.0.0.7
  {TWIN}:
    canonical_name: no-address
edges:
  - id: app-to-postgres
    type: database
    from: {{ hosts: [{APP}, {GONE}] }}
    to: {{ host: {DB}, service: postgresql, port: 5432 }}
    metadata: {{ criticality: critical }}
  - id: to-terminated
    type: api
    from: {{ selector: {{ role: web }} }}
    to: {{ host: {APP}, service: http, port: 80 }}
  - id: dangling
    type: queue
    from: {{ hosts: "*" }}
    to: {{ host: {GONE}, service: redis, port: 6379 }}
  - id: to-no-address
    type: api
    from: {{ hosts: "*" }}
    to: {{ host: {TWIN}, service: http, port: 8080 }}
"#
        );
        topology_from_str(&yaml).unwrap()
    }

    #[test]
    fn validation_collects_errors_and_warnings() {
        let t = topology();
        let v = validate(&t, false);
        assert_eq!(v.errors.len(), 2, "{:?}", v.errors);
        assert!(v.errors.iter().any(|e| e.contains("target host not found") && e.contains("dangling")));
        assert!(v.errors.iter().any(|e| e.contains("source host not found") && e.contains(GONE)));
        assert_eq!(v.warnings.len(), 2, "{:?}", v.warnings);
        assert!(v.warnings.iter().any(|w| w.contains("not active") && w.contains("prod-app")));
        assert!(v.warnings.iter().any(|w| w.contains("prefix d1b9e5d5")));
        assert!(!v.passed(false));

        let with_resolution = validate(&t, true);
        assert_eq!(with_resolution.errors.len(), 3);
        assert!(with_resolution.errors.iter().any(|e| e.contains("no IP address")));
    }

    #[test]
    fn strict_mode_fails_on_warnings() {
        let v = Validation { errors: vec![], warnings: vec!["w".into()] };
        assert!(v.passed(false));
        assert!(!v.passed(true));
    }

    #[test]
    fn resolve_renderings() {
        let t = topology();
        let res = t.resolver();
        let v = resolve_json(&res, "app-to-postgres").unwrap();
        assert_eq!(v["type"], "database");
        assert_eq!(v["criticality"], "critical");
        assert_eq!(v["target"]["host_uuid"], DB);
        assert_eq!(v["target"]["ip"]["tailscale"], "100.78.109.111");
        assert_eq!(v["protocol"], Value::Null);
        assert!(resolve_json(&res, "dangling").is_err());

        let env = env_lines(&res, "app-to-postgres", IpPreference::Public, Some("app"), None).unwrap();
        assert_eq!(
            env,
            [
                "export APP_TO_POSTGRES_HOST=91.99.122.86",
                "export APP_TO_POSTGRES_PORT=5432",
                "export APP_TO_POSTGRES_ENDPOINT=91.99.122.86:5432",
                "export APP_TO_POSTGRES_USER='app'",
            ]
        );

        let env = env_lines(&res, "app-to-postgres", IpPreference::Public, Some("o'brien $HOME"), Some("main db")).unwrap();
        assert_eq!(env[3], "export APP_TO_POSTGRES_USER='o'\\''brien $HOME'");
        assert_eq!(env[4], "export APP_TO_POSTGRES_DATABASE='main db'");
    }

    #[test]
    fn listing_lines() {
        let t = topology();
        let line = host_line(t.registry.get("prod-database").unwrap());
        assert!(line.starts_with("prod-database"));
        assert!(line.contains("d1b9e5d5..."));
        assert!(line.ends_with("100.78.109.111"));
        assert!(host_line(t.registry.get("prod-app").unwrap()).ends_with('-'));

        assert!(edge_line(t.edges.get("app-to-postgres").unwrap()).ends_with(" 2"));
        assert!(edge_line(t.edges.get("dangling").unwrap()).ends_with(" *"));
        assert!(edge_line(t.edges.get("to-terminated").unwrap()).ends_with("role=web"));
        let info = info_text(&t, "registry.yml", "edges.yml");
        assert!(info.contains("total hosts:   3"));
        assert!(info.contains("critical:      1"));
        assert!(info.contains("    api          2"));
    }

    fn result(id: &str, healthy: bool, criticality: Criticality) -> HealthCheckResult {
        HealthCheckResult {
            edge_id: id.into(),
            edge_type: EdgeType::Api,
            target_endpoint: "10.0.0.1:80".into(),
            healthy,
            latency_ms: healthy.then_some(1.5),
            message: (!healthy).then(|| "Connection refused".to_string()),
            criticality,
            check_type: "tcp".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn check_exit_codes_and_rendering() {
        let ok = result("a", true, Criticality::Critical);
        let soft = result("b", false, Criticality::Low);
        let hard = result("c", false, Criticality::Critical);
        assert_eq!(check_exit_code(&[ok.clone()]), 0);
        assert_eq!(check_exit_code(&[ok.clone(), soft.clone()]), 1);
        assert_eq!(check_exit_code(&[soft.clone(), hard.clone()]), 2);
        assert_eq!(check_exit_code(&[]), 0);

        assert_eq!(check_line(&ok), "[ OK ] a (tcp, critical) 10.0.0.1:80 1.5 ms");
        assert_eq!(check_line(&soft), "[FAIL] b (tcp, low) 10.0.0.1:80 - Connection refused");
        assert_eq!(check_summary(&[ok, soft, hard.clone()]), "1/3 healthy, 1 critical failure(s)");

        let mut buf = Vec::new();
        write_check_csv(&mut buf, &[hard]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("edge_id,edge_type,target_endpoint,healthy"));
        assert_eq!(
            lines.next().unwrap(),
            "c,api,10.0.0.1:80,false,,Connection refused,critical,tcp,2026-01-01T00:00:00Z"
        );
    }
}
