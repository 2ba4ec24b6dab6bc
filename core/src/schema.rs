//! Raw YAML shapes and the validation pass that turns them into typed records.
//!
//! Each host and edge is deserialized on its own so one malformed entry yields a
//! field-level error instead of failing the whole document. Legacy list forms of
//! `services` and `roles` are normalized here; nothing downstream branches on
//! input format.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use crate::edge::{
    parse_duration, AuthSpec, AuthType, CheckType, Criticality, Edge, EdgeMetadata, EdgeSource,
    EdgeTarget, EdgeType, HealthCheckSpec, Selector, SourceHosts, WILDCARD,
};
use crate::error::FieldError;
use crate::host::{Host, HostMetadata, HostStatus, Network, Observability, SecretScope, ServiceSpec};
use crate::ids::{EdgeId, HostId};

pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawRegistryFile {
    #[serde(default)]
    pub hosts: Mapping,
    #[serde(default)]
    pub ansible_defaults: Option<Map<String, JsonValue>>,
    #[serde(default)]
    pub edges: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawEdgeFile {
    #[serde(default)]
    pub schema_version: Option<Value>,
    #[serde(default)]
    pub edges: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHost {
    canonical_name: Option<String>,
    status: Option<String>,
    group: Option<String>,
    cloud: Option<String>,
    tailscale_ip: Option<String>,
    tailscale_name: Option<String>,
    public_ip: Option<String>,
    public_ipv6: Option<String>,
    private_ip: Option<String>,
    services: Option<RawServices>,
    roles: Option<RawRoles>,
    bws_project: Option<String>,
    bws_machine_account: Option<String>,
    #[serde(default)]
    bws_extra_projects: Vec<String>,
    observability: Option<Observability>,
    #[serde(default)]
    dns_hostnames: Vec<String>,
    docker_version: Option<String>,
    created: Option<Value>,
    updated: Option<Value>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawServices {
    Names(Vec<String>),
    Specs(BTreeMap<String, Option<ServiceSpec>>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRoles {
    Names(Vec<String>),
    Configs(BTreeMap<String, Option<Map<String, JsonValue>>>),
}

#[derive(Debug, Default, Deserialize)]
struct RawEdge {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(alias = "from_")]
    from: Option<RawSource>,
    to: Option<RawTarget>,
    protocol: Option<String>,
    auth: Option<RawAuth>,
    healthcheck: Option<RawHealthCheck>,
    metadata: Option<RawEdgeMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSource {
    hosts: Option<RawSourceHosts>,
    selector: Option<Mapping>,
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSourceHosts {
    Listed(Vec<String>),
    Sentinel(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawTarget {
    host: Option<String>,
    service: Option<String>,
    port: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuth {
    #[serde(rename = "type")]
    kind: Option<String>,
    secret_ref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHealthCheck {
    #[serde(rename = "type")]
    kind: Option<String>,
    interval: Option<Value>,
    timeout: Option<Value>,
    path: Option<String>,
    query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEdgeMetadata {
    purpose: Option<String>,
    criticality: Option<String>,
    owner: Option<String>,
    runbook: Option<String>,
    documentation: Option<String>,
    source: Option<String>,
    notes: Option<String>,
}

/// Strings and numbers as text; anything else is rejected.
pub(crate) fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_ip(raw: Option<String>, path: String, errors: &mut Vec<FieldError>) -> Option<IpAddr> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            errors.push(FieldError::new(path, format!("invalid IP address {:?}", raw)));
            None
        }
    }
}

fn normalize_services(raw: Option<RawServices>) -> BTreeMap<String, ServiceSpec> {
    match raw {
        None => BTreeMap::new(),
        Some(RawServices::Names(names)) => {
            names.into_iter().map(|n| (n, ServiceSpec::default())).collect()
        }
        Some(RawServices::Specs(specs)) => {
            specs.into_iter().map(|(n, s)| (n, s.unwrap_or_default())).collect()
        }
    }
}

fn normalize_roles(raw: Option<RawRoles>) -> BTreeMap<String, Map<String, JsonValue>> {
    match raw {
        None => BTreeMap::new(),
        Some(RawRoles::Names(names)) => names.into_iter().map(|n| (n, Map::new())).collect(),
        Some(RawRoles::Configs(cfgs)) => {
            cfgs.into_iter().map(|(n, c)| (n, c.unwrap_or_default())).collect()
        }
    }
}

/// Validate the `hosts` mapping, keeping its declaration order.
pub fn validate_hosts(hosts: &Mapping) -> Result<Vec<Host>, Vec<FieldError>> {
    let mut out = Vec::with_capacity(hosts.len());
    let mut errors = Vec::new();
    for (key, value) in hosts {
        let Some(key) = key.as_str() else {
            errors.push(FieldError::new("hosts", format!("host key must be a string, got {:?}", key)));
            continue;
        };
        if let Some(host) = validate_host(key, value, &mut errors) {
            out.push(host);
        }
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

fn validate_host(key: &str, value: &Value, errors: &mut Vec<FieldError>) -> Option<Host> {
    let base = format!("hosts.{}", key);
    let id = HostId::parse(key);
    if id.is_none() {
        errors.push(FieldError::new(&base, format!("invalid host id format: {}", key)));
    }
    let raw: RawHost = match serde_yaml::from_value(value.clone()) {
        Ok(r) => r,
        Err(e) => {
            errors.push(FieldError::new(&base, e.to_string()));
            return None;
        }
    };
    let before = errors.len();

    let canonical_name = match raw.canonical_name.filter(|n| !n.trim().is_empty()) {
        Some(n) => n,
        None => {
            errors.push(FieldError::new(format!("{}.canonical_name", base), "missing required field"));
            String::new()
        }
    };
    let status = match raw.status.as_deref() {
        None => HostStatus::default(),
        Some(s) => HostStatus::parse(s).unwrap_or_else(|| {
            errors.push(FieldError::new(format!("{}.status", base), format!("unknown status {:?}", s)));
            HostStatus::default()
        }),
    };
    let network = Network {
        tailscale_ip: parse_ip(raw.tailscale_ip, format!("{}.tailscale_ip", base), errors),
        tailscale_name: raw.tailscale_name,
        public_ip: parse_ip(raw.public_ip, format!("{}.public_ip", base), errors),
        public_ipv6: raw.public_ipv6,
        private_ip: parse_ip(raw.private_ip, format!("{}.private_ip", base), errors),
    };

    if errors.len() > before {
        return None;
    }
    Some(Host {
        id: id?,
        canonical_name,
        status,
        group: raw.group,
        cloud: raw.cloud,
        network,
        services: normalize_services(raw.services),
        roles: normalize_roles(raw.roles),
        observability: raw.observability,
        secrets: SecretScope {
            project: raw.bws_project,
            machine_account: raw.bws_machine_account,
            extra_projects: raw.bws_extra_projects,
        },
        metadata: HostMetadata {
            dns_hostnames: raw.dns_hostnames,
            docker_version: raw.docker_version,
            created: raw.created.as_ref().and_then(scalar_string),
            updated: raw.updated.as_ref().and_then(scalar_string),
            notes: raw.notes,
        },
    })
}

/// Validate an ordered edge list. Duplicate ids produce one error per repeat.
pub fn validate_edges(edges: &[Value]) -> Result<Vec<Edge>, Vec<FieldError>> {
    let mut out = Vec::with_capacity(edges.len());
    let mut errors = Vec::new();
    let mut seen: HashSet<EdgeId> = HashSet::new();
    for (i, value) in edges.iter().enumerate() {
        let Some(edge) = validate_edge(i, value, &mut errors) else { continue };
        if !seen.insert(edge.id.clone()) {
            errors.push(FieldError::new(
                format!("edges[{}].id", i),
                format!("duplicate edge id {:?}", edge.id.as_str()),
            ));
            continue;
        }
        out.push(edge);
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

fn validate_edge(i: usize, value: &Value, errors: &mut Vec<FieldError>) -> Option<Edge> {
    let base = format!("edges[{}]", i);
    let raw: RawEdge = match serde_yaml::from_value(value.clone()) {
        Ok(r) => r,
        Err(e) => {
            errors.push(FieldError::new(&base, e.to_string()));
            return None;
        }
    };
    let before = errors.len();
    let mut fail = |field: &str, msg: String| errors.push(FieldError::new(format!("{}.{}", base, field), msg));

    let id = raw.id.as_deref().and_then(EdgeId::parse);
    if id.is_none() {
        fail("id", "missing required field".into());
    }
    let kind = match raw.kind.as_deref() {
        Some(k) => EdgeType::parse(k).or_else(|| {
            fail("type", format!("unknown edge type {:?}", k));
            None
        }),
        None => {
            fail("type", "missing required field".into());
            None
        }
    };

    let source = match raw.from {
        None => {
            fail("from", "missing required field".into());
            None
        }
        Some(src) => validate_source(src, &mut fail),
    };
    let target = match raw.to {
        None => {
            fail("to", "missing required field".into());
            None
        }
        Some(to) => validate_target(to, &mut fail),
    };

    let auth = match raw.auth {
        None => AuthSpec::default(),
        Some(a) => AuthSpec {
            kind: match a.kind.as_deref() {
                None => AuthType::default(),
                Some(k) => parse_lower::<AuthType>(k).unwrap_or_else(|| {
                    fail("auth.type", format!("unknown auth type {:?}", k));
                    AuthType::default()
                }),
            },
            secret_ref: a.secret_ref,
        },
    };

    let healthcheck = match raw.healthcheck {
        None => HealthCheckSpec::default(),
        Some(h) => {
            let defaults = HealthCheckSpec::default();
            HealthCheckSpec {
                kind: match h.kind.as_deref() {
                    None => CheckType::default(),
                    Some(k) => parse_lower::<CheckType>(k).unwrap_or_else(|| {
                        fail("healthcheck.type", format!("unknown check type {:?}", k));
                        CheckType::default()
                    }),
                },
                interval: duration_field(h.interval, defaults.interval, "healthcheck.interval", &mut fail),
                timeout: duration_field(h.timeout, defaults.timeout, "healthcheck.timeout", &mut fail),
                path: h.path,
                query: h.query,
            }
        }
    };

    let metadata = match raw.metadata {
        None => EdgeMetadata::default(),
        Some(m) => EdgeMetadata {
            criticality: match m.criticality.as_deref() {
                None => Criticality::default(),
                Some(c) => Criticality::parse(c).unwrap_or_else(|| {
                    fail("metadata.criticality", format!("unknown criticality {:?}", c));
                    Criticality::default()
                }),
            },
            purpose: m.purpose,
            owner: m.owner,
            runbook: m.runbook,
            documentation: m.documentation,
            source: m.source,
            notes: m.notes,
        },
    };

    if errors.len() > before {
        return None;
    }
    Some(Edge {
        id: id?,
        kind: kind?,
        source: source?,
        target: target?,
        protocol: raw.protocol.filter(|p| !p.trim().is_empty()),
        auth,
        healthcheck,
        metadata,
    })
}

fn parse_lower<T: serde::de::DeserializeOwned>(s: &str) -> Option<T> {
    serde_yaml::from_value(Value::String(s.trim().to_ascii_lowercase())).ok()
}

fn duration_field(
    raw: Option<Value>,
    default: std::time::Duration,
    field: &str,
    fail: &mut impl FnMut(&str, String),
) -> std::time::Duration {
    let Some(raw) = raw else { return default };
    match scalar_string(&raw).as_deref().and_then(parse_duration) {
        Some(d) => d,
        None => {
            fail(field, format!("invalid duration {:?}", raw));
            default
        }
    }
}

fn validate_source(src: RawSource, fail: &mut impl FnMut(&str, String)) -> Option<EdgeSource> {
    let hosts = match src.hosts {
        None => SourceHosts::default(),
        Some(RawSourceHosts::Sentinel(s)) if s.trim() == WILDCARD => SourceHosts::Wildcard,
        Some(RawSourceHosts::Sentinel(s)) => {
            fail("from.hosts", format!("expected a host list or {:?}, got {:?}", WILDCARD, s));
            return None;
        }
        Some(RawSourceHosts::Listed(ids)) => {
            let mut parsed = Vec::with_capacity(ids.len());
            for (j, raw) in ids.iter().enumerate() {
                match HostId::parse(raw) {
                    Some(id) => parsed.push(id),
                    None => fail(&format!("from.hosts[{}]", j), format!("invalid host id format: {}", raw)),
                }
            }
            if parsed.len() != ids.len() {
                return None;
            }
            SourceHosts::Listed(parsed)
        }
    };
    let selector = match src.selector {
        None => None,
        Some(map) => Some(parse_selector(&map, fail)?),
    };
    Some(EdgeSource { hosts, selector, service: src.service })
}

/// Key precedence: `role`, then `service`, then `observability.ready`.
fn parse_selector(map: &Mapping, fail: &mut impl FnMut(&str, String)) -> Option<Selector> {
    let text = |key: &str| map.get(key).map(|v| scalar_string(v).unwrap_or_default());
    if let Some(role) = text("role") {
        return non_empty(role, "from.selector.role", fail).map(Selector::Role);
    }
    if let Some(service) = text("service") {
        return non_empty(service, "from.selector.service", fail).map(Selector::Service);
    }
    if map.contains_key("observability.ready") {
        return Some(Selector::ObservabilityReady);
    }
    fail(
        "from.selector",
        "unsupported selector; expected one of role, service, observability.ready".into(),
    );
    None
}

fn non_empty(v: String, field: &str, fail: &mut impl FnMut(&str, String)) -> Option<String> {
    if v.trim().is_empty() {
        fail(field, "must be a non-empty string".into());
        return None;
    }
    Some(v)
}

fn validate_target(to: RawTarget, fail: &mut impl FnMut(&str, String)) -> Option<EdgeTarget> {
    let host = match to.host.as_deref() {
        None => {
            fail("to.host", "missing required field".into());
            None
        }
        Some(h) => HostId::parse(h).or_else(|| {
            fail("to.host", format!("invalid host id format: {}", h));
            None
        }),
    };
    let service = to.service.filter(|s| !s.trim().is_empty()).or_else(|| {
        fail("to.service", "missing required field".into());
        None
    });
    let port = match to.port {
        None => {
            fail("to.port", "missing required field".into());
            None
        }
        Some(p) => match u16::try_from(p) {
            Ok(p) if p > 0 => Some(p),
            _ => {
                fail("to.port", format!("port out of range: {}", p));
                None
            }
        },
    };
    Some(EdgeTarget { host: host?, service: service?, port: port? })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn edge_list(yaml: &str) -> Vec<Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn legacy_service_and_role_lists_are_normalized() {
        let hosts = validate_hosts(&mapping(
            r#"
d1b9e5d5-36b0-459d-a556-96622811fbd5:
  canonical_name: db
  services: [postgresql, redis]
  roles: [app-worker]
fa2b9872-d94c-4b20-a73a-57a205560769:
  canonical_name: app
  services:
    nginx: { port: 443, protocol: https }
    app:
  roles:
    app-worker: { concurrency: 10 }
"#,
        ))
        .unwrap();
        assert_eq!(hosts.len(), 2);
        assert!(hosts[0].has_service("redis"));
        assert_eq!(hosts[0].services()["postgresql"].protocol, "tcp");
        assert!(hosts[0].has_role("app-worker"));
        assert_eq!(hosts[1].services()["nginx"].port, Some(443));
        assert!(hosts[1].has_service("app"));
        assert_eq!(hosts[1].roles()["app-worker"]["concurrency"], 10);
    }

    #[test]
    fn host_errors_are_collected_per_field() {
        let errs = validate_hosts(&mapping(
            r#"
not-a-uuid:
  canonical_name: x
d1b9e5d5-36b0-459d-a556-96622811fbd5:
  status: exploded
  tailscale_ip: 300.1.1.1
"#,
        ))
        .unwrap_err();
        let paths: Vec<_> = errs.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"hosts.not-a-uuid"));
        assert!(paths.contains(&"hosts.d1b9e5d5-36b0-459d-a556-96622811fbd5.canonical_name"));
        assert!(paths.contains(&"hosts.d1b9e5d5-36b0-459d-a556-96622811fbd5.status"));
        assert!(paths.contains(&"hosts.d1b9e5d5-36b0-459d-a556-96622811fbd5.tailscale_ip"));
    }

    #[test]
    fn edge_defaults_are_applied() {
        let edges = validate_edges(&edge_list(
            r#"
- id: app-to-postgres
  type: database
  from: { hosts: [fa2b9872-d94c-4b20-a73a-57a205560769] }
  to: { host: d1b9e5d5-36b0-459d-a556-96622811fbd5, service: postgresql, port: 5432 }
"#,
        ))
        .unwrap();
        let e = &edges[0];
        assert_eq!(e.criticality(), Criticality::Medium);
        assert_eq!(e.healthcheck().kind, CheckType::Tcp);
        assert_eq!(e.healthcheck().timeout, std::time::Duration::from_secs(5));
        assert_eq!(e.auth().kind, AuthType::None);
        assert_eq!(e.protocol(), None);
    }

    #[test]
    fn missing_target_is_structural_error() {
        let errs = validate_edges(&edge_list(
            r#"
- id: broken
  type: database
  from: { hosts: "*" }
"#,
        ))
        .unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "edges[0].to");
    }

    #[test]
    fn missing_port_is_rejected() {
        let errs = validate_edges(&edge_list(
            r#"
- id: broken
  type: database
  from: {}
  to: { host: d1b9e5d5-36b0-459d-a556-96622811fbd5, service: postgresql }
"#,
        ))
        .unwrap_err();
        assert_eq!(errs[0].path, "edges[0].to.port");
    }

    #[test]
    fn duplicate_edge_ids_flagged_once_per_repeat() {
        let one = r#"
- id: dup
  type: queue
  from: { hosts: "*" }
  to: { host: d1b9e5d5-36b0-459d-a556-96622811fbd5, service: redis, port: 6379 }
"#;
        let mut list = edge_list(one);
        list.extend(edge_list(one));
        list.extend(edge_list(one));
        let errs = validate_edges(&list).unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.message.contains("duplicate edge id")));
    }

    #[test]
    fn selectors_parse_with_precedence() {
        let edges = validate_edges(&edge_list(
            r#"
- id: by-role
  type: telemetry
  from: { selector: { role: airflow-worker, service: ignored } }
  to: { host: d1b9e5d5-36b0-459d-a556-96622811fbd5, service: otel, port: 4317 }
- id: by-obs
  type: monitoring
  from: { selector: { observability.ready: true } }
  to: { host: d1b9e5d5-36b0-459d-a556-96622811fbd5, service: prometheus, port: 9090 }
"#,
        ))
        .unwrap();
        assert_eq!(edges[0].selector(), Some(&Selector::Role("airflow-worker".into())));
        assert_eq!(edges[1].selector(), Some(&Selector::ObservabilityReady));
    }

    #[test]
    fn unknown_selector_key_is_rejected() {
        let errs = validate_edges(&edge_list(
            r#"
- id: odd
  type: api
  from: { selector: { zone: eu } }
  to: { host: d1b9e5d5-36b0-459d-a556-96622811fbd5, service: api, port: 80 }
"#,
        ))
        .unwrap_err();
        assert_eq!(errs[0].path, "edges[0].from.selector");
    }

    #[test]
    fn healthcheck_durations_accept_numbers_and_units() {
        let edges = validate_edges(&edge_list(
            r#"
- id: h
  type: api
  from: { hosts: "*" }
  to: { host: d1b9e5d5-36b0-459d-a556-96622811fbd5, service: api, port: 8080 }
  healthcheck: { type: HTTP, interval: 30, timeout: 1500ms, path: /healthz }
"#,
        ))
        .unwrap();
        let hc = edges[0].healthcheck();
        assert_eq!(hc.kind, CheckType::Http);
        assert_eq!(hc.interval, std::time::Duration::from_secs(30));
        assert_eq!(hc.timeout, std::time::Duration::from_millis(1500));
    }
}
