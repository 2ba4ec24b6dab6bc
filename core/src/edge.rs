//! Edge records: one declared connection requirement from a source host set to a
//! single concrete target.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use crate::ids::{EdgeId, HostId};

/// Source sentinel meaning "every active host".
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Database,
    Queue,
    Cluster,
    Telemetry,
    Monitoring,
    Api,
    Storage,
}

impl EdgeType {
    pub const ALL: [EdgeType; 7] = [
        EdgeType::Database,
        EdgeType::Queue,
        EdgeType::Cluster,
        EdgeType::Telemetry,
        EdgeType::Monitoring,
        EdgeType::Api,
        EdgeType::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Database => "database",
            EdgeType::Queue => "queue",
            EdgeType::Cluster => "cluster",
            EdgeType::Telemetry => "telemetry",
            EdgeType::Monitoring => "monitoring",
            EdgeType::Api => "api",
            EdgeType::Storage => "storage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Criticality {
    pub const ALL: [Criticality; 4] =
        [Criticality::Critical, Criticality::High, Criticality::Medium, Criticality::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "critical",
            Criticality::High => "high",
            Criticality::Medium => "medium",
            Criticality::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Password,
    Basic,
    Token,
    Certificate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthSpec {
    #[serde(rename = "type")]
    pub kind: AuthType,
    /// Key into an external secret store.
    pub secret_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    #[default]
    Tcp,
    Http,
    Https,
    Query,
    Ping,
    Api,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Tcp => "tcp",
            CheckType::Http => "http",
            CheckType::Https => "https",
            CheckType::Query => "query",
            CheckType::Ping => "ping",
            CheckType::Api => "api",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse `"500ms"`, `"5s"`, `"2m"`, `"1h"`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let n: u64 = num.parse().ok()?;
    match unit.trim() {
        "ms" => Some(Duration::from_millis(n)),
        "" | "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(n.checked_mul(3600)?)),
        _ => None,
    }
}

/// Inverse of [`parse_duration`] for whole units.
pub fn format_duration(d: &Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        return format!("{}ms", ms);
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn serialize_duration<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_duration(d))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckSpec {
    #[serde(rename = "type")]
    pub kind: CheckType,
    #[serde(serialize_with = "serialize_duration")]
    pub interval: Duration,
    #[serde(serialize_with = "serialize_duration")]
    pub timeout: Duration,
    pub path: Option<String>,
    pub query: Option<String>,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        HealthCheckSpec {
            kind: CheckType::Tcp,
            interval: DEFAULT_CHECK_INTERVAL,
            timeout: DEFAULT_CHECK_TIMEOUT,
            path: None,
            query: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EdgeMetadata {
    pub purpose: Option<String>,
    pub criticality: Criticality,
    pub owner: Option<String>,
    pub runbook: Option<String>,
    pub documentation: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

/// Explicit host list or the `"*"` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHosts {
    Listed(Vec<HostId>),
    Wildcard,
}

impl Serialize for SourceHosts {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            SourceHosts::Listed(ids) => ids.serialize(s),
            SourceHosts::Wildcard => s.serialize_str(WILDCARD),
        }
    }
}

impl Default for SourceHosts {
    fn default() -> Self {
        SourceHosts::Listed(Vec::new())
    }
}

/// Attribute selector, evaluated against a registry at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Role(String),
    Service(String),
    ObservabilityReady,
}

impl Selector {
    pub fn key(&self) -> &'static str {
        match self {
            Selector::Role(_) => "role",
            Selector::Service(_) => "service",
            Selector::ObservabilityReady => "observability.ready",
        }
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(1))?;
        match self {
            Selector::Role(v) | Selector::Service(v) => map.serialize_entry(self.key(), v)?,
            Selector::ObservabilityReady => map.serialize_entry(self.key(), &true)?,
        }
        map.end()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Role(v) | Selector::Service(v) => write!(f, "{}={}", self.key(), v),
            Selector::ObservabilityReady => write!(f, "{}=true", self.key()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EdgeSource {
    pub hosts: SourceHosts,
    pub selector: Option<Selector>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeTarget {
    pub host: HostId,
    pub service: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub(crate) id: EdgeId,
    #[serde(rename = "type")]
    pub(crate) kind: EdgeType,
    #[serde(rename = "from")]
    pub(crate) source: EdgeSource,
    #[serde(rename = "to")]
    pub(crate) target: EdgeTarget,
    pub(crate) protocol: Option<String>,
    pub(crate) auth: AuthSpec,
    pub(crate) healthcheck: HealthCheckSpec,
    pub(crate) metadata: EdgeMetadata,
}

impl Edge {
    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    pub fn kind(&self) -> EdgeType {
        self.kind
    }

    pub fn source(&self) -> &EdgeSource {
        &self.source
    }

    /// Explicitly listed source hosts. Empty for wildcard sources, which have to be
    /// resolved against a registry.
    pub fn source_hosts(&self) -> &[HostId] {
        match &self.source.hosts {
            SourceHosts::Listed(ids) => ids,
            SourceHosts::Wildcard => &[],
        }
    }

    pub fn is_wildcard_source(&self) -> bool {
        matches!(self.source.hosts, SourceHosts::Wildcard)
    }

    pub fn selector(&self) -> Option<&Selector> {
        self.source.selector.as_ref()
    }

    pub fn source_service(&self) -> Option<&str> {
        self.source.service.as_deref()
    }

    /// Wildcard sources match every host; selectors are not evaluated here.
    pub fn matches_source(&self, host_id: &str) -> bool {
        if self.is_wildcard_source() {
            return true;
        }
        self.source_hosts().iter().any(|h| h.as_str() == host_id)
    }

    pub fn target(&self) -> &EdgeTarget {
        &self.target
    }

    pub fn target_host(&self) -> &HostId {
        &self.target.host
    }

    pub fn target_service(&self) -> &str {
        &self.target.service
    }

    pub fn target_port(&self) -> u16 {
        self.target.port
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn auth(&self) -> &AuthSpec {
        &self.auth
    }

    pub fn secret_ref(&self) -> Option<&str> {
        self.auth.secret_ref.as_deref()
    }

    pub fn healthcheck(&self) -> &HealthCheckSpec {
        &self.healthcheck
    }

    pub fn metadata(&self) -> &EdgeMetadata {
        &self.metadata
    }

    pub fn criticality(&self) -> Criticality {
        self.metadata.criticality
    }

    pub fn is_critical(&self) -> bool {
        self.metadata.criticality == Criticality::Critical
    }

    pub fn purpose(&self) -> Option<&str> {
        self.metadata.purpose.as_deref()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources = if self.is_wildcard_source() {
            "*".to_string()
        } else {
            self.source_hosts().len().to_string()
        };
        write!(
            f,
            "{} ({}: {} sources -> {}:{})",
            self.id, self.kind, sources, self.target.service, self.target.port
        )
    }
}
