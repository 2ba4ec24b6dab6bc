//! Host records. Built once by [`crate::schema`]; no mutators.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use crate::ids::HostId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    #[default]
    Active,
    Terminated,
    Provisioning,
    Maintenance,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Active => "active",
            HostStatus::Terminated => "terminated",
            HostStatus::Provisioning => "provisioning",
            HostStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(HostStatus::Active),
            "terminated" => Some(HostStatus::Terminated),
            "provisioning" => Some(HostStatus::Provisioning),
            "maintenance" => Some(HostStatus::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which address family of a host to try first.
///
/// The fallback chain always covers all three addresses:
/// tailscale → public → private, public → tailscale → private,
/// private → tailscale → public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpPreference {
    #[default]
    Tailscale,
    Public,
    Private,
}

impl IpPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpPreference::Tailscale => "tailscale",
            IpPreference::Public => "public",
            IpPreference::Private => "private",
        }
    }
}

/// Unrecognised names fall back to the tailscale-first order.
impl From<&str> for IpPreference {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => IpPreference::Public,
            "private" => IpPreference::Private,
            _ => IpPreference::Tailscale,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Network {
    pub tailscale_ip: Option<IpAddr>,
    pub tailscale_name: Option<String>,
    pub public_ip: Option<IpAddr>,
    pub public_ipv6: Option<String>,
    pub private_ip: Option<IpAddr>,
}

/// A service declared on a host. Legacy list entries carry only the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_service_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub healthcheck_path: Option<String>,
}

fn default_service_protocol() -> String {
    "tcp".to_string()
}

impl Default for ServiceSpec {
    fn default() -> Self {
        ServiceSpec { port: None, protocol: default_service_protocol(), healthcheck_path: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observability {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub managed_services: Vec<String>,
    #[serde(default)]
    pub unmanaged_services: Vec<String>,
    #[serde(default)]
    pub port_overrides: BTreeMap<String, u16>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Secret-store scope for a host. References only; never secret values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecretScope {
    pub project: Option<String>,
    pub machine_account: Option<String>,
    pub extra_projects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostMetadata {
    pub dns_hostnames: Vec<String>,
    pub docker_version: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Host {
    pub(crate) id: HostId,
    pub(crate) canonical_name: String,
    pub(crate) status: HostStatus,
    pub(crate) group: Option<String>,
    pub(crate) cloud: Option<String>,
    pub(crate) network: Network,
    pub(crate) services: BTreeMap<String, ServiceSpec>,
    pub(crate) roles: BTreeMap<String, Map<String, Value>>,
    pub(crate) observability: Option<Observability>,
    pub(crate) secrets: SecretScope,
    pub(crate) metadata: HostMetadata,
}

impl Host {
    pub fn id(&self) -> &HostId {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        self.id.prefix()
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn status(&self) -> HostStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == HostStatus::Active
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn cloud(&self) -> Option<&str> {
        self.cloud.as_deref()
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn tailscale_ip(&self) -> Option<IpAddr> {
        self.network.tailscale_ip
    }

    pub fn public_ip(&self) -> Option<IpAddr> {
        self.network.public_ip
    }

    pub fn private_ip(&self) -> Option<IpAddr> {
        self.network.private_ip
    }

    pub fn services(&self) -> &BTreeMap<String, ServiceSpec> {
        &self.services
    }

    pub fn roles(&self) -> &BTreeMap<String, Map<String, Value>> {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn observability(&self) -> Option<&Observability> {
        self.observability.as_ref()
    }

    pub fn is_observability_ready(&self) -> bool {
        self.observability.as_ref().is_some_and(|o| o.ready)
    }

    pub fn secrets(&self) -> &SecretScope {
        &self.secrets
    }

    pub fn metadata(&self) -> &HostMetadata {
        &self.metadata
    }

    /// First address set in the preference's fallback chain.
    pub fn ip(&self, prefer: IpPreference) -> Option<IpAddr> {
        let n = &self.network;
        let chain = match prefer {
            IpPreference::Tailscale => [n.tailscale_ip, n.public_ip, n.private_ip],
            IpPreference::Public => [n.public_ip, n.tailscale_ip, n.private_ip],
            IpPreference::Private => [n.private_ip, n.tailscale_ip, n.public_ip],
        };
        chain.into_iter().flatten().next()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}..., {})", self.canonical_name, self.prefix(), self.status)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn host(id: &str, name: &str) -> Host {
        Host {
            id: HostId::parse(id).expect("fixture id"),
            canonical_name: name.to_string(),
            status: HostStatus::Active,
            group: None,
            cloud: None,
            network: Network::default(),
            services: BTreeMap::new(),
            roles: BTreeMap::new(),
            observability: None,
            secrets: SecretScope::default(),
            metadata: HostMetadata::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::host;
    use super::*;

    #[test]
    fn ip_follows_preference_chain() {
        let mut h = host("d1b9e5d5-36b0-459d-a556-96622811fbd5", "db");
        h.network.tailscale_ip = Some("100.78.109.111".parse().unwrap());
        h.network.public_ip = Some("91.99.122.86".parse().unwrap());
        assert_eq!(h.ip(IpPreference::Tailscale), Some("100.78.109.111".parse().unwrap()));
        assert_eq!(h.ip(IpPreference::Public), Some("91.99.122.86".parse().unwrap()));
        // no private address: falls through to tailscale
        assert_eq!(h.ip(IpPreference::Private), Some("100.78.109.111".parse().unwrap()));
    }

    #[test]
    fn private_only_host_answers_every_preference() {
        let mut h = host("d1b9e5d5-36b0-459d-a556-96622811fbd5", "db");
        h.network.private_ip = Some("10.0.0.5".parse().unwrap());
        for pref in [IpPreference::Tailscale, IpPreference::Public, IpPreference::Private] {
            assert_eq!(h.ip(pref), Some("10.0.0.5".parse().unwrap()));
        }
    }

    #[test]
    fn unknown_preference_is_tailscale_first() {
        assert_eq!(IpPreference::from("mesh"), IpPreference::Tailscale);
        assert_eq!(IpPreference::from("PUBLIC"), IpPreference::Public);
    }

    #[test]
    fn observability_ready_defaults_false() {
        let mut h = host("a-b-c-d-e", "x");
        assert!(!h.is_observability_ready());
        h.observability = Some(Observability { ready: true, ..Default::default() });
        assert!(h.is_observability_ready());
    }
}
