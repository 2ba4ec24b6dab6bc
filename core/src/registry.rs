//! In-memory host registry for one topology snapshot.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::SchemaError;
use crate::host::{Host, HostStatus};
use crate::ids::HostId;

/// Conjunctive host filter; `None` fields are not applied.
#[derive(Debug, Clone, Default)]
pub struct HostFilter<'a> {
    pub status: Option<HostStatus>,
    pub group: Option<&'a str>,
    pub cloud: Option<&'a str>,
    pub service: Option<&'a str>,
    pub role: Option<&'a str>,
}

impl<'a> HostFilter<'a> {
    pub fn status(mut self, status: HostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn group(mut self, group: &'a str) -> Self {
        self.group = Some(group);
        self
    }

    pub fn cloud(mut self, cloud: &'a str) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn service(mut self, service: &'a str) -> Self {
        self.service = Some(service);
        self
    }

    pub fn role(mut self, role: &'a str) -> Self {
        self.role = Some(role);
        self
    }

    pub fn matches(&self, host: &Host) -> bool {
        self.status.map_or(true, |s| host.status() == s)
            && self.group.map_or(true, |g| host.group() == Some(g))
            && self.cloud.map_or(true, |c| host.cloud() == Some(c))
            && self.service.map_or(true, |s| host.has_service(s))
            && self.role.map_or(true, |r| host.has_role(r))
    }
}

/// Hosts in construction order, with id, 8-char prefix and name indexes.
///
/// On a prefix or name collision the first host in construction order keeps the
/// index slot.
#[derive(Debug, Default)]
pub struct Registry {
    hosts: Vec<Host>,
    by_id: HashMap<HostId, usize>,
    by_prefix: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    defaults: Map<String, Value>,
}

impl Registry {
    pub fn new(hosts: Vec<Host>) -> Result<Self, SchemaError> {
        Self::with_defaults(hosts, Map::new())
    }

    pub fn with_defaults(hosts: Vec<Host>, defaults: Map<String, Value>) -> Result<Self, SchemaError> {
        let mut by_id = HashMap::with_capacity(hosts.len());
        let mut by_prefix = HashMap::with_capacity(hosts.len());
        let mut by_name = HashMap::with_capacity(hosts.len());
        for (idx, host) in hosts.iter().enumerate() {
            if by_id.insert(host.id().clone(), idx).is_some() {
                return Err(SchemaError::DuplicateHostId(host.id().clone()));
            }
            if let Some(&first) = by_prefix.get(host.prefix()) {
                let first: &Host = &hosts[first];
                tracing::warn!(
                    prefix = host.prefix(),
                    kept = %first.id(),
                    shadowed = %host.id(),
                    "host id prefix collision"
                );
            } else {
                by_prefix.insert(host.prefix().to_string(), idx);
            }
            if by_name.contains_key(host.canonical_name()) {
                tracing::warn!(name = host.canonical_name(), shadowed = %host.id(), "duplicate canonical name");
            } else {
                by_name.insert(host.canonical_name().to_string(), idx);
            }
        }
        tracing::debug!(hosts = hosts.len(), "registry indexed");
        Ok(Registry { hosts, by_id, by_prefix, by_name, defaults })
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Host> {
        self.by_id.get(id).map(|&i| &self.hosts[i])
    }

    /// Exact hit in the prefix index, else the first host (construction order)
    /// whose id starts with `prefix`. Not guaranteed unique.
    pub fn get_by_prefix(&self, prefix: &str) -> Option<&Host> {
        if prefix.is_empty() {
            return None;
        }
        if let Some(&i) = self.by_prefix.get(prefix) {
            return Some(&self.hosts[i]);
        }
        self.hosts.iter().find(|h| h.id().as_str().starts_with(prefix))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Host> {
        self.by_name.get(name).map(|&i| &self.hosts[i])
    }

    /// Id, then prefix, then canonical name. A full id is never shadowed by a
    /// name.
    pub fn get(&self, identifier: &str) -> Option<&Host> {
        self.get_by_id(identifier)
            .or_else(|| self.get_by_prefix(identifier))
            .or_else(|| self.get_by_name(identifier))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    pub fn filter(&self, filter: &HostFilter<'_>) -> Vec<&Host> {
        self.hosts.iter().filter(|h| filter.matches(h)).collect()
    }

    pub fn active_hosts(&self) -> Vec<&Host> {
        self.filter(&HostFilter::default().status(HostStatus::Active))
    }

    pub fn hosts_with_role(&self, role: &str) -> Vec<&Host> {
        self.hosts.iter().filter(|h| h.has_role(role)).collect()
    }

    pub fn hosts_with_service(&self, service: &str) -> Vec<&Host> {
        self.hosts.iter().filter(|h| h.has_service(service)).collect()
    }

    pub fn groups(&self) -> BTreeSet<&str> {
        self.hosts.iter().filter_map(|h| h.group()).collect()
    }

    pub fn clouds(&self) -> BTreeSet<&str> {
        self.hosts.iter().filter_map(|h| h.cloud()).collect()
    }

    /// Prefixes shared by more than one host, with every id sharing it.
    pub fn prefix_collisions(&self) -> BTreeMap<&str, Vec<&HostId>> {
        let mut by_prefix: BTreeMap<&str, Vec<&HostId>> = BTreeMap::new();
        for h in &self.hosts {
            by_prefix.entry(h.prefix()).or_default().push(h.id());
        }
        by_prefix.retain(|_, ids| ids.len() > 1);
        by_prefix
    }

    /// The registry document's `ansible_defaults` block.
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Host> {
        self.hosts.iter()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Host;
    type IntoIter = std::slice::Iter<'a, Host>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fixtures::host;

    const H1: &str = "d1b9e5d5-36b0-459d-a556-96622811fbd5";
    const H2: &str = "fa2b9872-d94c-4b20-a73a-57a205560769";
    const H3: &str = "e1a2b3c4-d5e6-4f7a-8b9c-0d1e2f3a4b5c";

    fn sample() -> Registry {
        let mut a = host(H1, "test-host-1");
        a.group = Some("production".into());
        a.cloud = Some("hetzner-cloud".into());
        a.services.insert("postgresql".into(), Default::default());
        a.services.insert("redis".into(), Default::default());
        let mut b = host(H2, "test-host-2");
        b.group = Some("production".into());
        b.cloud = Some("hetzner-cloud".into());
        b.services.insert("nginx".into(), Default::default());
        b.roles.insert("app-worker".into(), Map::new());
        let mut c = host(H3, "terminated-host");
        c.status = HostStatus::Terminated;
        c.group = Some("staging".into());
        c.cloud = Some("gcp".into());
        Registry::new(vec![a, b, c]).unwrap()
    }

    #[test]
    fn lookups_by_id_prefix_and_name() {
        let r = sample();
        assert_eq!(r.len(), 3);
        assert_eq!(r.get_by_id(H1).unwrap().canonical_name(), "test-host-1");
        assert_eq!(r.get_by_prefix("d1b9e5d5").unwrap().id().as_str(), H1);
        assert_eq!(r.get_by_prefix("fa2b").unwrap().id().as_str(), H2);
        assert_eq!(r.get_by_name("test-host-2").unwrap().id().as_str(), H2);
        assert!(r.get_by_id("nonexistent").is_none());
        assert!(r.get_by_prefix("").is_none());
        assert!(r.contains("test-host-1"));
        assert!(!r.contains("nonexistent"));
    }

    #[test]
    fn id_is_never_shadowed_by_a_name() {
        // second host is *named* after the first host's id
        let r = Registry::new(vec![host(H1, "primary"), host(H2, H1)]).unwrap();
        assert_eq!(r.get(H1).unwrap().canonical_name(), "primary");
        for h in &r {
            assert_eq!(r.get_by_id(h.id().as_str()).unwrap(), h);
            assert_eq!(r.get(h.id().as_str()).unwrap(), h);
        }
    }

    #[test]
    fn prefix_collision_keeps_first_in_construction_order() {
        let first = "abcdef01-0000-4000-8000-000000000001";
        let second = "abcdef01-0000-4000-8000-000000000002";
        let r = Registry::new(vec![host(first, "one"), host(second, "two")]).unwrap();
        assert_eq!(r.get_by_prefix("abcdef01").unwrap().id().as_str(), first);
        let collisions = r.prefix_collisions();
        assert_eq!(collisions["abcdef01"].len(), 2);
        // each host is still reachable by its full id
        assert_eq!(r.get(second).unwrap().canonical_name(), "two");
    }

    #[test]
    fn duplicate_host_ids_are_rejected() {
        let err = Registry::new(vec![host(H1, "a"), host(H1, "b")]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateHostId(_)));
    }

    #[test]
    fn filters_are_conjunctive_and_ordered() {
        let r = sample();
        assert_eq!(r.active_hosts().len(), 2);
        assert!(r.active_hosts().iter().all(|h| h.is_active()));
        assert_eq!(r.filter(&HostFilter::default().status(HostStatus::Terminated)).len(), 1);
        let prod = r.filter(&HostFilter::default().group("production"));
        let names: Vec<_> = prod.iter().map(|h| h.canonical_name()).collect();
        assert_eq!(names, ["test-host-1", "test-host-2"]);
        let both = HostFilter::default().group("production").service("nginx");
        assert_eq!(r.filter(&both).len(), 1);
        assert!(r.filter(&HostFilter::default().cloud("gcp").role("app-worker")).is_empty());
        assert_eq!(r.filter(&HostFilter::default()).len(), 3);
    }

    #[test]
    fn membership_and_aggregate_queries() {
        let r = sample();
        let pg = r.hosts_with_service("postgresql");
        assert_eq!(pg.len(), 1);
        assert_eq!(pg[0].canonical_name(), "test-host-1");
        assert_eq!(r.hosts_with_role("app-worker").len(), 1);
        assert_eq!(r.groups().into_iter().collect::<Vec<_>>(), ["production", "staging"]);
        assert_eq!(r.clouds().into_iter().collect::<Vec<_>>(), ["gcp", "hetzner-cloud"]);
    }
}
