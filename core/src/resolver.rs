//! Joins a [`Registry`] and an [`EdgeSet`] to turn declared edges into concrete
//! endpoints and connection URLs.
//!
//! Single-edge operations fail loudly with [`ResolveError`]; a silent miss here
//! would end up as a broken connection string downstream. Batch checks
//! ([`EdgeResolver::validate_all`], [`EdgeResolver::dangling_sources`]) collect
//! messages instead.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use url::form_urlencoded;

use crate::edge::{Edge, Selector};
use crate::edges::EdgeSet;
use crate::error::ResolveError;
use crate::host::{Host, IpPreference};
use crate::registry::Registry;

pub const DEFAULT_SCHEME: &str = "tcp";
pub const POSTGRES_DRIVER: &str = "postgresql+psycopg2";
pub const MYSQL_DRIVER: &str = "mysql+pymysql";
pub const REDIS_SCHEME: &str = "redis";

/// Optional parts of a connection URL. Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct UrlOptions<'a> {
    pub user: Option<&'a str>,
    pub password: Option<&'a str>,
    pub database: Option<&'a str>,
    /// Appended verbatim after the database segment, e.g. `/v1/health`.
    pub path: Option<&'a str>,
    /// Rendered in order; values are form-encoded.
    pub query: Vec<(&'a str, &'a str)>,
    pub prefer: IpPreference,
}

/// Login triple for the driver-specific URL builders.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub database: &'a str,
}

/// `application/x-www-form-urlencoded` byte serialisation: reserved characters
/// such as `@`, `:` and `!` are percent-encoded, spaces become `+`.
pub fn encode_component(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn present(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

fn endpoint(ip: IpAddr, port: u16) -> String {
    SocketAddr::new(ip, port).to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeResolver<'a> {
    registry: &'a Registry,
    edges: &'a EdgeSet,
}

impl<'a> EdgeResolver<'a> {
    pub fn new(registry: &'a Registry, edges: &'a EdgeSet) -> Self {
        EdgeResolver { registry, edges }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn edges(&self) -> &'a EdgeSet {
        self.edges
    }

    pub fn get_edge(&self, edge_id: &str) -> Result<&'a Edge, ResolveError> {
        self.edges.get(edge_id).ok_or_else(|| ResolveError::EdgeNotFound(edge_id.to_string()))
    }

    /// Exact id lookup of the edge's target; never prefix or name.
    pub fn get_target_host(&self, edge_id: &str) -> Result<&'a Host, ResolveError> {
        let edge = self.get_edge(edge_id)?;
        self.target_of(edge)
    }

    fn target_of(&self, edge: &Edge) -> Result<&'a Host, ResolveError> {
        self.registry.get_by_id(edge.target_host().as_str()).ok_or_else(|| {
            ResolveError::TargetHostNotFound { edge: edge.id().clone(), host: edge.target_host().clone() }
        })
    }

    pub fn get_target_ip(&self, edge_id: &str, prefer: IpPreference) -> Result<IpAddr, ResolveError> {
        let edge = self.get_edge(edge_id)?;
        let host = self.target_of(edge)?;
        host.ip(prefer).ok_or_else(|| ResolveError::NoAddressAvailable {
            edge: edge.id().clone(),
            host: host.canonical_name().to_string(),
        })
    }

    pub fn get_target_port(&self, edge_id: &str) -> Result<u16, ResolveError> {
        Ok(self.get_edge(edge_id)?.target_port())
    }

    /// `ip:port`, with IPv6 addresses bracketed.
    pub fn get_target_endpoint(&self, edge_id: &str, prefer: IpPreference) -> Result<String, ResolveError> {
        let ip = self.get_target_ip(edge_id, prefer)?;
        Ok(endpoint(ip, self.get_target_port(edge_id)?))
    }

    /// `scheme://[auth@]ip:port[/database][path][?query]`. The scheme is the
    /// edge's declared protocol, or `tcp`.
    pub fn get_url(&self, edge_id: &str, opts: &UrlOptions<'_>) -> Result<String, ResolveError> {
        let edge = self.get_edge(edge_id)?;
        let scheme = edge.protocol().unwrap_or(DEFAULT_SCHEME);
        let host_port = self.get_target_endpoint(edge_id, opts.prefer)?;

        let auth = match (present(opts.user), present(opts.password)) {
            (Some(user), Some(password)) => format!("{}:{}@", user, encode_component(password)),
            (Some(user), None) => format!("{}@", user),
            (None, _) => String::new(),
        };
        let mut url = format!("{}://{}{}", scheme, auth, host_port);
        if let Some(db) = present(opts.database) {
            url.push('/');
            url.push_str(db);
        }
        if let Some(path) = present(opts.path) {
            url.push_str(path);
        }
        if !opts.query.is_empty() {
            let query: Vec<String> =
                opts.query.iter().map(|(k, v)| format!("{}={}", k, encode_component(v))).collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        Ok(url)
    }

    /// `redis://[:password@]ip:port/db`. Redis auth is password-only.
    pub fn get_redis_url(
        &self,
        edge_id: &str,
        password: Option<&str>,
        db: u32,
        prefer: IpPreference,
    ) -> Result<String, ResolveError> {
        let host_port = self.get_target_endpoint(edge_id, prefer)?;
        Ok(match present(password) {
            Some(pw) => format!("{}://:{}@{}/{}", REDIS_SCHEME, encode_component(pw), host_port, db),
            None => format!("{}://{}/{}", REDIS_SCHEME, host_port, db),
        })
    }

    /// `driver://user:password@ip:port/database`, driver defaulting to
    /// `postgresql+psycopg2`.
    pub fn get_postgres_url(
        &self,
        edge_id: &str,
        creds: Credentials<'_>,
        driver: Option<&str>,
        prefer: IpPreference,
    ) -> Result<String, ResolveError> {
        self.driver_url(edge_id, creds, present(driver).unwrap_or(POSTGRES_DRIVER), prefer)
    }

    /// Same shape as [`Self::get_postgres_url`], driver defaulting to `mysql+pymysql`.
    pub fn get_mysql_url(
        &self,
        edge_id: &str,
        creds: Credentials<'_>,
        driver: Option<&str>,
        prefer: IpPreference,
    ) -> Result<String, ResolveError> {
        self.driver_url(edge_id, creds, present(driver).unwrap_or(MYSQL_DRIVER), prefer)
    }

    fn driver_url(
        &self,
        edge_id: &str,
        creds: Credentials<'_>,
        driver: &str,
        prefer: IpPreference,
    ) -> Result<String, ResolveError> {
        let host_port = self.get_target_endpoint(edge_id, prefer)?;
        Ok(format!(
            "{}://{}:{}@{}/{}",
            driver,
            creds.user,
            encode_component(creds.password),
            host_port,
            creds.database
        ))
    }

    /// Source hosts of an edge. Exactly one rule applies, in this order:
    /// a non-empty explicit list (unknown ids are dropped), a selector, the
    /// wildcard (all active hosts), otherwise nothing.
    pub fn resolve_source_hosts(&self, edge_id: &str) -> Result<Vec<&'a Host>, ResolveError> {
        let edge = self.get_edge(edge_id)?;

        if !edge.is_wildcard_source() && !edge.source_hosts().is_empty() {
            let mut hosts = Vec::with_capacity(edge.source_hosts().len());
            for id in edge.source_hosts() {
                match self.registry.get_by_id(id.as_str()) {
                    Some(h) => hosts.push(h),
                    None => tracing::debug!(edge = %edge.id(), host = %id, "dropping unknown source host"),
                }
            }
            return Ok(hosts);
        }

        if let Some(selector) = edge.selector() {
            return Ok(match selector {
                Selector::Role(role) => self.registry.hosts_with_role(role),
                Selector::Service(service) => self.registry.hosts_with_service(service),
                Selector::ObservabilityReady => self
                    .registry
                    .active_hosts()
                    .into_iter()
                    .filter(|h| h.is_observability_ready())
                    .collect(),
            });
        }

        if edge.is_wildcard_source() {
            return Ok(self.registry.active_hosts());
        }
        Ok(Vec::new())
    }

    /// Flat key/value bundle for template rendering. `password` is only added
    /// when `secrets` is given and holds the edge's `secret_ref`.
    pub fn to_template_context(
        &self,
        edge_id: &str,
        secrets: Option<&HashMap<String, String>>,
    ) -> Result<Map<String, Value>, ResolveError> {
        let edge = self.get_edge(edge_id)?;
        let host = self.target_of(edge)?;
        let ip = self.get_target_ip(edge_id, IpPreference::Tailscale)?;

        let mut ctx = Map::new();
        ctx.insert("edge_id".into(), edge.id().as_str().into());
        ctx.insert("edge_type".into(), edge.kind().as_str().into());
        ctx.insert("target_ip".into(), ip.to_string().into());
        ctx.insert(
            "target_public_ip".into(),
            host.public_ip().map_or(Value::Null, |ip| ip.to_string().into()),
        );
        ctx.insert("target_port".into(), edge.target_port().into());
        ctx.insert("target_service".into(), edge.target_service().into());
        ctx.insert("target_host_name".into(), host.canonical_name().into());
        ctx.insert("target_host_uuid".into(), host.id().as_str().into());
        ctx.insert("protocol".into(), edge.protocol().map_or(Value::Null, Value::from));
        ctx.insert("endpoint".into(), endpoint(ip, edge.target_port()).into());

        if let (Some(secrets), Some(secret_ref)) = (secrets, edge.secret_ref()) {
            if let Some(value) = secrets.get(secret_ref) {
                ctx.insert("password".into(), value.clone().into());
            }
        }
        Ok(ctx)
    }

    /// Target lookup for every edge; one message per dangling target.
    pub fn validate_all(&self) -> Vec<String> {
        self.edges
            .iter()
            .filter_map(|e| self.get_target_host(e.id().as_str()).err())
            .map(|err| err.to_string())
            .collect()
    }

    /// Explicitly listed source ids missing from the registry.
    pub fn dangling_sources(&self) -> Vec<String> {
        let mut out = Vec::new();
        for edge in self.edges {
            for id in edge.source_hosts() {
                if self.registry.get_by_id(id.as_str()).is_none() {
                    out.push(format!("source host not found for edge {}: {}", edge.id(), id));
                }
            }
        }
        out
    }
}
