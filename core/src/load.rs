//! Reading registry and edge documents from YAML text or files.

use std::fs;
use std::path::Path;

use crate::edges::EdgeSet;
use crate::error::SchemaError;
use crate::registry::Registry;
use crate::resolver::EdgeResolver;
use crate::schema::{
    scalar_string, validate_edges, validate_hosts, RawEdgeFile, RawRegistryFile, DEFAULT_SCHEMA_VERSION,
};

/// A registry together with the edges declared against it.
#[derive(Debug, Default)]
pub struct Topology {
    pub registry: Registry,
    pub edges: EdgeSet,
}

impl Topology {
    pub fn resolver(&self) -> EdgeResolver<'_> {
        EdgeResolver::new(&self.registry, &self.edges)
    }
}

fn read(path: &Path) -> Result<String, SchemaError> {
    fs::read_to_string(path).map_err(|source| SchemaError::Io { path: path.to_path_buf(), source })
}

fn parse_registry_file(text: &str) -> Result<RawRegistryFile, SchemaError> {
    if text.trim().is_empty() {
        return Ok(RawRegistryFile::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

fn build_registry(raw: &RawRegistryFile) -> Result<Registry, SchemaError> {
    let hosts = validate_hosts(&raw.hosts).map_err(SchemaError::Invalid)?;
    Registry::with_defaults(hosts, raw.ansible_defaults.clone().unwrap_or_default())
}

/// Parse a registry document. Embedded `edges` are ignored here; see
/// [`topology_from_str`].
pub fn registry_from_str(text: &str) -> Result<Registry, SchemaError> {
    build_registry(&parse_registry_file(text)?)
}

pub fn load_registry(path: impl AsRef<Path>) -> Result<Registry, SchemaError> {
    let path = path.as_ref();
    let registry = registry_from_str(&read(path)?)?;
    tracing::info!(path = %path.display(), hosts = registry.len(), "registry loaded");
    Ok(registry)
}

/// Parse an edge document. A missing `edges` list yields an empty set; a
/// missing `schema_version` defaults to `1.0`.
pub fn edges_from_str(text: &str) -> Result<EdgeSet, SchemaError> {
    let raw: RawEdgeFile = if text.trim().is_empty() {
        RawEdgeFile::default()
    } else {
        serde_yaml::from_str(text)?
    };
    let version = raw
        .schema_version
        .as_ref()
        .and_then(scalar_string)
        .unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string());
    let edges = validate_edges(raw.edges.as_deref().unwrap_or_default()).map_err(SchemaError::Invalid)?;
    EdgeSet::with_version(edges, version)
}

pub fn load_edges(path: impl AsRef<Path>) -> Result<EdgeSet, SchemaError> {
    let path = path.as_ref();
    let edges = edges_from_str(&read(path)?)?;
    tracing::info!(path = %path.display(), edges = edges.len(), version = edges.schema_version(), "edges loaded");
    Ok(edges)
}

/// Registry plus the edges embedded in the same document.
pub fn topology_from_str(text: &str) -> Result<Topology, SchemaError> {
    let raw = parse_registry_file(text)?;
    let registry = build_registry(&raw)?;
    let edges = EdgeSet::new(validate_edges(&raw.edges).map_err(SchemaError::Invalid)?)?;
    Ok(Topology { registry, edges })
}

/// Load the registry and, if `edges_path` exists, the edge file. Otherwise the
/// edges embedded in the registry document are used.
pub fn load_topology(registry_path: impl AsRef<Path>, edges_path: impl AsRef<Path>) -> Result<Topology, SchemaError> {
    let registry_path = registry_path.as_ref();
    let edges_path = edges_path.as_ref();
    let raw = parse_registry_file(&read(registry_path)?)?;
    let registry = build_registry(&raw)?;
    tracing::info!(path = %registry_path.display(), hosts = registry.len(), "registry loaded");

    let edges = if edges_path.exists() {
        load_edges(edges_path)?
    } else {
        tracing::info!(
            path = %edges_path.display(),
            embedded = raw.edges.len(),
            "edges file not found, using edges embedded in registry"
        );
        EdgeSet::new(validate_edges(&raw.edges).map_err(SchemaError::Invalid)?)?
    };
    Ok(Topology { registry, edges })
}
