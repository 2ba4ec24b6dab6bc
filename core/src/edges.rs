//! Indexed edge collection for one topology snapshot.

use std::collections::{HashMap, HashSet};

use crate::edge::{Criticality, Edge, EdgeType};
use crate::error::{FieldError, SchemaError};
use crate::ids::EdgeId;
use crate::schema::DEFAULT_SCHEMA_VERSION;

#[derive(Debug)]
pub struct EdgeSet {
    edges: Vec<Edge>,
    schema_version: String,
    by_id: HashMap<EdgeId, usize>,
    by_type: HashMap<EdgeType, Vec<usize>>,
    by_criticality: HashMap<Criticality, Vec<usize>>,
}

impl Default for EdgeSet {
    fn default() -> Self {
        EdgeSet {
            edges: Vec::new(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            by_id: HashMap::new(),
            by_type: HashMap::new(),
            by_criticality: HashMap::new(),
        }
    }
}

impl EdgeSet {
    pub fn new(edges: Vec<Edge>) -> Result<Self, SchemaError> {
        Self::with_version(edges, DEFAULT_SCHEMA_VERSION)
    }

    /// Fails with one field error per repeated edge id.
    pub fn with_version(edges: Vec<Edge>, schema_version: impl Into<String>) -> Result<Self, SchemaError> {
        let mut by_id = HashMap::with_capacity(edges.len());
        let mut by_type: HashMap<EdgeType, Vec<usize>> = HashMap::new();
        let mut by_criticality: HashMap<Criticality, Vec<usize>> = HashMap::new();
        let mut dupes = Vec::new();
        for (idx, edge) in edges.iter().enumerate() {
            if by_id.insert(edge.id().clone(), idx).is_some() {
                dupes.push(FieldError::new(
                    format!("edges[{}].id", idx),
                    format!("duplicate edge id {:?}", edge.id().as_str()),
                ));
                continue;
            }
            by_type.entry(edge.kind()).or_default().push(idx);
            by_criticality.entry(edge.criticality()).or_default().push(idx);
        }
        if !dupes.is_empty() {
            return Err(SchemaError::Invalid(dupes));
        }
        tracing::debug!(edges = edges.len(), "edge set indexed");
        Ok(EdgeSet { edges, schema_version: schema_version.into(), by_id, by_type, by_criticality })
    }

    pub fn get(&self, id: &str) -> Option<&Edge> {
        self.by_id.get(id).map(|&i| &self.edges[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn by_type(&self, kind: EdgeType) -> Vec<&Edge> {
        self.indexed(self.by_type.get(&kind))
    }

    pub fn by_criticality(&self, level: Criticality) -> Vec<&Edge> {
        self.indexed(self.by_criticality.get(&level))
    }

    pub fn critical_edges(&self) -> Vec<&Edge> {
        self.by_criticality(Criticality::Critical)
    }

    pub fn targeting_host(&self, host_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target_host().as_str() == host_id).collect()
    }

    /// Wildcard and explicit-list sources only; selector edges need a registry
    /// and are resolved by [`crate::EdgeResolver`].
    pub fn from_host(&self, host_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.matches_source(host_id)).collect()
    }

    pub fn targeting_service(&self, service: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target_service() == service).collect()
    }

    /// Edge types present in this set, in declaration order of first use.
    pub fn types(&self) -> Vec<EdgeType> {
        let mut seen = HashSet::new();
        self.edges.iter().map(Edge::kind).filter(|k| seen.insert(*k)).collect()
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edge> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn indexed(&self, idxs: Option<&Vec<usize>>) -> Vec<&Edge> {
        idxs.map(|v| v.iter().map(|&i| &self.edges[i]).collect()).unwrap_or_default()
    }
}

impl<'a> IntoIterator for &'a EdgeSet {
    type Item = &'a Edge;
    type IntoIter = std::slice::Iter<'a, Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}
