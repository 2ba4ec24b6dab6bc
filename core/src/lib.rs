//! Topology model for infralink: hosts, the edges between them, and the
//! resolver that turns an edge id into an endpoint or connection URL.

pub mod edge;
pub mod edges;
pub mod error;
pub mod host;
pub mod ids;
pub mod load;
pub mod registry;
pub mod resolver;
pub mod schema;

pub use edge::{AuthType, CheckType, Criticality, Edge, EdgeType, HealthCheckSpec, Selector, SourceHosts};
pub use edges::EdgeSet;
pub use error::{FieldError, ResolveError, SchemaError};
pub use host::{Host, HostStatus, IpPreference};
pub use ids::{EdgeId, HostId};
pub use load::{load_edges, load_registry, load_topology, Topology};
pub use registry::{HostFilter, Registry};
pub use resolver::{Credentials, EdgeResolver, UrlOptions};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
