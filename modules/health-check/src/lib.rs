//! Edge health checks: resolve an edge's target, pick a probe from its declared
//! check type, and report a timestamped result.

pub mod probe;

use anyhow::Result;
use infralink_core::{CheckType, Criticality, Edge, EdgeResolver, EdgeType, IpPreference};
use reqwest::{redirect::Policy, Client};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{interval, MissedTickBehavior};

pub use probe::Outcome;

/// Check type reported when the target could not be resolved.
pub const RESOLUTION: &str = "resolution";
pub const UNKNOWN_ENDPOINT: &str = "unknown";
/// Message reported for an edge whose probe task ended without a result.
pub const TASK_ABORTED: &str = "Check task aborted";
const MIN_PACING: Duration = Duration::from_millis(1);
const DEFAULT_HTTP_PATH: &str = "/";
const DEFAULT_API_PATH: &str = "/health";

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub edge_id: String,
    pub edge_type: EdgeType,
    pub target_endpoint: String,
    pub healthy: bool,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
    pub criticality: Criticality,
    pub check_type: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl HealthCheckResult {
    pub fn is_critical_failure(&self) -> bool {
        !self.healthy && self.criticality == Criticality::Critical
    }
}

#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Overrides each edge's declared healthcheck timeout.
    pub timeout: Option<Duration>,
    pub prefer: IpPreference,
    pub concurrency: usize,
    pub qps: Option<u32>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions { timeout: None, prefer: IpPreference::default(), concurrency: 16, qps: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Tcp,
    Http { tls: bool, path: String },
    RedisPing,
}

impl Probe {
    /// Probe and reported check type for a declared check. `query` has no probe
    /// of its own and falls back to TCP.
    pub fn for_check(kind: CheckType, path: Option<&str>) -> (Probe, &'static str) {
        let path_or = |default: &str| {
            let p = path.filter(|p| !p.is_empty()).unwrap_or(default);
            if p.starts_with('/') {
                p.to_string()
            } else {
                format!("/{}", p)
            }
        };
        match kind {
            CheckType::Tcp | CheckType::Query => (Probe::Tcp, "tcp"),
            CheckType::Http => (Probe::Http { tls: false, path: path_or(DEFAULT_HTTP_PATH) }, "http"),
            CheckType::Https => (Probe::Http { tls: true, path: path_or(DEFAULT_HTTP_PATH) }, "https"),
            CheckType::Api => (Probe::Http { tls: false, path: path_or(DEFAULT_API_PATH) }, "api"),
            CheckType::Ping => (Probe::RedisPing, "ping"),
        }
    }
}

/// Everything a probe task needs, resolved up front so tasks own their data.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    pub edge_id: String,
    pub edge_type: EdgeType,
    pub criticality: Criticality,
    pub addr: SocketAddr,
    pub probe: Probe,
    pub check_type: &'static str,
    pub timeout: Duration,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

/// Resolve `edge` into a probe plan, or into the unhealthy `resolution` result
/// when its target has no usable address.
pub fn plan(resolver: &EdgeResolver<'_>, edge: &Edge, opts: &CheckOptions) -> Result<ProbePlan, HealthCheckResult> {
    let id = edge.id().as_str();
    let ip = resolver.get_target_ip(id, opts.prefer).map_err(|e| HealthCheckResult {
        edge_id: id.to_string(),
        edge_type: edge.kind(),
        target_endpoint: UNKNOWN_ENDPOINT.to_string(),
        healthy: false,
        latency_ms: None,
        message: Some(e.to_string()),
        criticality: edge.criticality(),
        check_type: RESOLUTION.to_string(),
        timestamp: now_rfc3339(),
    })?;
    let spec = edge.healthcheck();
    let (probe, check_type) = Probe::for_check(spec.kind, spec.path.as_deref());
    Ok(ProbePlan {
        edge_id: id.to_string(),
        edge_type: edge.kind(),
        criticality: edge.criticality(),
        addr: SocketAddr::new(ip, edge.target_port()),
        probe,
        check_type,
        timeout: opts.timeout.unwrap_or(spec.timeout),
    })
}

pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .redirect(Policy::none())
        .user_agent(concat!("infralink/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub async fn run(plan: ProbePlan, client: &Client) -> HealthCheckResult {
    let timestamp = now_rfc3339();
    let outcome = match &plan.probe {
        Probe::Tcp => probe::tcp(plan.addr, plan.timeout).await,
        Probe::RedisPing => probe::redis_ping(plan.addr, plan.timeout).await,
        Probe::Http { tls, path } => {
            let scheme = if *tls { "https" } else { "http" };
            let url = format!("{}://{}{}", scheme, plan.addr, path);
            probe::http(client, &url, plan.timeout).await
        }
    };
    tracing::debug!(
        edge = %plan.edge_id,
        endpoint = %plan.addr,
        check = plan.check_type,
        healthy = outcome.healthy,
        message = outcome.message.as_deref().unwrap_or(""),
        "probe finished"
    );
    HealthCheckResult {
        edge_id: plan.edge_id,
        edge_type: plan.edge_type,
        target_endpoint: plan.addr.to_string(),
        healthy: outcome.healthy,
        latency_ms: outcome.latency_ms,
        message: outcome.message,
        criticality: plan.criticality,
        check_type: plan.check_type.to_string(),
        timestamp,
    }
}

pub async fn check_edge(resolver: &EdgeResolver<'_>, edge: &Edge, opts: &CheckOptions) -> Result<HealthCheckResult> {
    match plan(resolver, edge, opts) {
        Ok(p) => Ok(run(p, &http_client()?).await),
        Err(unresolved) => Ok(unresolved),
    }
}

/// Spacing between probe launches for `qps`, never shorter than 1ms.
/// `None` when `qps` is zero.
pub fn pacing_period(qps: u32) -> Option<Duration> {
    if qps == 0 {
        return None;
    }
    Some(Duration::from_micros(1_000_000 / u64::from(qps)).max(MIN_PACING))
}

fn aborted(plan: &ProbePlan) -> HealthCheckResult {
    HealthCheckResult {
        edge_id: plan.edge_id.clone(),
        edge_type: plan.edge_type,
        target_endpoint: plan.addr.to_string(),
        healthy: false,
        latency_ms: None,
        message: Some(TASK_ABORTED.to_string()),
        criticality: plan.criticality,
        check_type: plan.check_type.to_string(),
        timestamp: now_rfc3339(),
    }
}

/// Check `edges` concurrently, bounded by `opts.concurrency` and paced by
/// `opts.qps`. Results come back in input order.
pub async fn check_edges(
    resolver: &EdgeResolver<'_>,
    edges: &[&Edge],
    opts: &CheckOptions,
) -> Result<Vec<HealthCheckResult>> {
    let client = http_client()?;
    let mut slots: Vec<Option<HealthCheckResult>> = vec![None; edges.len()];
    let mut plans = Vec::new();
    for (idx, edge) in edges.iter().enumerate() {
        match plan(resolver, edge, opts) {
            Ok(p) => plans.push((idx, p)),
            Err(unresolved) => {
                tracing::debug!(edge = %edge.id(), "target unresolved");
                slots[idx] = Some(unresolved);
            }
        }
    }

    let (tx, mut rx) = mpsc::channel::<(usize, HealthCheckResult)>(plans.len().max(1));
    let sem = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let mut ticker = opts.qps.and_then(pacing_period).map(|period| {
        let mut it = interval(period);
        it.set_missed_tick_behavior(MissedTickBehavior::Delay);
        it
    });

    for (idx, p) in plans {
        // Overwritten by the task's result unless the task dies first.
        slots[idx] = Some(aborted(&p));
        if let Some(t) = ticker.as_mut() {
            t.tick().await;
        }
        let permit = sem.clone().acquire_owned().await?;
        let tx = tx.clone();
        let client = client.clone();
        tokio::spawn(async move {
            let result = run(p, &client).await;
            let _ = tx.send((idx, result)).await;
            drop(permit);
        });
    }
    drop(tx);
    while let Some((idx, result)) = rx.recv().await {
        slots[idx] = Some(result);
    }
    Ok(slots.into_iter().flatten().collect())
}
