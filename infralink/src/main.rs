use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use health_check::CheckOptions;
use infralink_core::{
    Criticality, Edge, EdgeType, HostFilter, HostStatus, IpPreference, Topology, UrlOptions,
};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use config::IP_PREFERENCES;
use tracing_subscriber::EnvFilter;

mod config;
mod report;

const EDGE_TYPES: [&str; 7] = ["database", "queue", "cluster", "telemetry", "monitoring", "api", "storage"];
const CRITICALITIES: [&str; 4] = ["critical", "high", "medium", "low"];
const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ListFormat { Text, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CheckFormat { Text, Json, Jsonl, Csv }

impl CheckFormat {
    fn from_config(s: &str) -> Option<Self> {
        match s {
            "text" => Some(CheckFormat::Text),
            "json" => Some(CheckFormat::Json),
            "jsonl" => Some(CheckFormat::Jsonl),
            "csv" => Some(CheckFormat::Csv),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ResolveFormat { Url, Endpoint, Ip, Json, Env }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DiagramFormat { Mermaid, Dot, All }

#[derive(Debug, Parser)]
#[command(name = "infralink", version, about = "Infrastructure topology: hosts, edges, resolution and health checks")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./infralink.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Registry YAML file (default: registry.yml)
    #[arg(short, long, global = true, value_name = "FILE")]
    registry: Option<PathBuf>,
    /// Edges YAML file (default: edges.yml). Falls back to edges embedded in the registry.
    #[arg(short, long, global = true, value_name = "FILE")]
    edges: Option<PathBuf>,
    /// Log verbosity on stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Registry and edge summary
    Info,
    /// List hosts
    Hosts {
        #[arg(long, value_parser=["active","terminated","provisioning","maintenance"])]
        status: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        cloud: Option<String>,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, value_enum, default_value_t = ListFormat::Text)]
        format: ListFormat,
    },
    /// List declared edges
    Edges {
        #[arg(long = "type", value_parser = EDGE_TYPES)]
        kind: Option<String>,
        #[arg(long, value_parser = CRITICALITIES)]
        criticality: Option<String>,
        #[arg(long, value_enum, default_value_t = ListFormat::Text)]
        format: ListFormat,
    },
    /// Check cross references between hosts and edges
    Validate {
        /// Fail on warnings
        #[arg(long, default_value_t = false)]
        strict: bool,
        /// Also require every edge target to have an address
        #[arg(long, default_value_t = false)]
        check_resolution: bool,
    },
    /// Resolve an edge to its endpoint or connection URL
    Resolve {
        edge_id: String,
        #[arg(short, long, value_enum, default_value_t = ResolveFormat::Endpoint)]
        format: ResolveFormat,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long, conflicts_with = "password_env")]
        password: Option<String>,
        /// Environment variable holding the password
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,
        #[arg(short, long)]
        database: Option<String>,
        #[arg(long, value_parser = IP_PREFERENCES)]
        prefer_ip: Option<String>,
    },
    /// Probe edges and report health. Exit 1 on any failure, 2 on a critical failure.
    Check {
        /// Edge id(s) to check (default: all)
        #[arg(long = "edge", value_name = "ID")]
        edge_ids: Vec<String>,
        #[arg(long = "type", value_parser = EDGE_TYPES)]
        kind: Option<String>,
        #[arg(long, value_parser = CRITICALITIES)]
        criticality: Option<String>,
        #[arg(long, default_value_t = false)]
        critical_only: bool,
        /// Per-probe timeout; defaults to each edge's declared healthcheck timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        concurrency: Option<usize>,
        /// QPS cap for probe launches; 0 disables pacing
        #[arg(long)]
        qps: Option<u32>,
        #[arg(long, value_parser = IP_PREFERENCES)]
        prefer_ip: Option<String>,
        #[arg(long, value_enum)]
        format: Option<CheckFormat>,
        /// Output file (overwrites)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Generate topology diagrams
    Diagram {
        #[arg(short, long, value_enum, default_value_t = DiagramFormat::Mermaid)]
        format: DiagramFormat,
        #[arg(short, long, default_value = "docs/diagrams")]
        output: PathBuf,
        #[arg(short, long)]
        group: Option<String>,
        #[arg(long, default_value_t = false)]
        include_terminated: bool,
        /// Print to stdout instead of writing files
        #[arg(long, default_value_t = false)]
        stdout: bool,
    },
    /// Generate Markdown host and edge reference pages
    Docs {
        #[arg(short, long, default_value = "docs/hosts")]
        output: PathBuf,
        /// Only this host (id, prefix or name); default: all active hosts
        #[arg(long, value_name = "HOST")]
        host: Option<String>,
        /// Only write the host index
        #[arg(long, default_value_t = false)]
        index_only: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let default = format!("infralink={level},health_check={level},diagram={level}");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn open_out(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => {
            let file = OpenOptions::new().create(true).truncate(true).write(true).open(p)
                .with_context(|| format!("failed to open {}", p.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(std::io::stdout().lock()),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let code = run(cli)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    let cfg = config::load_config(cli.config.as_deref())?;
    let registry_path = cfg.registry_path(cli.registry);
    let edges_path = cfg.edges_path(cli.edges);
    let load = || -> Result<Topology> {
        infralink_core::load_topology(&registry_path, &edges_path)
            .with_context(|| format!("failed to load topology from {}", registry_path.display()))
    };

    match cli.command {
        Commands::Version => {
            println!("infralink {} (core {})", env!("CARGO_PKG_VERSION"), infralink_core::version());
        }
        Commands::Info => {
            let t = load()?;
            println!(
                "{}",
                report::info_text(&t, &registry_path.display().to_string(), &edges_path.display().to_string())
            );
        }
        Commands::Hosts { status, group, cloud, service, role, format } => {
            let t = load()?;
            let filter = HostFilter {
                status: status.as_deref().and_then(HostStatus::parse),
                group: group.as_deref(),
                cloud: cloud.as_deref(),
                service: service.as_deref(),
                role: role.as_deref(),
            };
            let mut hosts = t.registry.filter(&filter);
            match format {
                ListFormat::Text => {
                    hosts.sort_by(|a, b| a.canonical_name().cmp(b.canonical_name()));
                    for h in hosts { println!("{}", report::host_line(h)); }
                }
                ListFormat::Json => println!("{}", serde_json::to_string_pretty(&hosts)?),
            }
        }
        Commands::Edges { kind, criticality, format } => {
            let t = load()?;
            let kind = kind.as_deref().and_then(EdgeType::parse);
            let criticality = criticality.as_deref().and_then(Criticality::parse);
            let edges: Vec<&Edge> = t.edges.iter()
                .filter(|e| kind.map_or(true, |k| e.kind() == k))
                .filter(|e| criticality.map_or(true, |c| e.criticality() == c))
                .collect();
            match format {
                ListFormat::Text => {
                    if edges.is_empty() { eprintln!("no edges declared"); }
                    for e in edges { println!("{}", report::edge_line(e)); }
                }
                ListFormat::Json => println!("{}", serde_json::to_string_pretty(&edges)?),
            }
        }
        Commands::Validate { strict, check_resolution } => {
            let t = load()?;
            println!("registry: {} hosts", t.registry.len());
            println!("edges:    {} edges (schema {})", t.edges.len(), t.edges.schema_version());
            let v = report::validate(&t, check_resolution);
            for e in &v.errors { println!("error:   {}", e); }
            for w in &v.warnings { println!("warning: {}", w); }
            println!("{} error(s), {} warning(s)", v.errors.len(), v.warnings.len());
            if !v.passed(strict) {
                println!("validation failed{}", if v.errors.is_empty() { " (strict)" } else { "" });
                return Ok(1);
            }
            println!("validation passed");
        }
        Commands::Resolve { edge_id, format, user, password, password_env, database, prefer_ip } => {
            let t = load()?;
            let res = t.resolver();
            let prefer = IpPreference::from(prefer_ip.as_deref().or(cfg.prefer_ip()).unwrap_or("tailscale"));
            let password = match password_env {
                Some(var) => Some(std::env::var(&var).map_err(|_| anyhow!("environment variable not set: {}", var))?),
                None => password,
            };
            match format {
                ResolveFormat::Ip => println!("{}", res.get_target_ip(&edge_id, prefer)?),
                ResolveFormat::Endpoint => println!("{}", res.get_target_endpoint(&edge_id, prefer)?),
                ResolveFormat::Url => {
                    let opts = UrlOptions {
                        user: user.as_deref(),
                        password: password.as_deref(),
                        database: database.as_deref(),
                        prefer,
                        ..Default::default()
                    };
                    println!("{}", res.get_url(&edge_id, &opts)?);
                }
                ResolveFormat::Json => println!("{}", serde_json::to_string_pretty(&report::resolve_json(&res, &edge_id)?)?),
                ResolveFormat::Env => {
                    for line in report::env_lines(&res, &edge_id, prefer, user.as_deref(), database.as_deref())? {
                        println!("{}", line);
                    }
                }
            }
        }
        Commands::Check { edge_ids, kind, criticality, critical_only, timeout_ms, concurrency, qps, prefer_ip, format, out } => {
            let t = load()?;
            let file_cfg = cfg.check();
            let timeout_ms = timeout_ms.or(file_cfg.timeout_ms);
            let concurrency = concurrency.or(file_cfg.concurrency).unwrap_or(DEFAULT_CONCURRENCY);
            let qps = qps.or(file_cfg.qps).filter(|&q| q > 0);
            let format = format
                .or_else(|| file_cfg.format.as_deref().and_then(CheckFormat::from_config))
                .unwrap_or(CheckFormat::Text);

            let mut selected: Vec<&Edge> = if edge_ids.is_empty() {
                t.edges.iter().collect()
            } else {
                edge_ids.iter()
                    .map(|id| t.edges.get(id).ok_or_else(|| anyhow!("edge not found: {}", id)))
                    .collect::<Result<_>>()?
            };
            let kind = kind.as_deref().and_then(EdgeType::parse);
            let criticality = criticality.as_deref().and_then(Criticality::parse);
            selected.retain(|e| kind.map_or(true, |k| e.kind() == k));
            selected.retain(|e| criticality.map_or(true, |c| e.criticality() == c));
            if critical_only { selected.retain(|e| e.is_critical()); }
            if selected.is_empty() {
                eprintln!("no edges to check");
                return Ok(0);
            }

            let opts = CheckOptions {
                timeout: timeout_ms.map(Duration::from_millis),
                prefer: IpPreference::from(prefer_ip.as_deref().or(cfg.prefer_ip()).unwrap_or("tailscale")),
                concurrency,
                qps,
            };
            tracing::info!(edges = selected.len(), concurrency, ?qps, "checking edges");
            let rt = tokio::runtime::Runtime::new()?;
            let res = t.resolver();
            let results = rt.block_on(health_check::check_edges(&res, &selected, &opts))?;

            let mut w = open_out(out.as_deref())?;
            match format {
                CheckFormat::Text => {
                    for r in &results { writeln!(w, "{}", report::check_line(r))?; }
                    writeln!(w, "{}", report::check_summary(&results))?;
                }
                CheckFormat::Json => writeln!(w, "{}", serde_json::to_string_pretty(&results)?)?,
                CheckFormat::Jsonl => {
                    for r in &results { writeln!(w, "{}", serde_json::to_string(r)?)?; }
                }
                CheckFormat::Csv => report::write_check_csv(&mut w, &results)?,
            }
            w.flush()?;
            return Ok(report::check_exit_code(&results));
        }
        Commands::Diagram { format, output, group, include_terminated, stdout } => {
            let t = load()?;
            let hosts = diagram::select_hosts(&t.registry, group.as_deref(), include_terminated);
            if hosts.is_empty() {
                eprintln!("no hosts match filter criteria");
                return Ok(0);
            }
            let formats: Vec<diagram::Format> = match format {
                DiagramFormat::Mermaid => vec![diagram::Format::Mermaid],
                DiagramFormat::Dot => vec![diagram::Format::Dot],
                DiagramFormat::All => diagram::Format::ALL.to_vec(),
            };
            for f in formats {
                let content = f.render(&hosts, &t.edges);
                if stdout {
                    println!("--- {} ---", f.as_str());
                    println!("{}", content);
                } else {
                    fs::create_dir_all(&output).with_context(|| format!("failed to create {}", output.display()))?;
                    let path = output.join(f.file_name());
                    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
                    println!("generated: {}", path.display());
                }
            }
        }
        Commands::Docs { output, host, index_only } => {
            let t = load()?;
            let stamp = docs::generated_at();
            let mut pages = vec![(output.join(docs::INDEX_FILE), docs::host_index(&t.registry, &t.edges, &stamp))];
            if !index_only {
                let hosts = match host.as_deref() {
                    Some(h) => vec![t.registry.get(h).ok_or_else(|| anyhow!("host not found: {}", h))?],
                    None => t.registry.active_hosts(),
                };
                for h in hosts {
                    pages.push((output.join(docs::page_file_name(h)), docs::host_page(h, &t.edges, &t.registry, &stamp)));
                }
                if !t.edges.is_empty() {
                    pages.push((output.join(docs::EDGE_INDEX_FILE), docs::edge_index(&t.edges, &t.registry, &stamp)));
                }
            }
            for (path, content) in &pages {
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
                }
                fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
                tracing::debug!(path = %path.display(), "page written");
            }
            println!("generated {} file(s) in {}", pages.len(), output.display());
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_and_check_options() {
        let cli = Cli::try_parse_from([
            "infralink", "-r", "hosts.yml", "-vv", "check", "--edge", "a", "--edge", "b",
            "--critical-only", "--qps", "0", "--format", "jsonl",
        ])
        .unwrap();
        assert_eq!(cli.registry, Some(PathBuf::from("hosts.yml")));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Check { edge_ids, critical_only, qps, format, .. } => {
                assert_eq!(edge_ids, ["a", "b"]);
                assert!(critical_only);
                assert_eq!(qps, Some(0));
                assert_eq!(format, Some(CheckFormat::Jsonl));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn resolve_rejects_both_password_sources() {
        let r = Cli::try_parse_from(["infralink", "resolve", "x", "-p", "pw", "--password-env", "PW"]);
        assert!(r.is_err());
        assert!(Cli::try_parse_from(["infralink", "resolve", "x", "--prefer-ip", "lan"]).is_err());
    }

    #[test]
    fn docs_options() {
        let cli = Cli::try_parse_from(["infralink", "docs", "--host", "prod-db", "-o", "out"]).unwrap();
        match cli.command {
            Commands::Docs { output, host, index_only } => {
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(host.as_deref(), Some("prod-db"));
                assert!(!index_only);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        match Cli::try_parse_from(["infralink", "docs", "--index-only"]).unwrap().command {
            Commands::Docs { output, index_only, .. } => {
                assert_eq!(output, PathBuf::from("docs/hosts"));
                assert!(index_only);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn config_format_names() {
        assert_eq!(CheckFormat::from_config("csv"), Some(CheckFormat::Csv));
        assert_eq!(CheckFormat::from_config("xml"), None);
    }
}
