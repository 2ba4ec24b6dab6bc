use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "infralink.yaml";
pub const DEFAULT_REGISTRY: &str = "registry.yml";
pub const DEFAULT_EDGES: &str = "edges.yml";
pub const CHECK_FORMATS: [&str; 4] = ["text", "json", "jsonl", "csv"];
pub const IP_PREFERENCES: [&str; 3] = ["tailscale", "public", "private"];

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub qps: Option<u32>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ResolveConfig {
    pub prefer_ip: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub registry: Option<PathBuf>,
    pub edges: Option<PathBuf>,
    pub check: Option<CheckConfig>,
    pub resolve: Option<ResolveConfig>,
}

impl Config {
    pub fn registry_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.registry.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY))
    }

    pub fn edges_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.edges.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_EDGES))
    }

    pub fn check(&self) -> CheckConfig {
        self.check.clone().unwrap_or_default()
    }

    pub fn prefer_ip(&self) -> Option<&str> {
        self.resolve.as_ref().and_then(|r| r.prefer_ip.as_deref())
    }

    fn validate(&self) -> Result<()> {
        if let Some(f) = self.check.as_ref().and_then(|c| c.format.as_deref()) {
            if !CHECK_FORMATS.contains(&f) {
                bail!("check.format: unknown format {:?} (expected one of {})", f, CHECK_FORMATS.join(", "));
            }
        }
        if let Some(p) = self.prefer_ip() {
            if !IP_PREFERENCES.contains(&p) {
                bail!("resolve.prefer_ip: unknown preference {:?} (expected one of {})", p, IP_PREFERENCES.join(", "));
            }
        }
        Ok(())
    }
}

pub fn parse_config(s: &str) -> Result<Config> {
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

/// An explicit `path` must exist; otherwise `./infralink.yaml` is used when present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(Config::default()); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg = parse_config(&s).with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_override_defaults() {
        let cfg = parse_config("registry: inv/hosts.yml\ncheck:\n  timeout_ms: 750\n  qps: 20\nresolve:\n  prefer_ip: public\n").unwrap();
        assert_eq!(cfg.registry_path(None), PathBuf::from("inv/hosts.yml"));
        assert_eq!(cfg.registry_path(Some("x.yml".into())), PathBuf::from("x.yml"));
        assert_eq!(cfg.edges_path(None), PathBuf::from(DEFAULT_EDGES));
        assert_eq!(cfg.check().timeout_ms, Some(750));
        assert_eq!(cfg.check().concurrency, None);
        assert_eq!(cfg.prefer_ip(), Some("public"));
    }

    #[test]
    fn empty_and_unknown_keys() {
        assert!(parse_config("").unwrap().check.is_none());
        assert!(parse_config("scan:\n  ports: 22\n").is_err());
    }

    #[test]
    fn unknown_values_are_rejected() {
        let err = parse_config("check:\n  format: xml\n").unwrap_err();
        assert!(err.to_string().contains("check.format"));
        let err = parse_config("resolve:\n  prefer_ip: lan\n").unwrap_err();
        assert!(err.to_string().contains("resolve.prefer_ip"));
        for f in CHECK_FORMATS {
            assert!(parse_config(&format!("check:\n  format: {}\n", f)).is_ok());
        }
        assert!(parse_config("resolve:\n  prefer_ip: private\n").is_ok());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/infralink.yaml"))).is_err());
    }
}
