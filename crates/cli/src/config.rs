use anyhow::{anyhow, Context, Result};
use consensus_ilp::BackendChoice;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const MAX_JOBS: usize = 32;

pub const BACKEND_ENV: &str = "CONSENSUS_SOLVER_BACKEND";
pub const JOBS_ENV: &str = "CONSENSUS_JOBS";

/// Optional TOML run configuration (`--config`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub backend: Option<BackendChoice>,
    pub jobs: Option<usize>,
    pub solve_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(Into::into)
    }
}

/// Raw environment values, captured once so resolution stays testable
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub backend: Option<String>,
    pub jobs: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            backend: std::env::var(BACKEND_ENV).ok(),
            jobs: std::env::var(JOBS_ENV).ok(),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend: Option<BackendChoice>,
    pub jobs: Option<usize>,
    pub solve_timeout_secs: Option<u64>,
}

/// Effective settings for one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub backend: BackendChoice,
    pub jobs: usize,
    /// `None` lets every solve run to completion
    pub solve_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            jobs: default_jobs(),
            solve_timeout: None,
        }
    }
}

impl RunConfig {
    /// Layer defaults < config file < environment < command line.
    pub fn resolve(
        file: Option<FileConfig>,
        env: &EnvConfig,
        flags: &ConfigOverrides,
    ) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(file) = file {
            if let Some(backend) = file.backend {
                cfg.backend = backend;
            }
            if let Some(jobs) = file.jobs {
                cfg.jobs = clamp_jobs(jobs);
            }
            if let Some(secs) = file.solve_timeout_secs {
                cfg.solve_timeout = timeout_from_secs(secs);
            }
        }

        if let Some(raw) = env.backend.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            cfg.backend = raw
                .parse()
                .map_err(|err: String| anyhow!("{BACKEND_ENV}: {err}"))?;
        }
        cfg.jobs = parse_jobs(env.jobs.as_deref(), cfg.jobs);

        if let Some(backend) = flags.backend {
            cfg.backend = backend;
        }
        if let Some(jobs) = flags.jobs {
            cfg.jobs = clamp_jobs(jobs);
        }
        if let Some(secs) = flags.solve_timeout_secs {
            cfg.solve_timeout = timeout_from_secs(secs);
        }

        Ok(cfg)
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_JOBS)
}

fn clamp_jobs(jobs: usize) -> usize {
    jobs.clamp(1, MAX_JOBS)
}

fn parse_jobs(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .map(clamp_jobs)
        .unwrap_or(default_value)
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_jobs_defaults_and_clamps() {
        assert_eq!(parse_jobs(None, 4), 4);
        assert_eq!(parse_jobs(Some("   "), 4), 4);
        assert_eq!(parse_jobs(Some("abc"), 4), 4);
        assert_eq!(parse_jobs(Some(" 6 "), 4), 6);
        assert_eq!(parse_jobs(Some("0"), 4), 1);
        assert_eq!(parse_jobs(Some("999"), 4), MAX_JOBS);
    }

    #[test]
    fn file_config_parses_known_keys() {
        let cfg = FileConfig::parse("backend = \"fallback\"\njobs = 3\nsolve_timeout_secs = 60\n")
            .unwrap();
        assert_eq!(
            cfg,
            FileConfig {
                backend: Some(BackendChoice::Fallback),
                jobs: Some(3),
                solve_timeout_secs: Some(60),
            }
        );
        assert!(FileConfig::parse("threads = 2").is_err());
        assert!(FileConfig::parse("backend = \"gurobi\"").is_err());
    }

    #[test]
    fn later_layers_win() {
        let file = FileConfig {
            backend: Some(BackendChoice::Native),
            jobs: Some(2),
            solve_timeout_secs: Some(30),
        };
        let env = EnvConfig {
            backend: Some("fallback".to_string()),
            jobs: Some("5".to_string()),
        };

        let cfg = RunConfig::resolve(Some(file.clone()), &env, &ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.backend, BackendChoice::Fallback);
        assert_eq!(cfg.jobs, 5);
        assert_eq!(cfg.solve_timeout, Some(Duration::from_secs(30)));

        let flags = ConfigOverrides {
            backend: Some(BackendChoice::Auto),
            jobs: Some(1),
            solve_timeout_secs: Some(0),
        };
        let cfg = RunConfig::resolve(Some(file), &env, &flags).unwrap();
        assert_eq!(cfg.backend, BackendChoice::Auto);
        assert_eq!(cfg.jobs, 1);
        assert_eq!(cfg.solve_timeout, None);
    }

    #[test]
    fn invalid_env_backend_is_an_error() {
        let env = EnvConfig {
            backend: Some("cplex".to_string()),
            jobs: None,
        };
        let err = RunConfig::resolve(None, &env, &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains(BACKEND_ENV));
    }
}
