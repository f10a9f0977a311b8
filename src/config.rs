use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr};

/// Environment variable holding the shared secret.
pub const SECRET_ENV: &str = "PRIVATE_KEY";

/// Which object store binding to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-process map; contents are lost on restart.
    Memory,
    /// Payloads on local disk, metadata in SQLite.
    Disk,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "disk" => Ok(Backend::Disk),
            other => bail!("unknown backend `{}` (expected `memory` or `disk`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub health_port: Option<u16>,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub auth_key: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("health_port", &self.health_port)
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("auth_key", &"<redacted>")
            .finish()
    }
}

/// Command-line + environment configuration.
///
/// The shared secret is deliberately not a flag: it is read from
/// `PRIVATE_KEY` only, so it never shows up in process listings.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Shared-secret gate in front of an object store")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_GATE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_GATE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Port for /healthz and /readyz (overrides OBJECT_GATE_HEALTH_PORT)
    #[arg(long)]
    pub health_port: Option<u16>,

    /// Object store binding (overrides OBJECT_GATE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where objects are stored (overrides OBJECT_GATE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_GATE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values looked up with `var`, then defaults.
    pub fn resolve(args: Args, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = var("OBJECT_GATE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&var, "OBJECT_GATE_PORT")?.unwrap_or(8787);
        let env_health_port = parse_var(&var, "OBJECT_GATE_HEALTH_PORT")?;
        let env_backend = parse_var(&var, "OBJECT_GATE_BACKEND")?.unwrap_or(Backend::Disk);
        let env_storage =
            var("OBJECT_GATE_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_db = var("OBJECT_GATE_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/object_gate.db".into());

        let auth_key = var(SECRET_ENV).unwrap_or_default();
        if auth_key.is_empty() {
            bail!("{} must be set to a non-empty shared secret", SECRET_ENV);
        }

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            health_port: args.health_port.or(env_health_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            auth_key,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn health_addr(&self) -> Option<String> {
        self.health_port.map(|port| format!("{}:{}", self.host, port))
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = AppConfig::resolve(Args::default(), env_of(&[(SECRET_ENV, "s")])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8787");
        assert_eq!(cfg.health_addr(), None);
        assert_eq!(cfg.backend, Backend::Disk);
        assert_eq!(cfg.auth_key, "s");
    }

    #[test]
    fn cli_overrides_environment() {
        let env = env_of(&[
            (SECRET_ENV, "s"),
            ("OBJECT_GATE_PORT", "9000"),
            ("OBJECT_GATE_HEALTH_PORT", "9001"),
            ("OBJECT_GATE_BACKEND", "memory"),
        ]);
        let args = Args {
            port: Some(7000),
            ..Default::default()
        };
        let cfg = AppConfig::resolve(args, env).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.health_addr().as_deref(), Some("0.0.0.0:9001"));
        assert_eq!(cfg.backend, Backend::Memory);
    }

    #[test]
    fn missing_or_empty_secret_is_an_error() {
        assert!(AppConfig::resolve(Args::default(), env_of(&[])).is_err());
        assert!(AppConfig::resolve(Args::default(), env_of(&[(SECRET_ENV, "")])).is_err());
    }

    #[test]
    fn bad_numbers_and_backends_are_errors() {
        let err = AppConfig::resolve(
            Args::default(),
            env_of(&[(SECRET_ENV, "s"), ("OBJECT_GATE_PORT", "eighty")]),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("OBJECT_GATE_PORT"));

        assert!(
            AppConfig::resolve(
                Args::default(),
                env_of(&[(SECRET_ENV, "s"), ("OBJECT_GATE_BACKEND", "s3")]),
            )
            .is_err()
        );
    }

    #[test]
    fn debug_output_hides_secret() {
        let cfg = AppConfig::resolve(Args::default(), env_of(&[(SECRET_ENV, "hunter2")])).unwrap();
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
