use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_NAV_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SETTLE_MS: u64 = 2000;
const DEFAULT_MAX_SESSIONS: usize = 4;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db: DbConfig,
    pub capture: CaptureConfig,
}

/// One backend address, two credential tiers. All three are required; a
/// missing value is fatal at startup.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub anon: Credentials,
    pub service: Credentials,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub nav_timeout: Duration,
    pub settle: Duration,
    pub max_sessions: usize,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            nav_timeout: Duration::from_secs(DEFAULT_NAV_TIMEOUT_SECS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an injectable lookup so tests don't touch the process
    /// environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND.to_string());

        let addr = get("DATABASE_ADDR").context("DATABASE_ADDR not set")?;
        let (host, port, dbname) = parse_addr(&addr)?;
        let anon = parse_credentials(
            &get("DATABASE_ANON_ROLE").context("DATABASE_ANON_ROLE not set")?,
            "DATABASE_ANON_ROLE",
        )?;
        let service = parse_credentials(
            &get("DATABASE_SERVICE_ROLE").context("DATABASE_SERVICE_ROLE not set")?,
            "DATABASE_SERVICE_ROLE",
        )?;

        let capture = CaptureConfig {
            nav_timeout: Duration::from_secs(parse_or(
                get("CAPTURE_NAV_TIMEOUT_SECS"),
                DEFAULT_NAV_TIMEOUT_SECS,
                "CAPTURE_NAV_TIMEOUT_SECS",
            )?),
            settle: Duration::from_millis(parse_or(
                get("CAPTURE_SETTLE_MS"),
                DEFAULT_SETTLE_MS,
                "CAPTURE_SETTLE_MS",
            )?),
            max_sessions: parse_or(
                get("CAPTURE_MAX_SESSIONS"),
                DEFAULT_MAX_SESSIONS,
                "CAPTURE_MAX_SESSIONS",
            )?,
            user_agent: get("CAPTURE_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ..CaptureConfig::default()
        };

        Ok(Self {
            bind_addr,
            db: DbConfig {
                host,
                port,
                dbname,
                anon,
                service,
            },
            capture,
        })
    }
}

/// `host:port/dbname`, e.g. `localhost:5432/pagestash`.
fn parse_addr(addr: &str) -> Result<(String, u16, String)> {
    let (hostport, dbname) = match addr.split_once('/') {
        Some((hp, db)) if !db.is_empty() => (hp, db),
        _ => bail!("DATABASE_ADDR must look like host:port/dbname, got {addr:?}"),
    };
    let (host, port) = match hostport.split_once(':') {
        Some((h, p)) if !h.is_empty() => (h, p),
        _ => bail!("DATABASE_ADDR must look like host:port/dbname, got {addr:?}"),
    };
    let port: u16 = port
        .parse()
        .with_context(|| format!("DATABASE_ADDR port {port:?} is not a number"))?;
    Ok((host.to_string(), port, dbname.to_string()))
}

/// `user:password`. The password may itself contain colons.
fn parse_credentials(raw: &str, var: &str) -> Result<Credentials> {
    match raw.split_once(':') {
        Some((user, password)) if !user.is_empty() => Ok(Credentials {
            user: user.to_string(),
            password: password.to_string(),
        }),
        _ => bail!("{var} must look like user:password"),
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T, var: &str) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| anyhow::anyhow!("{var} has an invalid value: {s:?}")),
    }
}
