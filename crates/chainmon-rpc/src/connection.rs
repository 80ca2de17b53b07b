//! Daemon connection descriptor and credential discovery.
//!
//! Resolution happens once, at startup, with a fixed precedence:
//!
//! 1. an explicit daemon config file (`rpcuser`/`rpcpassword`, or its cookie file)
//! 2. an explicit user/password pair
//! 3. default discovery in the data directory: `bitcoin.conf`, then `.cookie`
//!
//! If nothing is found the client connects without credentials.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigError;

const CONF_FILE: &str = "bitcoin.conf";
const COOKIE_FILE: &str = ".cookie";

/// RPC credentials. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    UserPass { user: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::UserPass { user, .. } => f
                .debug_struct("UserPass")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Where the credentials came from, for the startup log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ConfigFile(PathBuf),
    Environment,
    Cookie(PathBuf),
    Anonymous,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::ConfigFile(path) => write!(f, "config file {}", path.display()),
            CredentialSource::Environment => f.write_str("user/password settings"),
            CredentialSource::Cookie(path) => write!(f, "cookie file {}", path.display()),
            CredentialSource::Anonymous => f.write_str("no credentials"),
        }
    }
}

/// Fully resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub source: CredentialSource,
}

impl ConnectionDescriptor {
    /// `host:port`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Raw connection settings, as configured.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub conf_path: Option<PathBuf>,
    pub datadir: Option<PathBuf>,
}

impl ConnectionSettings {
    /// Resolve the settings into a descriptor, reading files as needed.
    pub fn resolve(&self) -> Result<ConnectionDescriptor, ConfigError> {
        if self.scheme != "http" {
            return Err(ConfigError::UnsupportedScheme(self.scheme.clone()));
        }

        let descriptor = if let Some(path) = &self.conf_path {
            self.from_conf_file(path)?
        } else if let (Some(user), Some(password)) = (&self.user, &self.password) {
            self.descriptor(
                Credentials::UserPass {
                    user: user.clone(),
                    password: password.clone(),
                },
                CredentialSource::Environment,
            )
        } else {
            self.discover()?
        };

        info!(
            rpc = %descriptor.authority(),
            credentials = %descriptor.source,
            "resolved daemon connection"
        );
        Ok(descriptor)
    }

    fn descriptor(
        &self,
        credentials: Credentials,
        source: CredentialSource,
    ) -> ConnectionDescriptor {
        ConnectionDescriptor {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port,
            credentials,
            source,
        }
    }

    fn discover(&self) -> Result<ConnectionDescriptor, ConfigError> {
        let Some(datadir) = self.datadir.clone().or_else(default_datadir) else {
            debug!("no data directory to search for credentials");
            return Ok(self.descriptor(Credentials::None, CredentialSource::Anonymous));
        };

        let conf = datadir.join(CONF_FILE);
        if conf.is_file() {
            return self.from_conf_file(&conf);
        }

        let cookie = datadir.join(COOKIE_FILE);
        if cookie.is_file() {
            let credentials = read_cookie(&cookie)?;
            return Ok(self.descriptor(credentials, CredentialSource::Cookie(cookie)));
        }

        debug!(datadir = %datadir.display(), "no config or cookie file found");
        Ok(self.descriptor(Credentials::None, CredentialSource::Anonymous))
    }

    fn from_conf_file(&self, path: &Path) -> Result<ConnectionDescriptor, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let conf = parse_conf(&content);

        let mut descriptor =
            self.descriptor(Credentials::None, CredentialSource::ConfigFile(path.to_path_buf()));
        if let Some(host) = conf.get("rpcconnect") {
            descriptor.host = host.clone();
        }
        if let Some(port) = conf.get("rpcport") {
            descriptor.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        if let (Some(user), Some(password)) = (conf.get("rpcuser"), conf.get("rpcpassword")) {
            descriptor.credentials = Credentials::UserPass {
                user: user.clone(),
                password: password.clone(),
            };
            return Ok(descriptor);
        }

        // Relative cookie paths are relative to the data directory.
        let datadir = self
            .datadir
            .clone()
            .or_else(default_datadir)
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let cookie = datadir.join(conf.get("rpccookiefile").map_or(COOKIE_FILE, String::as_str));
        if cookie.is_file() {
            descriptor.credentials = read_cookie(&cookie)?;
            descriptor.source = CredentialSource::Cookie(cookie);
        }
        Ok(descriptor)
    }
}

fn default_datadir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".bitcoin"))
}

/// Parse top-level `key=value` lines of a daemon config file.
///
/// Lines inside `[network]` sections, comments, and blank lines are ignored.
/// Later keys override earlier ones.
fn parse_conf(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            break;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.split('#').next().unwrap_or_default().trim();
            values.insert(key.trim().to_string(), value.to_string());
        }
    }
    values
}

/// Read a `user:password` cookie file written by the daemon.
fn read_cookie(path: &Path) -> Result<Credentials, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let (user, password) = content
        .trim()
        .split_once(':')
        .ok_or_else(|| ConfigError::MalformedCookie(path.to_path_buf()))?;
    Ok(Credentials::UserPass {
        user: user.to_string(),
        password: password.to_string(),
    })
}
