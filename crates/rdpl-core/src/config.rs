use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{build_catalog, Catalog, Error, Result};

pub const BACKUP_FILE_NAME: &str = "registry_backup.json";

const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_INSTALL_PATH: &str = r"C:\Program Files\RDPLauncher";
const DEFAULT_DATA_DIRECTORY: &str = r"C:\ProgramData\RDPLauncher";
const DEVELOPMENT_LOG_FILE: &str = "service_debug.log";
const PRODUCTION_LOG_FILE: &str = "service.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub environment: Environment,
    pub server_port: u16,
    pub log_path: PathBuf,
    pub install_path: String,
    pub data_directory: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    environment: Option<String>,
    server_port: Option<i64>,
    log_path: Option<PathBuf>,
    install_path: Option<String>,
    data_directory: Option<PathBuf>,
}

impl ServiceConfig {
    /// Defaults, overridden by the optional TOML file, overridden by the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = match config_path {
            Some(path) => Some(fs::read_to_string(path).map_err(|err| {
                Error::io(format!("failed to read config file {}", path.display()), err)
            })?),
            None => None,
        };
        Self::from_sources(file.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: ConfigFile = match file {
            Some(raw) => toml::from_str(raw)
                .map_err(|err| Error::Config(format!("failed to parse config file: {err}")))?,
            None => ConfigFile::default(),
        };
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let environment = env("RDPL_ENV")
            .or(file.environment)
            .map(|value| Environment::parse(&value))
            .unwrap_or(Environment::Development);

        let server_port = match (env("SERVER_PORT"), file.server_port) {
            (Some(raw), _) => parse_port(raw.trim())?,
            (None, Some(port)) => port_from_int(port)?,
            (None, None) => DEFAULT_SERVER_PORT,
        };

        let install_path = env("INSTALL_PATH")
            .or(file.install_path)
            .unwrap_or_else(|| DEFAULT_INSTALL_PATH.to_string());
        let data_directory = env("DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_directory)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIRECTORY));
        let log_path = env("LOG_PATH")
            .map(PathBuf::from)
            .or(file.log_path)
            .unwrap_or_else(|| match environment {
                Environment::Development => PathBuf::from(DEVELOPMENT_LOG_FILE),
                Environment::Production => data_directory.join(PRODUCTION_LOG_FILE),
            });

        Ok(Self {
            environment,
            server_port,
            log_path,
            install_path,
            data_directory,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn catalog(&self) -> Catalog {
        build_catalog(
            &self.install_path,
            u32::from(self.server_port),
            &self.data_directory,
        )
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    let port = raw
        .parse::<i64>()
        .map_err(|_| Error::Config(format!("server port must be an integer: {raw}")))?;
    port_from_int(port)
}

fn port_from_int(port: i64) -> Result<u16> {
    match u16::try_from(port) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(Error::Config(format!(
            "server port must be between 1 and 65535: {port}"
        ))),
    }
}
