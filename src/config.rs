//! Configuration module for tcp-fileshare.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tcp-fileshare")]
#[command(author = "tcp-fileshare authors")]
#[command(version = "0.1.0")]
#[command(about = "Multi-client TCP file server and client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// What to do
#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the file server
    Serve {
        /// Address to bind to (e.g., 0.0.0.0:5001)
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Directory where uploaded files are stored and served from
        #[arg(short = 'd', long)]
        storage_dir: Option<PathBuf>,

        /// Maximum number of connections serviced at once
        #[arg(long)]
        max_connections: Option<usize>,

        /// Listen backlog for pending connections
        #[arg(long)]
        backlog: Option<i32>,
    },

    /// Download a file from the server
    Get {
        /// Server address (e.g., 127.0.0.1:5001)
        #[arg(short, long)]
        server: Option<String>,

        /// Directory downloads are saved to when no local path is given
        #[arg(short = 'd', long)]
        download_dir: Option<PathBuf>,

        /// Name of the file on the server
        remote: String,

        /// Where to save the file
        local: Option<PathBuf>,
    },

    /// Upload a file to the server
    Put {
        /// Server address (e.g., 127.0.0.1:5001)
        #[arg(short, long)]
        server: Option<String>,

        /// File to upload
        local: PathBuf,

        /// Name to store the file under on the server
        remote: Option<String>,
    },

    /// Send a text message to the server
    Msg {
        /// Server address (e.g., 127.0.0.1:5001)
        #[arg(short, long)]
        server: Option<String>,

        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Directory files are stored in
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            storage_dir: default_storage_dir(),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Server address to connect to
    #[serde(default = "default_server")]
    pub server: String,
    /// Directory downloads are saved to
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            download_dir: default_download_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("server_files")
}

fn default_max_connections() -> usize {
    10_000
}

fn default_backlog() -> i32 {
    128
}

fn default_server() -> String {
    "127.0.0.1:5001".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: String,
    pub storage_dir: PathBuf,
    pub max_connections: usize,
    pub backlog: i32,
}

/// Resolved action to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Serve,
    Get { remote: String, local: PathBuf },
    Put { local: PathBuf, remote: String },
    Msg { text: String },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerSettings,
    /// Address the client commands connect to
    pub server_addr: String,
    pub log_level: String,
    pub action: Action,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let TomlConfig {
            server: server_toml,
            client: client_toml,
            logging,
        } = toml_config;

        let mut server = ServerSettings {
            listen: server_toml.listen,
            storage_dir: server_toml.storage_dir,
            max_connections: server_toml.max_connections,
            backlog: server_toml.backlog,
        };
        let mut server_addr = client_toml.server;

        let action = match cli.command {
            CliCommand::Serve {
                listen,
                storage_dir,
                max_connections,
                backlog,
            } => {
                server.listen = listen.unwrap_or(server.listen);
                server.storage_dir = storage_dir.unwrap_or(server.storage_dir);
                server.max_connections = max_connections.unwrap_or(server.max_connections);
                server.backlog = backlog.unwrap_or(server.backlog);
                Action::Serve
            }
            CliCommand::Get {
                server: addr,
                download_dir,
                remote,
                local,
            } => {
                server_addr = addr.unwrap_or(server_addr);
                let local = match local {
                    Some(local) => local,
                    None => {
                        let dir = download_dir.unwrap_or(client_toml.download_dir);
                        dir.join(file_name_of(Path::new(&remote))?)
                    }
                };
                Action::Get { remote, local }
            }
            CliCommand::Put {
                server: addr,
                local,
                remote,
            } => {
                server_addr = addr.unwrap_or(server_addr);
                let remote = match remote {
                    Some(remote) => remote,
                    None => file_name_of(&local)?,
                };
                Action::Put { local, remote }
            }
            CliCommand::Msg { server: addr, text } => {
                server_addr = addr.unwrap_or(server_addr);
                Action::Msg {
                    text: text.join(" "),
                }
            }
        };

        if action == Action::Serve {
            validate_max_connections(server.max_connections)?;
        }

        Ok(Config {
            server,
            server_addr,
            log_level: cli.log_level.unwrap_or(logging.level),
            action,
        })
    }
}

/// The connection cap sizes a semaphore; zero would never admit anyone.
fn validate_max_connections(max: usize) -> Result<(), ConfigError> {
    if max == 0 || max > Semaphore::MAX_PERMITS {
        return Err(ConfigError::InvalidMaxConnections(max));
    }
    Ok(())
}

fn file_name_of(path: &Path) -> Result<String, ConfigError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ConfigError::NoFileName(path.to_path_buf()))
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    NoFileName(PathBuf),
    InvalidMaxConnections(usize),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::NoFileName(path) => {
                write!(f, "'{}' has no file name to use", path.display())
            }
            ConfigError::InvalidMaxConnections(max) => write!(
                f,
                "max_connections must be between 1 and {}, got {}",
                Semaphore::MAX_PERMITS,
                max
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["tcp-fileshare"];
        argv.extend_from_slice(args);
        Config::from_args(CliArgs::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:5001");
        assert_eq!(config.server.storage_dir, PathBuf::from("server_files"));
        assert_eq!(config.server.max_connections, 10_000);
        assert_eq!(config.client.server, "127.0.0.1:5001");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:6000"
            storage_dir = "/srv/files"
            max_connections = 16

            [client]
            server = "files.example.net:6000"
            download_dir = "downloads"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:6000");
        assert_eq!(config.server.storage_dir, PathBuf::from("/srv/files"));
        assert_eq!(config.server.max_connections, 16);
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.client.server, "files.example.net:6000");
        assert_eq!(config.client.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_serve_defaults() {
        let config = parse(&["serve"]).unwrap();
        assert_eq!(config.action, Action::Serve);
        assert_eq!(config.server.listen, "0.0.0.0:5001");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fileshare.toml");
        std::fs::write(
            &path,
            "[server]\nlisten = \"127.0.0.1:7000\"\nstorage_dir = \"from-toml\"\n\n[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();
        let path = path.to_str().unwrap();

        let config = parse(&["-c", path, "serve", "-d", "from-cli"]).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:7000");
        assert_eq!(config.server.storage_dir, PathBuf::from("from-cli"));
        assert_eq!(config.log_level, "warn");

        let config = parse(&["serve", "--log-level", "trace", "-c", path]).unwrap();
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_get_default_local_path() {
        let config = parse(&["get", "-d", "downloads", "reports/q3.pdf"]).unwrap();
        assert_eq!(
            config.action,
            Action::Get {
                remote: "reports/q3.pdf".to_string(),
                local: PathBuf::from("downloads").join("q3.pdf"),
            }
        );
        assert_eq!(config.server_addr, "127.0.0.1:5001");
    }

    #[test]
    fn test_get_explicit_local_path() {
        let config = parse(&["get", "-s", "10.0.0.2:5001", "a.txt", "b.txt"]).unwrap();
        assert_eq!(
            config.action,
            Action::Get {
                remote: "a.txt".to_string(),
                local: PathBuf::from("b.txt"),
            }
        );
        assert_eq!(config.server_addr, "10.0.0.2:5001");
    }

    #[test]
    fn test_put_default_remote_name() {
        let config = parse(&["put", "/tmp/video.mp4"]).unwrap();
        assert_eq!(
            config.action,
            Action::Put {
                local: PathBuf::from("/tmp/video.mp4"),
                remote: "video.mp4".to_string(),
            }
        );
    }

    #[test]
    fn test_put_without_file_name() {
        assert!(matches!(
            parse(&["put", ".."]),
            Err(ConfigError::NoFileName(_))
        ));
    }

    #[test]
    fn test_msg_joins_words() {
        let config = parse(&["msg", "hello", "there"]).unwrap();
        assert_eq!(
            config.action,
            Action::Msg {
                text: "hello there".to_string()
            }
        );
    }

    #[test]
    fn test_max_connections_bounds() {
        assert!(matches!(
            parse(&["serve", "--max-connections", "0"]),
            Err(ConfigError::InvalidMaxConnections(0))
        ));

        let too_many = (Semaphore::MAX_PERMITS + 1).to_string();
        assert!(matches!(
            parse(&["serve", "--max-connections", &too_many]),
            Err(ConfigError::InvalidMaxConnections(_))
        ));

        let largest = Semaphore::MAX_PERMITS.to_string();
        let config = parse(&["serve", "--max-connections", &largest]).unwrap();
        assert_eq!(config.server.max_connections, Semaphore::MAX_PERMITS);

        let config = parse(&["serve", "--max-connections", "1"]).unwrap();
        assert_eq!(config.server.max_connections, 1);
    }

    #[test]
    fn test_max_connections_from_toml_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fileshare.toml");
        std::fs::write(&path, "[server]\nmax_connections = 0\n").unwrap();
        let path = path.to_str().unwrap();

        assert!(matches!(
            parse(&["-c", path, "serve"]),
            Err(ConfigError::InvalidMaxConnections(0))
        ));
        // Client commands do not use the server's connection cap
        assert!(parse(&["-c", path, "msg", "hi"]).is_ok());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            parse(&["-c", "/nonexistent/fileshare.toml", "serve"]),
            Err(ConfigError::FileRead(..))
        ));
    }
}
