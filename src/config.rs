use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use reqwest::Url;
use std::path::PathBuf;

use crate::auth::UserCredentials;

/// MarketStud marketplace client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL
    #[arg(short = 'u', long, env = "MARKET_BASE_URL", default_value = "http://127.0.0.1:8083/")]
    pub base_url: String,

    /// Login for (re-)authentication
    #[arg(short = 'l', long, env = "MARKET_LOGIN")]
    pub login: Option<String>,

    /// Password for (re-)authentication
    #[arg(short = 'p', long, env = "MARKET_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to the SQLite credentials database
    #[arg(short = 'd', long, env = "MARKET_CREDENTIALS_DB")]
    pub db_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sign in and store the credentials
    Login,
    /// Forget the stored token and credentials
    Logout,
    /// Show the stored session
    Whoami,
    /// GET a JSON endpoint and print the response
    Get {
        /// Path relative to the base URL
        path: String,
        /// Send without a bearer token
        #[arg(long)]
        public: bool,
    },
    /// Download raw bytes from a GET endpoint
    Download {
        path: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Upload a JPEG photo for an item
    Upload {
        path: String,
        #[arg(long)]
        item_id: i64,
        /// JPEG file to upload
        file: PathBuf,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub base_url: Url,

    // Authentication
    pub credentials: Option<UserCredentials>,
    pub credentials_db: PathBuf,
    pub refresh_timeout: u64,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    fn from_args(args: CliArgs) -> Result<Self> {
        let credentials = match (args.login, args.password) {
            (Some(login), Some(password)) => Some(UserCredentials { login, password }),
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("MARKET_LOGIN and MARKET_PASSWORD must be given together")
            }
            (None, None) => None,
        };

        let credentials_db = match args.db_file {
            Some(path) => expand_tilde(&path),
            None => default_credentials_db()?,
        };

        Ok(Config {
            base_url: parse_base_url(&args.base_url)?,

            credentials,
            credentials_db,

            refresh_timeout: env_or("REFRESH_TIMEOUT", 30),

            http_max_connections: env_or("HTTP_MAX_CONNECTIONS", 20),
            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", 30),
            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.base_url.scheme(), "http" | "https") {
            anyhow::bail!("MARKET_BASE_URL must be http(s): {}", self.base_url);
        }
        if self.http_request_timeout == 0 || self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }
        if self.refresh_timeout == 0 {
            anyhow::bail!("REFRESH_TIMEOUT must be greater than zero");
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse the base URL, making sure relative joins keep its last segment
fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).with_context(|| format!("Invalid MARKET_BASE_URL: {}", raw))
}

fn default_credentials_db() -> Result<PathBuf> {
    let base = dirs::data_dir().context(
        "Cannot determine data directory (use -d or set MARKET_CREDENTIALS_DB env var)",
    )?;
    Ok(base.join("market-client").join("credentials.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Ask for login and password on the terminal
pub fn prompt_credentials() -> Result<UserCredentials> {
    println!();
    println!("No stored credentials. Sign in to continue.");
    println!();

    let login: String = Input::new()
        .with_prompt("Login")
        .interact_text()
        .context("Failed to read login")?;

    let password = Password::new()
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    if login.is_empty() || password.is_empty() {
        anyhow::bail!("Login and password cannot be empty");
    }

    Ok(UserCredentials { login, password })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["market-client", "-d", "/tmp/market-test.sqlite3"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = parse_base_url("http://example.test/market").unwrap();
        assert_eq!(url.as_str(), "http://example.test/market/");
        assert_eq!(
            url.join("api/v1/status/all").unwrap().as_str(),
            "http://example.test/market/api/v1/status/all"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_login_and_password_must_pair() {
        let result = Config::from_args(args(&["--base-url", "http://x/", "-l", "alice", "whoami"]));
        assert!(result.is_err());

        let config = Config::from_args(args(&[
            "--base-url",
            "http://x/",
            "-l",
            "alice",
            "-p",
            "pw",
            "whoami",
        ]))
        .unwrap();
        assert_eq!(config.credentials, Some(UserCredentials::new("alice", "pw")));
    }

    #[test]
    fn test_subcommand_parsing() {
        let parsed = args(&["download", "api/v1/objects/download?itemId=1", "-o", "out.jpg"]);
        assert_eq!(
            parsed.command,
            Command::Download {
                path: "api/v1/objects/download?itemId=1".to_string(),
                output: PathBuf::from("out.jpg"),
            }
        );

        let parsed = args(&["upload", "api/v1/objects", "--item-id", "5", "photo.jpg"]);
        assert!(matches!(parsed.command, Command::Upload { item_id: 5, .. }));
    }

    #[test]
    fn test_validate_rejects_non_http() {
        let mut config = Config::from_args(args(&["--base-url", "http://x/", "whoami"])).unwrap();
        assert!(config.validate().is_ok());

        config.base_url = Url::parse("ftp://x/").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::from_args(args(&["--base-url", "http://x/", "whoami"])).unwrap();
        config.refresh_timeout = 0;
        assert!(config.validate().is_err());
    }
}
