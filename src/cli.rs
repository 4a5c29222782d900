//! Command-line surface: flags plus the environment-variable overrides of §6.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::resources;

/// Airflow MCP Server: exposes an Airflow REST API as a catalogue of MCP tools.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Expose only GET operations (read-only).
    #[arg(long, conflicts_with = "unsafe_mode")]
    pub safe: bool,

    /// Expose every HTTP method the spec declares. Default when neither flag is given.
    #[arg(long = "unsafe")]
    pub unsafe_mode: bool,

    /// Airflow base URL, e.g. https://airflow.example.com/api/v2
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bearer token for the upstream Airflow API.
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Serve over streamable HTTP instead of stdio.
    #[arg(long, conflicts_with = "sse")]
    pub http: bool,

    /// Serve over SSE instead of stdio.
    #[arg(long, conflicts_with = "http")]
    pub sse: bool,

    /// Host to bind when --http or --sse is given.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind when --http or --sse is given.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Disable hierarchical category navigation; advertise every tool flat.
    #[arg(long = "static")]
    pub static_mode: bool,

    /// Directory to scan for knowledge-base markdown resources.
    #[arg(long)]
    pub resources_dir: Option<PathBuf>,

    /// Increase log verbosity (repeatable: -v info, -vv debug).
    #[arg(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Write logs additionally to this file (rolling daily).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// CLI + environment resolved into the values `run()` actually needs.
/// Environment wins over the matching flag wherever both are given.
pub struct ResolvedConfig {
    pub base_url: String,
    pub auth_token: String,
    pub allow_mutations: bool,
    pub hierarchical: bool,
    pub resources_dir: PathBuf,
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub verbosity: u8,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
    Sse,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--base-url / AIRFLOW_BASE_URL is required")]
    MissingBaseUrl,
    #[error("--auth-token / AUTH_TOKEN is required")]
    MissingAuthToken,
}

impl Cli {
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        let base_url = std::env::var("AIRFLOW_BASE_URL")
            .ok()
            .or(self.base_url)
            .ok_or(ConfigError::MissingBaseUrl)?;

        let auth_token = std::env::var("AUTH_TOKEN")
            .ok()
            .or(self.auth_token)
            .ok_or(ConfigError::MissingAuthToken)?;

        let resources_dir = std::env::var("KNOWLEDGE_RESOURCES_DIR")
            .ok()
            .map(PathBuf::from)
            .or(self.resources_dir)
            .unwrap_or_else(resources::default_directory);

        let transport = if self.http {
            Transport::Http
        } else if self.sse {
            Transport::Sse
        } else {
            Transport::Stdio
        };

        Ok(ResolvedConfig {
            base_url,
            auth_token,
            allow_mutations: !self.safe,
            hierarchical: !self.static_mode,
            resources_dir,
            transport,
            host: self.host,
            port: self.port,
            verbosity: self.verbose,
            log_file: self.log_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_flag_disables_mutations() {
        let cli = Cli::parse_from([
            "airflow-mcp-server",
            "--safe",
            "--base-url",
            "http://x",
            "--auth-token",
            "t",
        ]);
        let resolved = cli.resolve().unwrap();
        assert!(!resolved.allow_mutations);
    }

    #[test]
    fn default_is_unsafe_and_hierarchical() {
        let cli = Cli::parse_from([
            "airflow-mcp-server",
            "--base-url",
            "http://x",
            "--auth-token",
            "t",
        ]);
        let resolved = cli.resolve().unwrap();
        assert!(resolved.allow_mutations);
        assert!(resolved.hierarchical);
        assert_eq!(resolved.transport, Transport::Stdio);
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let cli = Cli::parse_from(["airflow-mcp-server", "--auth-token", "t"]);
        assert!(matches!(cli.resolve(), Err(ConfigError::MissingBaseUrl)));
    }
}
