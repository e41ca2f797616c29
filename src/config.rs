use clap::Parser;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub trust_certificate: bool,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// How long a pooled connection may stay open before it is recycled.
    #[serde(default = "default_recycle")]
    pub recycle_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    /// Fold the system prompt into the user message for engines without
    /// system-role support.
    #[serde(default)]
    pub system_as_user: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Rows of a query result included in a tool observation before truncation.
    #[serde(default = "default_observation_rows")]
    pub max_observation_rows: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_port() -> u16 {
    5432
}

fn default_timeout() -> u64 {
    60
}

fn default_pool_size() -> u32 {
    5
}

fn default_recycle() -> u64 {
    3600
}

fn default_max_iterations() -> usize {
    10
}

fn default_observation_rows() -> usize {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_observation_rows: default_observation_rows(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database server host
    #[arg(long)]
    pub server: Option<String>,

    /// Database name
    #[arg(long)]
    pub database: Option<String>,

    /// Database username
    #[arg(short, long)]
    pub username: Option<String>,

    /// LLM API key (falls back to the config file, then NL_SQL_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();
        let mut file_found = false;

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
            file_found = true;
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-sql-agent/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    file_found = true;
                    break;
                }
            }
        }

        // No config file anywhere: start from defaults and let the CLI and
        // environment overrides below fill in the rest.
        let mut config: AppConfig = if file_found {
            config_builder.build()?.try_deserialize()?
        } else {
            AppConfig::default()
        };

        // Override with command line args if provided
        if let Some(server) = &args.server {
            config.database.server = server.clone();
        }
        if let Some(database) = &args.database {
            config.database.database = database.clone();
        }
        if let Some(username) = &args.username {
            config.database.username = username.clone();
        }
        if let Some(api_key) = &args.api_key {
            config.llm.api_key = Some(api_key.clone());
        }
        if config.llm.api_key.is_none() {
            if let Ok(key) = std::env::var("NL_SQL_API_KEY") {
                config.llm.api_key = Some(key);
            }
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                server: "localhost".to_string(),
                port: default_port(),
                database: "postgres".to_string(),
                username: "postgres".to_string(),
                password: String::new(),
                trust_certificate: false,
                timeout_seconds: default_timeout(),
                pool_size: default_pool_size(),
                recycle_seconds: default_recycle(),
            },
            llm: LlmConfig {
                backend: "remote".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                api_url: None,
                temperature: 0.0,
                system_as_user: false,
            },
            agent: AgentConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults_with_cli_overrides() {
        let args = CliArgs {
            config: None,
            server: Some("db.example.com".to_string()),
            database: Some("adventureworks".to_string()),
            username: None,
            api_key: None,
        };
        let config = AppConfig::new(&args).unwrap();
        assert_eq!(config.database.server, "db.example.com");
        assert_eq!(config.database.database, "adventureworks");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.username, "postgres");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.max_observation_rows, 25);
    }

    #[test]
    fn explicit_config_path_that_does_not_exist_is_an_error() {
        let args = CliArgs {
            config: Some(PathBuf::from("/nonexistent/nl-sql-agent.toml")),
            server: None,
            database: None,
            username: None,
            api_key: None,
        };
        assert!(AppConfig::new(&args).is_err());
    }
}
