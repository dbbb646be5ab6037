//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::HubConfig;
use crate::engine::{ExitStatus, StdoutSink, SyncEngine};
use crate::error::{Error, FailureKind, Result};
use crate::http::HttpClient;
use crate::state::StateManager;
use crate::streams::StreamRegistry;
use crate::types::QueryParams;
use serde_json::{json, Value};
use tracing::info;

/// Endpoint probed by `check`
const CHECK_PATH: &str = "/crm/v3/owners";

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<ExitStatus> {
        match self.cli.command {
            Commands::Check => self.check().await,
            Commands::Streams => self.streams(),
            Commands::Read => self.read().await,
        }
    }

    /// Load and validate the configuration, applying the stream override
    fn load_config(&self) -> Result<HubConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Config file not specified (use -C flag)"))?;
        let mut config = HubConfig::from_file(path)?;
        if !self.cli.streams.is_empty() {
            config.streams.clone_from(&self.cli.streams);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load state
    fn load_state(&self) -> Result<StateManager> {
        // Inline state takes precedence
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    /// Check connection
    async fn check(&self) -> Result<ExitStatus> {
        let config = self.load_config()?;
        let client = HttpClient::with_auth(config.http_config(), config.auth_config());

        let mut query = QueryParams::new();
        query.insert("limit".to_string(), "1".to_string());

        let status = match client.probe(CHECK_PATH, query).await {
            Ok(()) => {
                self.output_message(&json!({
                    "type": "CONNECTION_STATUS",
                    "connectionStatus": {
                        "status": "SUCCEEDED",
                        "message": "Connection successful"
                    }
                }));
                ExitStatus::Success
            }
            Err(e) => {
                self.output_message(&json!({
                    "type": "CONNECTION_STATUS",
                    "connectionStatus": {
                        "status": "FAILED",
                        "message": format!("Connection failed: {e}")
                    }
                }));
                match e.failure_kind() {
                    FailureKind::InvalidCredentials => ExitStatus::InvalidCredentials,
                    _ => ExitStatus::Fatal,
                }
            }
        };
        Ok(status)
    }

    /// List registered streams
    fn streams(&self) -> Result<ExitStatus> {
        let config = self.load_config()?;
        let registry = StreamRegistry::standard(&config);

        let streams: Vec<Value> = registry
            .descriptors()
            .map(|d| {
                json!({
                    "name": d.name,
                    "bookmark_field": d.bookmark_field,
                    "replication_method": d.replication_method,
                    "properties_stream": d.properties_stream(),
                    "custom_object": d.is_custom_object(),
                })
            })
            .collect();

        self.output_message(&json!({
            "type": "STREAMS",
            "streams": streams,
        }));
        Ok(ExitStatus::Success)
    }

    /// Extract the selected streams
    async fn read(&self) -> Result<ExitStatus> {
        let config = self.load_config()?;
        let state = self.load_state()?;
        let mut engine = SyncEngine::new(config, state)?;
        let mut sink = StdoutSink::stdout();

        let report = engine.run(&mut sink).await?;
        let status = report.exit_status();
        info!(status = ?status, streams = report.streams.len(), "Run finished");
        Ok(status)
    }

    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
