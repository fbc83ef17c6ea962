//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::config::{ConfigOverrides, ConfigSource, RelayConfig};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, HttpPageFetcher};
use crate::pagination::{PaginationConfig, Paginator};
use crate::relay::{self, Accumulator, ChannelMessage, Completion, RouteTable};
use crate::types::LogLevel;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

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
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Serve {
                port,
                announce_completion,
            } => {
                let overrides = ConfigOverrides {
                    port: *port,
                    announce_completion: announce_completion.then_some(true),
                    ..self.overrides()
                };
                let config = self.load_config(overrides)?;
                relay::serve(&config).await
            }
            Commands::Fetch {
                endpoint,
                chunk_size,
            } => {
                let overrides = ConfigOverrides {
                    chunk_size: *chunk_size,
                    ..self.overrides()
                };
                let config = self.load_config(overrides)?;
                self.fetch(&config, endpoint).await
            }
            Commands::Watch {
                url,
                request_type,
                idle_timeout,
            } => {
                self.watch(url, request_type, Duration::from_secs(*idle_timeout))
                    .await
            }
            Commands::Config => {
                let config = self.load_config(self.overrides())?;
                self.show_config(&config)
            }
        }
    }

    /// Log level: `-v`, then `--log-level`, then the config file, then INFO
    pub fn log_level(&self) -> LogLevel {
        if self.cli.verbose {
            return LogLevel::Debug;
        }
        self.cli.log_level.unwrap_or_else(|| {
            RelayConfig::read(&self.config_source())
                .map(|config| config.log_level)
                .unwrap_or_default()
        })
    }

    /// Where the configuration comes from
    fn config_source(&self) -> ConfigSource {
        match (&self.cli.config, &self.cli.legacy_config_dir) {
            (Some(path), _) => ConfigSource::File(path.clone()),
            (None, Some(dir)) => ConfigSource::LegacyDir(dir.clone()),
            (None, None) => ConfigSource::Defaults,
        }
    }

    /// Overrides taken from global flags and the environment
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.cli.api_url.clone(),
            api_key: self.cli.api_key.clone(),
            ..Default::default()
        }
    }

    /// Load and validate configuration
    fn load_config(&self, overrides: ConfigOverrides) -> Result<RelayConfig> {
        let source = self.config_source();
        debug!(?source, "Loading configuration");
        RelayConfig::load(&source, overrides)
    }

    /// Walk every page of `endpoint`, one JSON line per page
    async fn fetch(&self, config: &RelayConfig, endpoint: &str) -> Result<()> {
        let client = HttpClient::with_config(HttpClientConfig::from_settings(&config.http))?;
        let fetcher = HttpPageFetcher::new(client, config.api.clone());
        let paginator = Paginator::new(
            Arc::new(fetcher),
            PaginationConfig::try_from(config.stream)?,
        );

        let mut pages = Box::pin(paginator.pages(endpoint));
        let mut count = 0u32;

        while let Some(page) = pages.next().await {
            let page = page?;
            count += 1;
            let line = json!({
                "page": count,
                "url": page.metadata.url,
                "status": page.metadata.status,
                "body": page.body,
            });
            println!("{line}");
        }

        info!(endpoint, pages = count, "Fetch complete");
        Ok(())
    }

    /// Act as a consumer: send one request to a relay and print what arrives
    async fn watch(&self, url: &str, request_type: &str, idle_timeout: Duration) -> Result<()> {
        let routes = self.watch_routes()?;
        let route = routes
            .get(request_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("No route for request type '{request_type}'")))?;
        let mut accumulator = Accumulator::new(route);

        let (mut socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::protocol(format!("Failed to connect to {url}: {e}")))?;
        info!(url, request = request_type, "Connected to relay");

        socket
            .send(Message::Text(accumulator.request().encode()?))
            .await
            .map_err(|e| Error::protocol(format!("Failed to send request: {e}")))?;

        loop {
            let frame = match tokio::time::timeout(idle_timeout, socket.next()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => return Err(Error::protocol(format!("Socket error: {e}"))),
                Ok(None) => break,
                Err(_) => {
                    debug!("No frame within idle timeout");
                    break;
                }
            };

            match frame {
                Message::Text(text) => match ChannelMessage::decode(&text) {
                    Ok(message) => {
                        if !accumulator.accept(&message) {
                            debug!(kind = %message.kind, "Ignoring frame");
                        }
                    }
                    Err(e) => warn!(error = %e, "Undecodable frame from relay"),
                },
                Message::Close(_) => break,
                _ => {}
            }

            if accumulator.is_complete() {
                break;
            }
        }

        // The relay may already be gone
        let _ = socket.close(None).await;

        for record in accumulator.records() {
            println!("{record}");
        }
        info!(
            frames = accumulator.frames(),
            records = accumulator.records().len(),
            "Watch finished"
        );

        match accumulator.completion() {
            Some(Completion::Failed { message }) => Err(Error::Other(format!(
                "Relay reported a failed stream: {message}"
            ))),
            _ => Ok(()),
        }
    }

    /// Route table for `watch`: from the config source, credentials not needed
    fn watch_routes(&self) -> Result<RouteTable> {
        let config = RelayConfig::read(&self.config_source())?;
        Ok(RouteTable::new(&config.relay.routes))
    }

    /// Print the effective configuration
    fn show_config(&self, config: &RelayConfig) -> Result<()> {
        let yaml = serde_yaml::to_string(&config.redacted())?;
        print!("{yaml}");
        Ok(())
    }
}
