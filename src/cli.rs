use crate::analysis::{AnalysisOutcome, Analyzer};
use crate::config::GuardConfig;
use crate::trust_registry::{
    parse_trusted_list, source_from_config, spawn_refresh_task, TrustRegistry,
};
use crate::trigger::Watcher;
use crate::web::build_router;
use crate::x_api::XApiClient;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Top-level CLI interface for RugGuard
#[derive(Parser)]
#[command(
    name = "rugguard",
    version,
    about = "Trust verification and risk scoring for social accounts"
)]
pub struct Cli {
    /// Configuration file (defaults to ./rugguard.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze one account and print its report
    Analyze {
        handle: String,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List trusted accounts that follow both handles
    Mutual { first: String, second: String },

    /// Watch mentions for the trigger phrase and reply with reports
    Watch {
        /// Only answer mentions newer than this post id
        #[arg(long)]
        since: Option<String>,
    },

    /// Serve the HTTP API (analysis, registry, health)
    Serve {
        /// Host/IP to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
    },

    /// Inspect the trusted-accounts registry
    Registry {
        #[command(subcommand)]
        action: RegistryCommand,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// Load the configured list and print its summary
    Show,
    /// Parse a local list file without installing it
    Check { file: PathBuf },
}

pub async fn run(cli: Cli, config: GuardConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Analyze { handle, json } => {
            let analyzer = live_analyzer(&config).await?.0;
            let outcome = analyzer.analyze(&handle).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.report());
                if let AnalysisOutcome::Assessed { assessment, .. } = &outcome {
                    info!(score = assessment.score, level = %assessment.level, "done");
                }
            }
        }
        Commands::Mutual { first, second } => {
            let analyzer = live_analyzer(&config).await?.0;
            let mutual = analyzer.mutual_connections(&first, &second).await?;
            if mutual.connections.is_empty() {
                println!(
                    "No mutual trusted connections for @{} and @{}",
                    mutual.first, mutual.second
                );
            }
            for member in &mutual.connections {
                println!("@{member}");
            }
        }
        Commands::Watch { since } => {
            let (analyzer, client) = live_analyzer(&config).await?;
            let _refresh = spawn_refresh_task(
                Arc::clone(analyzer.registry()),
                Duration::from_secs(config.registry.refresh_interval_secs),
            );
            let mut watcher = Watcher::new(analyzer, client, config.watcher.clone());
            if let Some(id) = since {
                watcher = watcher.resume_after(id);
            }
            watcher.run().await;
        }
        Commands::Serve { host, port } => {
            let (analyzer, _) = live_analyzer(&config).await?;
            let _refresh = spawn_refresh_task(
                Arc::clone(analyzer.registry()),
                Duration::from_secs(config.registry.refresh_interval_secs),
            );
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            info!(%addr, "http api listening");
            axum::serve(listener, build_router(analyzer)).await?;
        }
        Commands::Registry { action } => match action {
            RegistryCommand::Show => {
                let registry = TrustRegistry::init(source_from_config(&config.registry)?).await;
                let set = registry.get();
                println!("{}", serde_json::to_string_pretty(&set.summary())?);
                for member in set.members() {
                    println!("@{member}");
                }
                if let Some(error) = registry.last_error() {
                    anyhow::bail!("trusted list unavailable: {error}");
                }
            }
            RegistryCommand::Check { file } => {
                let body = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                let set = parse_trusted_list(&body)?;
                println!("{} valid trusted accounts in {}", set.len(), file.display());
            }
        },
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&redacted(&config))?);
        }
    }
    Ok(())
}

/// Registry, X API client and analyzer for live commands.
async fn live_analyzer(config: &GuardConfig) -> anyhow::Result<(Analyzer, Arc<XApiClient>)> {
    let client = Arc::new(XApiClient::new(&config.platform)?);
    let registry = Arc::new(TrustRegistry::init(source_from_config(&config.registry)?).await);
    let analyzer = Analyzer::new(config, registry, client.clone(), client.clone())?;
    Ok((analyzer, client))
}

fn redacted(config: &GuardConfig) -> GuardConfig {
    let mut config = config.clone();
    let hide = |token: &mut Option<String>| {
        if token.is_some() {
            *token = Some("<redacted>".to_string());
        }
    };
    hide(&mut config.platform.bearer_token);
    hide(&mut config.platform.user_access_token);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted() {
        let mut config = GuardConfig::default();
        config.platform.bearer_token = Some("AAAA-secret".to_string());
        let rendered = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!rendered.contains("AAAA-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::parse_from([
            "rugguard", "--config", "x.toml", "analyze", "@someone", "--json",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Analyze { json: true, .. }));

        let cli = Cli::parse_from(["rugguard", "mutual", "alice", "@bob"]);
        assert!(matches!(cli.command, Commands::Mutual { ref second, .. } if second == "@bob"));

        let cli = Cli::parse_from(["rugguard", "watch", "--since", "1790000000000000000"]);
        assert!(matches!(cli.command, Commands::Watch { since: Some(_) }));

        let cli = Cli::parse_from(["rugguard", "registry", "check", "list.txt"]);
        assert!(matches!(
            cli.command,
            Commands::Registry {
                action: RegistryCommand::Check { .. }
            }
        ));
    }
}
