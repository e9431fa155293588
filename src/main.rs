mod settings;

use std::path::PathBuf;

use anyhow::Context;
use bh_auth::{RequestSpec, TokenAcquirer};
use bh_session::{CachingSessionClient, ManagedSessionClient, SessionEvent};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

/// Keeps a Bullhorn REST session alive
#[derive(Debug, Parser)]
#[command(name = "bh-keeper", version, about)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, short, env = "BH_KEEPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the page to open once to accept the API terms
    AuthorizeUrl,
    /// Log in once and print the REST URL
    Login,
    /// Log in, then call `ping` and print the session expiry
    Ping,
    /// Issue a GET against the REST API and print the JSON response
    Get {
        /// Path relative to the REST URL, e.g. `entity/Candidate/1`
        path: String,
        /// Extra query parameters as `key=value`
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
    /// Keep the session fresh until interrupted
    Run,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let settings = Settings::load(&path)
        .await?
        .with_env_overrides(|name| std::env::var(name).ok());
    let credentials = settings.credentials()?;
    let acquirer =
        TokenAcquirer::new(settings.auth_config()).context("Failed to build HTTP client")?;

    match cli.command {
        Command::AuthorizeUrl => {
            println!("{}", acquirer.authorize_url(&credentials)?);
        }
        Command::Login => {
            let client = CachingSessionClient::with_options(
                acquirer.clone(),
                credentials,
                settings.caching_options()?,
            );
            let rest = client.get_client().await?;
            println!("{}", rest.session().base_url());
            if let Some(expires_at) = acquirer.probe().probe_expiry_soft(rest.session()).await {
                println!("expires {expires_at}");
            }
        }
        Command::Ping => {
            let client =
                ManagedSessionClient::with_options(acquirer, credentials, settings.managed_options()?);
            client.login().await?;
            let expires_at = client.ping().await?;
            println!("{expires_at}");
        }
        Command::Get { path, params } => {
            let client = CachingSessionClient::with_options(
                acquirer,
                credentials,
                settings.caching_options()?,
            );
            let spec = params
                .into_iter()
                .fold(RequestSpec::get(path), |spec, (key, value)| spec.query(key, value));
            let body = client.get_client().await?.send(spec).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Run => run(ManagedSessionClient::with_options(
            acquirer,
            credentials,
            settings.managed_options()?,
        ))
        .await?,
    }

    Ok(())
}

async fn run(client: ManagedSessionClient) -> anyhow::Result<()> {
    let mut events = client.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Login(session)) => {
                    info!(rest_url = %session.base_url(), expires_at = ?session.expires_at(), "Session refreshed");
                }
                Ok(SessionEvent::LoginFailed(e)) => error!("Session refresh failed: {}", e),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Missed session events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    client.start_refresh_loop().await?;
    info!("Keeping session alive, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    client.stop_refresh_loop();
    drop(client);
    reporter.await.ok();
    info!("Stopped");
    Ok(())
}
