use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_application::ChatOrchestrator;
use parley_core::{Message, MessageId, MessageRole};
use parley_interaction::{ClientConfig, Credentials, HttpTransport, Session, SessionManager};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI - chat with the configured backend", long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ~/.config/parley/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend base URL override
    #[arg(long)]
    base_url: Option<String>,
    /// Login email (falls back to the [dev_auto_login] config section)
    #[arg(long)]
    email: Option<String>,
    /// Login password
    #[arg(long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::load_or_default(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let credentials = match (cli.email, cli.password) {
        (Some(email), Some(password)) => Credentials { email, password },
        _ => match config.dev_auto_login.clone() {
            Some(credentials) => {
                tracing::warn!("using dev_auto_login credentials from config");
                credentials
            }
            None => bail!(
                "no credentials: pass --email/--password or set [dev_auto_login] in the config"
            ),
        },
    };

    let transport = Arc::new(HttpTransport::new(&config.base_url, config.timeout())?);
    let session = Arc::new(SessionManager::new(Session::new(), transport.clone()));
    session.login(credentials).await?;
    println!("logged in to {}", config.base_url);

    let orchestrator = ChatOrchestrator::new(session, transport);
    repl(&orchestrator).await
}

async fn repl(orchestrator: &ChatOrchestrator) -> Result<()> {
    println!("type a prompt, :regen to retry the last turn, :quit to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":regen" => regenerate_last_turn(orchestrator).await,
            prompt => match orchestrator.submit_prompt(prompt).await {
                Ok(Some(id)) => print_reply(&orchestrator.snapshot().await, &id),
                Ok(None) => {}
                Err(err) => println!("error: {err}"),
            },
        }
    }

    Ok(())
}

async fn regenerate_last_turn(orchestrator: &ChatOrchestrator) {
    let last_user = orchestrator
        .snapshot()
        .await
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::User)
        .map(|message| message.id.clone());

    match last_user {
        Some(id) => match orchestrator.regenerate_prompt(&id).await {
            Ok(Some(id)) => print_reply(&orchestrator.snapshot().await, &id),
            Ok(None) => {}
            Err(err) => println!("error: {err}"),
        },
        None => println!("nothing to regenerate yet"),
    }
}

fn print_reply(snapshot: &[Message], id: &MessageId) {
    if let Some(message) = snapshot.iter().find(|message| &message.id == id) {
        println!("assistant> {}", message.content);
    }
}
