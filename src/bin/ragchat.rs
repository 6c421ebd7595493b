use anyhow::Result;
use clap::Parser;
use ragchat::config::Cli;
use ragchat::repl::{self, ExitReason, ReplOptions};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var_os("RAGCHAT_NO_DOTENV").is_none() {
        dotenv::dotenv().ok();
    }
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.settings()?;
    info!(
        llm_model = settings.llm_model(),
        embedding_model = settings.embedding_model(),
        top_k = settings.top_k.get(),
        "configuration loaded"
    );
    let mut session = settings.connect().await?;

    let options = ReplOptions {
        domain: settings.prompts.domain().to_string(),
        show_context: settings.show_context,
    };
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let reason = repl::run(&mut session, stdin, &mut stdout, &options, interrupted()).await?;
    info!(?reason, turns = session.history().len(), "session ended");
    if reason == ExitReason::Interrupted {
        // The blocking stdin read may still be pending and would keep the runtime alive.
        std::process::exit(0);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "warn,ragchat=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
