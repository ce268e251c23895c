use anyhow::Result;
use clap::Parser;
use gmail_autoresponder::auth::{InstalledAppAuthenticator, MODIFY_SCOPE};
use gmail_autoresponder::cli::{self, Cli, Commands, RunOptions};
use gmail_autoresponder::config::Config;
use gmail_autoresponder::error::GmailError;
use gmail_autoresponder::label_manager::LabelManager;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-autoresponder --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs
    // On Windows, use ring (no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    init_tracing(&cli);

    tracing::info!("Gmail auto-responder starting...");

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let authenticator = InstalledAppAuthenticator::new(&cli.credentials, &cli.token_cache);
            let hub = authenticator.hub().await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Must specify scope to avoid triggering additional OAuth flow
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope(MODIFY_SCOPE)
                .doit()
                .await
                .map_err(GmailError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );

            Ok(())
        }

        Commands::Run {
            dry_run,
            once,
            max_cycles,
        } => {
            if *dry_run {
                println!("Running in DRY RUN mode - no replies will be sent");
            }

            let options = RunOptions {
                dry_run: *dry_run,
                once: *once,
                max_cycles: *max_cycles,
            };
            cli::run_responder(&cli, options).await?;

            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !*force {
                return Err(GmailError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - responder.label_name: Label marking answered threads");
            println!("  - responder.reply_body: Text of the automatic reply");
            println!("  - schedule.min_delay_secs / max_delay_secs: Polling interval");

            Ok(())
        }

        Commands::EnsureLabel => {
            let config = Config::load(&cli.config).await?;
            let authenticator = InstalledAppAuthenticator::new(&cli.credentials, &cli.token_cache)
                .with_call_timeout(config.execution.call_timeout());
            let client = authenticator.client().await?;

            let label_id = LabelManager::new(&client, config.responder.label_name.as_str())
                .ensure_label()
                .await?;

            println!("Label '{}' has ID: {}", config.responder.label_name, label_id);
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoresponder=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoresponder=info,warn,error"))
    };

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}
