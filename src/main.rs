//! Tideway Reconcile CLI - run one reconciliation pass and exit.
//!
//! Usage:
//!   tideway-reconcile
//!   tideway-reconcile --dry-run --json
//!   tideway-reconcile --concurrency 4 --timeout-seconds 120 --grace-entitlement restricted
//!
//! Exits 0 whenever the run completes, even if some subscriptions failed,
//! and 1 only when it could not start.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use secrecy::ExposeSecret;

use tideway_reconcile::billing::{LiveStripeClient, LiveStripeClientConfig, SeaOrmBillingStore};
use tideway_reconcile::{
    Config, ConfigBuilder, GraceEntitlement, ReconcileSummary, Reconciler, ReconcilerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "tideway-reconcile")]
#[command(version)]
#[command(about = "Reconcile local billing state with Stripe", long_about = None)]
struct Cli {
    /// Detect and count drift without writing anything
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Subscriptions handled at once within a pass
    #[arg(long)]
    concurrency: Option<usize>,

    /// Budget for the whole run in seconds
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Entitlement during an unexpired grace period (full or restricted)
    #[arg(long)]
    grace_entitlement: Option<GraceEntitlement>,

    /// Print the summary as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("{e:#}"));
            return ExitCode::FAILURE;
        }
    };
    tideway_reconcile::init_tracing_with_config(&config);

    match run(&config).await {
        Ok(summary) => {
            print_summary(&summary, cli.json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Reconciliation aborted");
            print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Environment first, then command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut builder = ConfigBuilder::new().from_env();
    if cli.dry_run {
        builder = builder.with_dry_run(true);
    }
    if let Some(concurrency) = cli.concurrency {
        builder = builder.with_concurrency(concurrency);
    }
    if let Some(timeout) = cli.timeout_seconds {
        builder = builder.with_timeout_seconds(timeout);
    }
    if let Some(policy) = cli.grace_entitlement {
        builder = builder.with_grace_entitlement(policy);
    }
    builder.build().context("invalid configuration")
}

async fn run(config: &Config) -> Result<ReconcileSummary> {
    let key = config
        .stripe
        .secret_key
        .as_ref()
        .context("STRIPE_SECRET_KEY is not set")?;
    let client = LiveStripeClient::new(
        key.expose_secret().to_string(),
        LiveStripeClientConfig::new().timeout_seconds(config.stripe.timeout_seconds),
    )?;
    let store = SeaOrmBillingStore::connect(&config.database)
        .await
        .context("failed to connect to the billing database")?;

    let reconciler = Reconciler::new(store, client, ReconcilerConfig::from(&config.reconcile));
    let summary = reconciler.run().await?;
    Ok(summary)
}

fn print_summary(summary: &ReconcileSummary, json: bool) {
    if json {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{line}"),
            Err(e) => print_error(&format!("failed to serialize summary: {e}")),
        }
        return;
    }

    if summary.is_clean() {
        println!("{} {}", "✓".green().bold(), summary);
    } else {
        println!("{} {}", "!".yellow().bold(), summary);
    }
}

fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}
