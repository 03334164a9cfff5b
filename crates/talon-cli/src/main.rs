//! Talon CLI - certificate lifecycle management over ACME DNS-01
//!
//! Thin wiring around the library crates: storage backends, the Hetzner
//! DNS client, and the certificate lifecycle manager.

mod commands;

use clap::{Parser, Subcommand};
use commands::{IssueCommand, ListCommand, RenewCommand};
use talon_tls::TlsError;
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "TALON_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "TALON_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain a new certificate for the configured domains
    Issue(IssueCommand),
    /// Renew the stored certificate when it is close to expiry
    Renew(RenewCommand),
    /// List stored certificates
    List(ListCommand),
}

fn main() {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone();

    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .expect("Invalid RUST_LOG environment variable")
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "talon_cli={level},\
             talon_tls={level},\
             talon_dns={level},\
             talon_storage={level},\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");

    let result = match cli.command {
        Commands::Issue(cmd) => cmd.execute(),
        Commands::Renew(cmd) => cmd.execute(),
        Commands::List(cmd) => cmd.execute(),
    };

    if let Err(err) = result {
        eprintln!("Error: {:#}", err);
        // Misconfiguration is distinguishable from runtime failures.
        let code = match err.downcast_ref::<TlsError>() {
            Some(TlsError::Configuration(_)) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}
