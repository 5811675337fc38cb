//! carryover - legacy data migration runner.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carryover_cli::Args;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carryover=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Some(notice) = args.deprecation() {
        tracing::warn!("{notice}");
    }

    let config = args.into_config();
    tracing::debug!(
        manifest = %config.manifest_path.display(),
        legacy = %config.legacy_path.display(),
        data_path = %config.data_path.display(),
        commit = config.commit,
        "configuration loaded"
    );

    if let Err(e) = carryover_cli::run(&config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
