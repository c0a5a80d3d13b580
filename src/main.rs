use anyhow::Context;
use chrono::Utc;

use payment_watch::config::Config;
use payment_watch::{logging, pipeline};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let log_dir = logging::log_dir_from_env();
    let _guard = logging::init(log_dir.as_deref(), "payment-watch.log");

    let config_path = Config::default_path();
    eprintln!("💸 Payment Watch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", config_path.display());
    if let Some(dir) = &log_dir {
        eprintln!("   Logs: {}", dir.display());
    }

    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    eprintln!(
        "   Mailbox: {}@{}:{}/{}",
        config.email.username,
        config.email.imap_server,
        config.email.imap_port,
        config.email.mailbox
    );
    eprintln!("   Banks: {}\n", config.parsing_rules.banks().len());

    let span = tracing::info_span!("poll", started_at = %Utc::now().to_rfc3339());

    match pipeline::run_once(&config, span).await {
        Ok(summary) => {
            tracing::info!(
                selected = summary.selected,
                matched = summary.matched,
                extracted = summary.extracted,
                delivered = summary.delivered,
                marked = summary.marked,
                skipped = summary.skipped_fetch,
                failed = summary.failed_delivery,
                "Run complete"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run aborted: {e}");
            Err(e).context("polling mailbox")
        }
    }
}
