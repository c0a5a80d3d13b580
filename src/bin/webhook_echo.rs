//! Local receiver for the webhook sink. Logs every payload it gets.

use anyhow::Context;
use secrecy::SecretString;

use payment_watch::echo::echo_routes;
use payment_watch::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = logging::log_dir_from_env();
    let _guard = logging::init(log_dir.as_deref(), "webhook.log");

    let port: u16 = std::env::var("WEBHOOK_ECHO_PORT")
        .unwrap_or_else(|_| "5000".to_string())
        .parse()
        .unwrap_or(5000);

    let secret = std::env::var("WEBHOOK_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
        .map(SecretString::from);

    eprintln!("📬 Webhook echo v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://0.0.0.0:{port}/webhook");
    eprintln!(
        "   Secret check: {}\n",
        if secret.is_some() { "on" } else { "off" }
    );

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Webhook echo listening on {addr}");

    axum::serve(listener, echo_routes(secret))
        .await
        .context("serving webhook echo")?;
    Ok(())
}
