use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("FILEGATE_HTTP_PORT").unwrap_or_else(|_| "7878".to_string());
    let groups = std::env::var("FILEGATE_GROUPS").unwrap_or_else(|_| "groups.json".to_string());
    let data_root = std::env::var("FILEGATE_DATA_ROOT").unwrap_or_else(|_| "data".to_string());
    let locale = std::env::var("FILEGATE_LOCALE").unwrap_or_else(|_| "en".to_string());
    info!(
        target: "filegate",
        "filegate starting: RUST_LOG='{}', http_port={}, groups='{}', data_root='{}', locale='{}'",
        rust_log, http_port, groups, data_root, locale
    );

    filegate::server::run().await
}
