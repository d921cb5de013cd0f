mod cli;

use teleport_core::logging;
use tracing::error;

#[tokio::main]
async fn main() {
    let _guard = logging::init_logging_from_level(
        &std::env::var("TELEPORT_LOG").unwrap_or_else(|_| "info".to_string()),
    );

    if let Err(err) = cli::run().await {
        error!("{err}");
        std::process::exit(1);
    }
}
