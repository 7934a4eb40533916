use cornerwatch::adapters::{HtmlPageExtractor, PageExtractor};
use cornerwatch::config::AppConfig;
use cornerwatch::coordination::install_signal_handlers;
use cornerwatch::monitor::CornerMonitor;
use cornerwatch::Result;
use std::sync::Arc;
use tracing::{error, info};

mod main_runtime;

use main_runtime::init_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    if let Err(problems) = config.validate() {
        for p in &problems {
            error!("invalid configuration: {p}");
        }
        return Err(cornerwatch::WatchError::Internal(format!(
            "{} configuration problem(s)",
            problems.len()
        )));
    }

    // Without a page capability there is nothing to monitor.
    let extractor: Arc<dyn PageExtractor> = match HtmlPageExtractor::new(config.source.clone()) {
        Ok(extractor) => Arc::new(extractor),
        Err(e) => {
            error!("cannot start page capability: {e}");
            return Err(e);
        }
    };
    info!(
        "live listing {} (extractor {})",
        config.source.live_url(),
        extractor.version()
    );

    let monitor = CornerMonitor::new(config, extractor);
    install_signal_handlers(monitor.shutdown_handle());
    monitor.run().await
}
