/*!
 * `kbus serve`
 */

use crate::config::BusConfig;
use crate::error::Result;
use kbus_server::start_bus_server;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the broker until `shutdown` is cancelled
pub async fn serve(config: &BusConfig, shutdown: CancellationToken) -> Result<()> {
    let server_config = config.server_config();
    info!(
        address = %server_config.address,
        queue_capacity = server_config.queue_capacity,
        long_poll_timeout = ?server_config.long_poll_timeout,
        "Starting kbus broker v{}",
        env!("CARGO_PKG_VERSION")
    );

    start_bus_server(server_config, shutdown).await?;
    info!("kbus broker stopped");
    Ok(())
}
