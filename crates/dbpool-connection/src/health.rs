//! Connection health checks

use std::time::{Duration, Instant};

use dbpool_core::{Connection, DbPoolError, Result};

/// Ping a database connection to check if it's alive.
///
/// Uses the driver's ping and returns the round-trip time. A ping that does
/// not answer within `timeout` fails with `Timeout`.
pub async fn ping_database(conn: &dyn Connection, timeout: Duration) -> Result<Duration> {
    if conn.is_closed() {
        return Err(DbPoolError::Connect("connection is closed".into()));
    }

    let start = Instant::now();
    match tokio::time::timeout(timeout, conn.ping()).await {
        Ok(Ok(())) => {
            let latency = start.elapsed();
            tracing::trace!(driver = conn.driver_name(), ?latency, "ping succeeded");
            Ok(latency)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(DbPoolError::Timeout(format!(
            "ping did not answer within {:?}",
            timeout
        ))),
    }
}
