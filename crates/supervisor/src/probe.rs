//! Connect-and-release reachability probe.

use std::time::Duration;

use tokio::net::TcpStream;

/// Whether something accepts TCP connections on `host:port` within
/// `timeout`. The connection is closed immediately.
pub async fn is_port_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            tracing::trace!(host, port, error = %e, "Port not reachable");
            false
        }
        Err(_) => {
            tracing::trace!(host, port, "Port probe timed out");
            false
        }
    }
}
