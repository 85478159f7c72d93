//! TCP transports.
//!
//! `line` serves the service resource as newline-delimited JSON; `binary`
//! serves weather queries as length-prefixed bitcode frames. Both share the
//! accept loop below: one task per connection, stopped by the shutdown token.

pub mod binary;
pub mod line;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections until `shutdown` fires, spawning `handler` for each.
pub async fn accept_loop<F, Fut>(
    listener: TcpListener,
    name: &'static str,
    shutdown: CancellationToken,
    handler: F,
) -> std::io::Result<()>
where
    F: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    info!("{} listener on {}", name, listener.local_addr()?);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("{} listener shutting down", name);
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("{} connection from {}", name, peer);
                    tokio::spawn(handler(stream, peer));
                }
                Err(e) => {
                    warn!("{} accept failed: {}", name, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}
