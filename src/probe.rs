//! SSH reachability probing.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::WsfusionError;

/// How long a single probe waits for sshd to connect and send its banner.
pub const READY_WINDOW: Duration = Duration::from_secs(5);

/// Pause after an active rejection, so a booting guest is not hammered.
pub const REFUSED_BACKOFF: Duration = Duration::from_secs(2);

/// A single reachability check. Callers own the retry loop.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Prober {
    /// Returns `Ok(true)` and calls `on_ready` once the port is usable.
    /// Transient network conditions are `Ok(false)`.
    async fn probe<F: FnOnce()>(
        &self,
        host: &str,
        port: u16,
        on_ready: F,
    ) -> Result<bool, WsfusionError>;
}

pub struct TcpProber {
    ready_window: Duration,
    refused_backoff: Duration,
}

impl TcpProber {
    pub fn with_timings(ready_window: Duration, refused_backoff: Duration) -> Self {
        Self {
            ready_window,
            refused_backoff,
        }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::with_timings(READY_WINDOW, REFUSED_BACKOFF)
    }
}

impl Prober for TcpProber {
    async fn probe<F: FnOnce()>(
        &self,
        host: &str,
        port: u16,
        on_ready: F,
    ) -> Result<bool, WsfusionError> {
        let attempt = tokio::time::timeout(self.ready_window, async {
            let stream = TcpStream::connect((host, port)).await?;
            stream.readable().await?;
            Ok::<_, std::io::Error>(stream)
        })
        .await;

        match attempt {
            Ok(Ok(_stream)) => {
                tracing::debug!("connected to sshd on {host}");
                on_ready();
                Ok(true)
            }
            Err(_elapsed) => {
                tracing::debug!(host, port, "sshd not ready within {:?}", self.ready_window);
                Ok(false)
            }
            Ok(Err(e)) => match e.kind() {
                ErrorKind::ConnectionRefused
                | ErrorKind::HostUnreachable
                | ErrorKind::NetworkUnreachable => {
                    tracing::debug!(host, port, "probe rejected: {e}");
                    tokio::time::sleep(self.refused_backoff).await;
                    Ok(false)
                }
                ErrorKind::TimedOut | ErrorKind::PermissionDenied => {
                    tracing::debug!(host, port, "probe failed: {e}");
                    Ok(false)
                }
                _ => Err(WsfusionError::Probe {
                    host: host.to_string(),
                    port,
                    source: e,
                }),
            },
        }
    }
}
