//! Reachability check for the application under test
//!
//! Launching a browser against a dead dev server produces a slow, noisy
//! navigation failure. When enabled, the runner polls the base URL over
//! plain HTTP first.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Poll `url` until it answers with a non-5xx status or `timeout` elapses
pub async fn wait_until_reachable(url: &str, timeout: Duration, poll: Duration) -> HarnessResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0u32;
    let mut last_error;

    loop {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                debug!(url, attempts, status = resp.status().as_u16(), "Application reachable");
                return Ok(());
            }
            Ok(resp) => {
                warn!("Reachability check returned {}", resp.status());
                last_error = format!("HTTP {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to come up...", url);
                }
                // Connection refused is expected while a dev server starts
                if !e.is_connect() {
                    warn!("Reachability check error: {}", e);
                }
                last_error = e.to_string();
            }
        }

        if start.elapsed() + poll > timeout {
            break;
        }
        sleep(poll).await;
    }

    Err(HarnessError::Navigation {
        url: url.to_string(),
        reason: format!("unreachable after {} attempt(s): {}", attempts, last_error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_reports_attempts() {
        // Port 9 (discard) on loopback is closed in test environments
        let err = wait_until_reachable(
            "http://127.0.0.1:9/",
            Duration::from_millis(300),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        match err {
            HarnessError::Navigation { url, reason } => {
                assert_eq!(url, "http://127.0.0.1:9/");
                assert!(reason.starts_with("unreachable after"));
                // The last connection error is carried through
                let (_, last) = reason.split_once("attempt(s): ").unwrap();
                assert!(!last.is_empty());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reachable_local_listener() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        wait_until_reachable(
            &format!("http://{}/", addr),
            Duration::from_secs(5),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    }
}
