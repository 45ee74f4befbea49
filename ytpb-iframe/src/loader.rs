//! Player API script loading with exponential backoff

use futures::future::BoxFuture;
use tokio::time;
use tracing::{error, info, warn};
use ytpb_common::config::RetryConfig;
use ytpb_common::{Error, Result};

/// Host capability that loads the player API script
pub trait ApiLoader: Send + Sync {
    /// Load the script at `url`, resolving once it has been evaluated
    fn load_script(&self, url: &str) -> BoxFuture<'static, Result<()>>;
}

/// Load the API script, retrying failures on the backoff schedule
///
/// Makes at most `retry.max_attempts` attempts (at least one). Waits 1s, 2s, 4s, ...
/// between attempts with the default configuration.
pub async fn load_with_retry(loader: &dyn ApiLoader, url: &str, retry: RetryConfig) -> Result<()> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match loader.load_script(url).await {
            Ok(()) => {
                info!("YouTube IFrame API script loaded from {}", url);
                return Ok(());
            }
            Err(e) => {
                let next = attempt + 1;
                match retry.delay_for_attempt(attempt).filter(|_| next < max_attempts) {
                    Some(delay) => {
                        warn!(
                            "Loading YouTube IFrame API script failed (attempt {}/{}): {}; retrying in {}ms",
                            next,
                            max_attempts,
                            e,
                            delay.as_millis()
                        );
                        time::sleep(delay).await;
                        attempt = next;
                    }
                    None => {
                        error!(
                            "YouTube IFrame API script could not be loaded after {} attempt(s): {}",
                            next, e
                        );
                        return Err(Error::ApiLoad(format!(
                            "{} failed after {} attempt(s): {}",
                            url, next, e
                        )));
                    }
                }
            }
        }
    }
}
