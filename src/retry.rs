use std::time::Duration;

const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 60;

/// Capped exponential backoff schedule for reconnect attempts: 1s, 2s, 4s,
/// ... up to one minute.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(6);
    Duration::from_secs((BACKOFF_BASE_SECS << exp).min(BACKOFF_CAP_SECS))
}

/// Retries a fallible async transport operation a few times before giving
/// up, logging each failed attempt with its context.
macro_rules! retry_transport_operation {
    ($context:expr, $operation:expr) => {{
        const MAX_ATTEMPTS: u32 = 3;
        const RETRY_DELAY_SECS: u64 = 2;

        let context_value: String = $context.into();
        let mut attempt = 1;

        loop {
            match ($operation).await {
                Ok(value) => break Ok(value),
                Err(err) if attempt >= MAX_ATTEMPTS => break Err(err),
                Err(err) => {
                    log::warn!(
                        "{} failed on attempt {}/{}: {}; retrying in {}s",
                        context_value,
                        attempt,
                        MAX_ATTEMPTS,
                        err,
                        RETRY_DELAY_SECS
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(RETRY_DELAY_SECS)).await;
                    attempt += 1;
                }
            }
        }
    }};
}

pub(crate) use retry_transport_operation;
