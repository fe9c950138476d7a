//! Utility functions for common operations.

use crate::error::ServiceError;
use std::future::Future;
use std::time::Duration;

/// Runs a service call with an upper bound on how long it may take.
///
/// A call that does not resolve in time becomes `ServiceError::Timeout`,
/// which callers treat like any other transient failure.
///
/// # Arguments
/// * `endpoint` - Short name of the call, used in the error
/// * `timeout` - Maximum time to wait
/// * `call` - The future performing the request
pub async fn with_timeout<T, F>(
    endpoint: &str,
    timeout: Duration,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout {
            endpoint: endpoint.to_string(),
            timeout,
        }),
    }
}

/// Formats a countdown as `Xh YYm`, or `Ym ZZs` under an hour.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

/// Shortens text for log and console previews.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hours() {
        assert_eq!(format_duration(Duration::from_secs(7200 + 60 * 7)), "2h 07m");
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::ZERO), "0m 00s");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短い", 10), "短い");
        assert_eq!(truncate_text("안녕하세요 세계", 5), "안녕하세요...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<(), ServiceError> = with_timeout(
            "slow",
            Duration::from_secs(1),
            std::future::pending(),
        )
        .await;

        match result {
            Err(ServiceError::Timeout { endpoint, timeout }) => {
                assert_eq!(endpoint, "slow");
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout("fast", Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
