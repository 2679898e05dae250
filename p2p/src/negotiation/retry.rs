//! Bounded retry of timed-out negotiation attempts

use super::{NegotiationError, Result};
use crate::cancel::CancelToken;
use logging::Logger;

/// Calls `attempt` until it succeeds, fails with a non-retryable error or
/// `max_retries` extra attempts have timed out.
///
/// `attempt` receives the zero-based attempt number.
pub fn negotiate_with_retry<T, F>(
    max_retries: u32,
    cancel: &CancelToken,
    logger: &Logger,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut number = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(NegotiationError::Cancelled);
        }
        match attempt(number) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && number < max_retries => {
                number += 1;
                logger.warn(&format!(
                    "Negotiation attempt failed ({}), retrying ({}/{})",
                    e, number, max_retries
                ));
            }
            Err(e) => return Err(e),
        }
    }
}
