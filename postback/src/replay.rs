//! Replay protection primitives.
//!
//! Pure validation of the timestamp window and the nonce shape; the
//! single-use check itself happens against storage in the postback
//! route, where a failed nonce insert means the request was replayed.

use thiserror::Error;

pub const MAX_NONCE_LENGTH: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("ts parameter is missing")]
    MissingTimestamp,
    #[error("ts parameter is not a unix timestamp")]
    InvalidTimestamp,
    #[error("ts is outside the accepted window")]
    Expired,
    #[error("nonce parameter is missing")]
    MissingNonce,
    #[error("nonce parameter is invalid")]
    InvalidNonce,
}

/// Validates the postback timestamp against the replay window and
/// returns it as epoch seconds.
///
/// The window is symmetric around `now` to tolerate clock skew in
/// either direction.
pub fn check_window(
    ts: Option<&str>,
    window_secs: u64,
    now: i64,
) -> Result<i64, ReplayError> {
    let ts = ts.ok_or(ReplayError::MissingTimestamp)?;
    let ts: i64 = ts.parse().map_err(|_| ReplayError::InvalidTimestamp)?;
    if ts < 0 {
        return Err(ReplayError::InvalidTimestamp);
    }

    let skew = (now - ts).unsigned_abs();
    if skew > window_secs {
        return Err(ReplayError::Expired);
    }

    Ok(ts)
}

/// Validates the nonce shape: non-empty, bounded length, visible ASCII.
pub fn validate_nonce(nonce: Option<&str>) -> Result<&str, ReplayError> {
    let nonce = nonce.ok_or(ReplayError::MissingNonce)?;

    if nonce.is_empty() || nonce.len() > MAX_NONCE_LENGTH {
        return Err(ReplayError::InvalidNonce);
    }
    if !nonce.bytes().all(|byte| byte.is_ascii_graphic()) {
        return Err(ReplayError::InvalidNonce);
    }

    Ok(nonce)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000;
    const WINDOW: u64 = 300;

    #[test]
    fn accepts_timestamps_inside_the_window() {
        assert_eq!(Ok(NOW), check_window(Some("1700000000"), WINDOW, NOW));
        // boundary values are still inside
        assert_eq!(Ok(NOW - 300), check_window(Some("1699999700"), WINDOW, NOW));
        assert_eq!(Ok(NOW + 300), check_window(Some("1700000300"), WINDOW, NOW));
    }

    #[test]
    fn rejects_timestamps_outside_the_window() {
        assert_eq!(
            Err(ReplayError::Expired),
            check_window(Some("1699999699"), WINDOW, NOW)
        );
        // a future timestamp past the window is just as invalid
        assert_eq!(
            Err(ReplayError::Expired),
            check_window(Some("1700000301"), WINDOW, NOW)
        );
    }

    #[test]
    fn rejects_missing_or_malformed_timestamps() {
        assert_eq!(
            Err(ReplayError::MissingTimestamp),
            check_window(None, WINDOW, NOW)
        );
        assert_eq!(
            Err(ReplayError::InvalidTimestamp),
            check_window(Some("yesterday"), WINDOW, NOW)
        );
        assert_eq!(
            Err(ReplayError::InvalidTimestamp),
            check_window(Some("1.7e9"), WINDOW, NOW)
        );
        assert_eq!(
            Err(ReplayError::InvalidTimestamp),
            check_window(Some("-5"), WINDOW, NOW)
        );
    }

    #[test]
    fn validates_the_nonce_shape() {
        assert_eq!(Ok("n-42"), validate_nonce(Some("n-42")));

        assert_eq!(Err(ReplayError::MissingNonce), validate_nonce(None));
        assert_eq!(Err(ReplayError::InvalidNonce), validate_nonce(Some("")));
        assert_eq!(
            Err(ReplayError::InvalidNonce),
            validate_nonce(Some("with space"))
        );
        assert_eq!(
            Err(ReplayError::InvalidNonce),
            validate_nonce(Some(&"n".repeat(MAX_NONCE_LENGTH + 1)))
        );
    }
}
