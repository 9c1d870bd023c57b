//! Outcome classification for a single fetch.

use super::FetchError;

/// How the worker loop should treat a fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchClass {
    /// 2xx with a non-empty body: parse and persist.
    Success,

    /// The target is confirmed gone: drop it from the queue.
    NotFound,

    /// Anything else: back off and let the item be retried.
    SoftFailure,
}

/// Classifies a completed response.
///
/// | Status | Body | Class |
/// |--------|------|-------|
/// | 2xx | non-empty | Success |
/// | 2xx | empty | SoftFailure |
/// | 0, 404, 410 | any | NotFound |
/// | other | any | SoftFailure |
///
/// Status 0 is what a fetcher reports when the remote gave no status for a
/// target that does not exist.
#[must_use]
pub fn classify_response(status: u16, body: &str) -> FetchClass {
    match status {
        0 | 404 | 410 => FetchClass::NotFound,
        200..=299 if !body.trim().is_empty() => FetchClass::Success,
        _ => FetchClass::SoftFailure,
    }
}

/// Classifies a request that produced no response.
///
/// Only a malformed target is permanent; every transport failure is retried.
#[must_use]
pub fn classify_error(error: &FetchError) -> FetchClass {
    match error {
        FetchError::InvalidUrl { .. } => FetchClass::NotFound,
        FetchError::Network { .. }
        | FetchError::Timeout { .. }
        | FetchError::Body { .. }
        | FetchError::ClientBuild { .. } => FetchClass::SoftFailure,
    }
}
