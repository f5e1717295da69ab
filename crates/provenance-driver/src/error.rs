// SPDX-License-Identifier: Apache-2.0

//! Driver-level error type for the one genuinely exceptional path this crate
//! surfaces to its caller as a fatal fault.

use thiserror::Error;

/// Errors raised by [`crate::driver::EnforcementDriver`].
#[derive(Debug, Error)]
pub enum DriverError {
    /// The host's internal-hook feature flag was not enabled at startup.
    /// Non-fatal: the driver still registers, but none of its hooks will
    /// actually fire until the host enables the flag.
    #[error("host internal-hook feature flag is not enabled; provenance enforcement is a no-op until it is")]
    FeatureFlagMissing,

    /// Persisting the watermark file failed. Logged by the caller;
    /// in-memory state is unaffected and the next flush retries.
    #[error("watermark file I/O failed: {0}")]
    WatermarkIo(#[from] std::io::Error),

    /// A hook was invoked for a session with no corresponding in-flight
    /// turn — e.g. `after_llm_call` before `context_assembled`. Indicates
    /// the host violated the ordering guarantee in the concurrency model.
    #[error("session {session_key:?} has no in-flight turn for this hook")]
    NoActiveTurn { session_key: String },
}
