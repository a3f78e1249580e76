//! Per-destination failure policy
//!
//! Every registration carries a [`FailurePolicy`] that decides what happens
//! when its provider call fails. The policy is a plain value checked once at
//! each error site.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// How a failed provider call is surfaced
///
/// Names in configuration and logs are `none`, `console` and `exception`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// Swallow the failure (debug-level trace only)
    #[serde(rename = "none", alias = "silent")]
    Silent,
    /// Report the failure on the diagnostic stream and continue
    ///
    /// Reported through `tracing::warn!`; needs [`init_tracing`](crate::observability::init_tracing)
    /// or an equivalent subscriber writing to stderr, otherwise it is as quiet as `none`.
    #[default]
    #[serde(rename = "console", alias = "log_to_console")]
    Console,
    /// Propagate the failure to the caller, wrapped with the registration name
    #[serde(rename = "exception", alias = "raise")]
    Raise,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "none"),
            Self::Console => write!(f, "console"),
            Self::Raise => write!(f, "exception"),
        }
    }
}

/// Provider operation being dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// New event
    Insert,
    /// Overwrite an existing event
    Replace,
    /// Lookup by id
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Replace => write!(f, "replace"),
            Self::Get => write!(f, "get"),
        }
    }
}

impl FailurePolicy {
    /// Settle a provider failure according to this policy
    ///
    /// Returns `Ok(())` when the failure is absorbed, or the wrapped error
    /// when the policy is [`FailurePolicy::Raise`].
    pub fn settle(
        &self,
        registration: &str,
        operation: Operation,
        error: Error,
        consecutive_failures: u64,
    ) -> Result<()> {
        match self {
            Self::Silent => {
                tracing::debug!(
                    registration,
                    %operation,
                    error = %error,
                    "Audit provider failure ignored"
                );
                Ok(())
            }
            Self::Console => {
                tracing::warn!(
                    registration,
                    %operation,
                    consecutive_failures,
                    error = %error,
                    "Audit provider '{}' failed",
                    registration
                );
                Ok(())
            }
            Self::Raise => {
                tracing::error!(
                    registration,
                    %operation,
                    consecutive_failures,
                    error = %error,
                    "Audit provider '{}' failed, raising to caller",
                    registration
                );
                Err(Error::Provider {
                    registration: registration.to_string(),
                    operation,
                    source: Box::new(error),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        policy: FailurePolicy,
    }

    #[test]
    fn test_policy_names() {
        for (raw, expected) in [
            ("none", FailurePolicy::Silent),
            ("silent", FailurePolicy::Silent),
            ("console", FailurePolicy::Console),
            ("exception", FailurePolicy::Raise),
            ("raise", FailurePolicy::Raise),
        ] {
            let holder: Holder =
                serde_json::from_str(&format!("{{\"policy\":\"{}\"}}", raw)).unwrap();
            assert_eq!(holder.policy, expected, "parsing {}", raw);
        }
        assert_eq!(FailurePolicy::Silent.to_string(), "none");
        assert_eq!(FailurePolicy::Raise.to_string(), "exception");
        assert_eq!(FailurePolicy::default(), FailurePolicy::Console);
    }

    #[test]
    fn test_absorbing_policies_return_ok() {
        for policy in [FailurePolicy::Silent, FailurePolicy::Console] {
            let outcome = policy.settle(
                "db",
                Operation::Insert,
                Error::Crypto("boom".to_string()),
                1,
            );
            assert!(outcome.is_ok());
        }
    }

    #[test]
    fn test_raise_wraps_with_registration() {
        let err = FailurePolicy::Raise
            .settle("siem", Operation::Replace, Error::Cancelled, 3)
            .unwrap_err();
        match err {
            Error::Provider {
                registration,
                operation,
                source,
            } => {
                assert_eq!(registration, "siem");
                assert_eq!(operation, Operation::Replace);
                assert!(matches!(*source, Error::Cancelled));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
