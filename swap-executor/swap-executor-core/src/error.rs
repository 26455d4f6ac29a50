//! Error types for the swap executor

use swap_executor_api::steps::StepType;

/// Signer error codes that mean the user rejected the request
const USER_REJECTED_CODES: [i64; 2] = [803, -99_999];

/// Type alias for Results using ExecutorError
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// An error returned by the swap executor or one of its collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// The user rejected a signature or dismissed a confirmation
    #[error("user cancelled: {0}")]
    UserCancelled(String),
    /// A signer failed, optionally with a wallet error code
    #[error("signer error: {message}")]
    Signer {
        /// The wallet error code, if the signer reported one
        code: Option<i64>,
        /// The error message
        message: String,
    },
    /// A hardware or QR device failed
    #[error("hardware error: {0}")]
    Hardware(String),
    /// A deterministic application error
    #[error("app error: {0}")]
    App(String),
    /// The swap build endpoint rejected the request
    #[error("build error: {0}")]
    BuildApi(String),
    /// Fee estimation failed
    #[error("estimate error: {0}")]
    Estimate(String),
    /// Broadcasting a transaction failed
    #[error("send error: {0}")]
    Send(String),
    /// An http request failed
    #[error("http error: {0}")]
    Http(String),
    /// An error parsing a value
    #[error("parse error: {0}")]
    Parse(String),
    /// A typed-data payload could not be normalized
    #[error("typed data error: {0}")]
    TypedData(String),
    /// The held quote does not match the user's inputs
    #[error("quote mismatch: {0}")]
    QuoteMismatch(String),
    /// An auxiliary fee token balance is too low
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
    /// The order relayer rejected a request
    #[error("relayer error: {0}")]
    Relayer(String),
    /// The step plan is inconsistent with the quote it runs against
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    /// The plan was abandoned by the session
    #[error("plan abandoned")]
    PlanAbandoned,
    /// A custom error
    #[error("custom error: {0}")]
    Custom(String),
}

/// How the executor reacts to a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Downgrade to per-step manual confirmation and retry the step
    Fallback,
    /// Stop without retry
    UserCancel,
    /// Stop and surface the error on the step
    Terminal,
}

impl ExecutorError {
    /// Create a new custom error
    #[allow(clippy::needless_pass_by_value)]
    pub fn custom<T: ToString>(e: T) -> Self {
        ExecutorError::Custom(e.to_string())
    }

    /// Create a new user cancellation error
    #[allow(clippy::needless_pass_by_value)]
    pub fn user_cancelled<T: ToString>(e: T) -> Self {
        ExecutorError::UserCancelled(e.to_string())
    }

    /// Create a new signer error
    #[allow(clippy::needless_pass_by_value)]
    pub fn signer<T: ToString>(code: Option<i64>, e: T) -> Self {
        ExecutorError::Signer { code, message: e.to_string() }
    }

    /// Create a new hardware error
    #[allow(clippy::needless_pass_by_value)]
    pub fn hardware<T: ToString>(e: T) -> Self {
        ExecutorError::Hardware(e.to_string())
    }

    /// Create a new app error
    #[allow(clippy::needless_pass_by_value)]
    pub fn app<T: ToString>(e: T) -> Self {
        ExecutorError::App(e.to_string())
    }

    /// Create a new build error
    #[allow(clippy::needless_pass_by_value)]
    pub fn build_api<T: ToString>(e: T) -> Self {
        ExecutorError::BuildApi(e.to_string())
    }

    /// Create a new estimate error
    #[allow(clippy::needless_pass_by_value)]
    pub fn estimate<T: ToString>(e: T) -> Self {
        ExecutorError::Estimate(e.to_string())
    }

    /// Create a new send error
    #[allow(clippy::needless_pass_by_value)]
    pub fn send<T: ToString>(e: T) -> Self {
        ExecutorError::Send(e.to_string())
    }

    /// Create a new http error
    #[allow(clippy::needless_pass_by_value)]
    pub fn http<T: ToString>(e: T) -> Self {
        ExecutorError::Http(e.to_string())
    }

    /// Create a new parse error
    #[allow(clippy::needless_pass_by_value)]
    pub fn parse<T: ToString>(e: T) -> Self {
        ExecutorError::Parse(e.to_string())
    }

    /// Create a new typed data error
    #[allow(clippy::needless_pass_by_value)]
    pub fn typed_data<T: ToString>(e: T) -> Self {
        ExecutorError::TypedData(e.to_string())
    }

    /// Create a new quote mismatch error
    #[allow(clippy::needless_pass_by_value)]
    pub fn quote_mismatch<T: ToString>(e: T) -> Self {
        ExecutorError::QuoteMismatch(e.to_string())
    }

    /// Create a new insufficient balance error
    #[allow(clippy::needless_pass_by_value)]
    pub fn insufficient_balance<T: ToString>(e: T) -> Self {
        ExecutorError::InsufficientBalance(e.to_string())
    }

    /// Create a new relayer error
    #[allow(clippy::needless_pass_by_value)]
    pub fn relayer<T: ToString>(e: T) -> Self {
        ExecutorError::Relayer(e.to_string())
    }

    /// Create a new invalid plan error
    #[allow(clippy::needless_pass_by_value)]
    pub fn invalid_plan<T: ToString>(e: T) -> Self {
        ExecutorError::InvalidPlan(e.to_string())
    }

    /// Whether the error means the user rejected the request
    pub fn is_user_rejection(&self) -> bool {
        match self {
            ExecutorError::UserCancelled(_) => true,
            ExecutorError::Signer { code: Some(code), .. }
                if USER_REJECTED_CODES.contains(code) =>
            {
                true
            },
            e => e.to_string().to_lowercase().contains("reject"),
        }
    }

    /// Classify the error raised by a step of the given type
    pub fn failure_class(&self, step_type: StepType) -> FailureClass {
        if self.is_user_rejection() {
            return FailureClass::UserCancel;
        }

        // Signature requests are never retried through a confirmation screen
        if step_type == StepType::SignMessage {
            return FailureClass::Terminal;
        }

        match self {
            ExecutorError::Hardware(_)
            | ExecutorError::App(_)
            | ExecutorError::BuildApi(_)
            | ExecutorError::Parse(_)
            | ExecutorError::TypedData(_)
            | ExecutorError::QuoteMismatch(_)
            | ExecutorError::InsufficientBalance(_)
            | ExecutorError::InvalidPlan(_)
            | ExecutorError::PlanAbandoned => FailureClass::Terminal,
            _ => FailureClass::Fallback,
        }
    }
}

impl From<reqwest::Error> for ExecutorError {
    fn from(e: reqwest::Error) -> Self {
        ExecutorError::http(e)
    }
}

impl From<serde_json::Error> for ExecutorError {
    fn from(e: serde_json::Error) -> Self {
        ExecutorError::parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that rejections are recognized by variant, code and message
    #[test]
    fn test_user_rejection() {
        assert!(ExecutorError::user_cancelled("dismissed").is_user_rejection());
        assert!(ExecutorError::signer(Some(803), "cancelled").is_user_rejection());
        assert!(ExecutorError::signer(Some(-99_999), "cancelled").is_user_rejection());
        assert!(ExecutorError::send("User Rejected the request").is_user_rejection());
        assert!(!ExecutorError::signer(Some(4001), "nonce too low").is_user_rejection());
    }

    /// Test the classification of transient and deterministic errors
    #[test]
    fn test_failure_class() {
        let estimate = ExecutorError::estimate("rpc timeout");
        assert_eq!(estimate.failure_class(StepType::Approve), FailureClass::Fallback);
        assert_eq!(
            ExecutorError::send("nonce too low").failure_class(StepType::Send),
            FailureClass::Fallback
        );
        assert_eq!(
            ExecutorError::build_api("quote expired").failure_class(StepType::Send),
            FailureClass::Terminal
        );
        assert_eq!(
            ExecutorError::hardware("device locked").failure_class(StepType::Send),
            FailureClass::Terminal
        );
    }

    /// Test that sign message failures never fall back
    #[test]
    fn test_sign_message_is_terminal() {
        let err = ExecutorError::relayer("bad gateway");
        assert_eq!(err.failure_class(StepType::SignMessage), FailureClass::Terminal);
        assert_eq!(err.failure_class(StepType::Send), FailureClass::Fallback);

        let cancel = ExecutorError::user_cancelled("dismissed");
        assert_eq!(cancel.failure_class(StepType::SignMessage), FailureClass::UserCancel);
    }
}
