use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Component that raised the error (e.g., "loader", "batch_executor")
    pub source: Option<String>,
    /// Additional context about the error (e.g., window id, chunk index)
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Failure reported by a caller-supplied fetch operation.
///
/// The original error is kept as-is behind an `Arc` so one failure can be
/// handed to every caller waiting on the same window.
#[derive(Debug, Clone)]
pub struct FetchError(Arc<anyhow::Error>);

impl FetchError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    /// The error exactly as the fetch operation returned it.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Downcast to the concrete error type produced by the fetch operation.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// True when both values share the same underlying failure.
    pub fn same_failure(&self, other: &FetchError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err)
    }
}

/// Unified error type for the batch loader.
///
/// Cloneable: a window's terminal error is delivered to all of its waiters.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Fetch failed: {0}")]
    Fetch(FetchError),

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }

    /// The fetch failure, if this error came from the fetch operation.
    pub fn as_fetch(&self) -> Option<&FetchError> {
        match self {
            Error::Fetch(e) => Some(e),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        Error::Fetch(err)
    }
}
