//! Per-run execution context
//!
//! Every scheduler run and every inbound operation gets a fresh correlation id.
//! The id travels explicitly in `RunContext` and implicitly in the tracing span
//! returned by [`RunContext::span`], so log lines emitted anywhere below the
//! entry point carry it without a process global.

use tracing::Span;
use uuid::Uuid;

/// Execution context for one unit of work
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Correlation id attached to every log line of this run
    pub correlation_id: Uuid,
    /// Process tag (job name or operation name)
    pub process: String,
    /// Acting user, when the operation was user-initiated
    pub user_id: Option<String>,
}

impl RunContext {
    /// New context with a random correlation id
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            process: process.into(),
            user_id: None,
        }
    }

    /// Attach the acting user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Tracing span carrying the correlation id and process tag
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "run",
            correlation_id = %self.correlation_id,
            process = %self.process,
            user = self.user_id.as_deref().unwrap_or("-"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_get_distinct_ids() {
        let a = RunContext::new("lookup");
        let b = RunContext::new("lookup");
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_eq!(a.process, "lookup");
        assert_eq!(RunContext::new("vote").with_user("u1").user_id.as_deref(), Some("u1"));
    }
}
