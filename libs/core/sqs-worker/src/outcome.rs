//! Handler outcomes and their resolution into finalization actions

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// What a handler reports back for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processed, delete the message
    Continue,
    /// Make the message visible again immediately
    Retry,
    /// Drop the message without further processing
    Reject,
    /// Forward the message to the dead-letter queue, then delete it
    SendDlq,
    /// Unrecognized failure
    Failure {
        message: String,
        trace: Option<String>,
    },
}

impl HandlerOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        HandlerOutcome::Failure {
            message: message.into(),
            trace: None,
        }
    }

    /// Failure carrying the full report chain as its trace
    pub fn from_report(report: &eyre::Report) -> Self {
        HandlerOutcome::Failure {
            message: report.to_string(),
            trace: Some(format!("{report:?}")),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, HandlerOutcome::Failure { .. })
    }
}

impl<E> From<Result<(), E>> for HandlerOutcome
where
    E: Into<eyre::Report>,
{
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => HandlerOutcome::Continue,
            Err(e) => HandlerOutcome::from_report(&e.into()),
        }
    }
}

/// Resolved finalization action for a message
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecuteResult {
    /// Not yet resolved
    #[default]
    Nil,
    Deletable,
    Retry,
    Reject,
    SendDlq,
}

impl ExecuteResult {
    /// Classify a handler outcome
    ///
    /// Failures become `Deletable` when `deletable_on_error` is set and
    /// `Retry` otherwise.
    pub fn classify(outcome: &HandlerOutcome, deletable_on_error: bool) -> Self {
        match outcome {
            HandlerOutcome::Continue => ExecuteResult::Deletable,
            HandlerOutcome::Retry => ExecuteResult::Retry,
            HandlerOutcome::Reject => ExecuteResult::Reject,
            HandlerOutcome::SendDlq => ExecuteResult::SendDlq,
            HandlerOutcome::Failure { .. } if deletable_on_error => ExecuteResult::Deletable,
            HandlerOutcome::Failure { .. } => ExecuteResult::Retry,
        }
    }

    /// Whether finalization deletes the message from the source queue
    pub fn deletes_message(&self) -> bool {
        matches!(
            self,
            ExecuteResult::Deletable | ExecuteResult::Reject | ExecuteResult::SendDlq
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let cases = [
            (HandlerOutcome::Continue, false, ExecuteResult::Deletable),
            (HandlerOutcome::Retry, true, ExecuteResult::Retry),
            (HandlerOutcome::Reject, false, ExecuteResult::Reject),
            (HandlerOutcome::SendDlq, false, ExecuteResult::SendDlq),
            (HandlerOutcome::failure("boom"), false, ExecuteResult::Retry),
            (HandlerOutcome::failure("boom"), true, ExecuteResult::Deletable),
        ];

        for (outcome, deletable, expected) in cases {
            assert_eq!(
                ExecuteResult::classify(&outcome, deletable),
                expected,
                "{outcome:?} deletable={deletable}"
            );
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(ExecuteResult::Deletable.to_string(), "deletable");
        assert_eq!(ExecuteResult::SendDlq.as_ref(), "send_dlq");
        assert_eq!(
            serde_json::to_string(&ExecuteResult::SendDlq).unwrap(),
            "\"send_dlq\""
        );
        assert_eq!(ExecuteResult::default(), ExecuteResult::Nil);
    }

    #[test]
    fn test_from_result() {
        let ok: Result<(), std::io::Error> = Ok(());
        assert_eq!(HandlerOutcome::from(ok), HandlerOutcome::Continue);

        let err: Result<(), eyre::Report> = Err(eyre::eyre!("downstream unavailable"));
        match HandlerOutcome::from(err) {
            HandlerOutcome::Failure { message, trace } => {
                assert_eq!(message, "downstream unavailable");
                assert!(trace.is_some());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_deletes_message() {
        assert!(ExecuteResult::Deletable.deletes_message());
        assert!(ExecuteResult::Reject.deletes_message());
        assert!(ExecuteResult::SendDlq.deletes_message());
        assert!(!ExecuteResult::Retry.deletes_message());
        assert!(!ExecuteResult::Nil.deletes_message());
    }
}
