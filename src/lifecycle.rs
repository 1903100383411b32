//! Document lifecycle state machine.
//!
//! A document moves `processing` → (`dispatched` | `webhook_error` |
//! `webhook_unreachable` | `error`) as the outbound notification is
//! attempted, then to `ready` (or a caller-supplied state) when the external
//! processor pushes content back. The semantic state lives in `status`;
//! diagnostic detail such as an HTTP code lives in `status_detail`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Uploaded; dispatch to the processing webhook is pending.
    Processing,
    /// The webhook accepted the notification; awaiting callback.
    Dispatched,
    /// The webhook answered with a non-2xx status.
    WebhookError,
    /// The webhook could not be reached (timeout or connection failure).
    WebhookUnreachable,
    /// Corrected content delivered via callback.
    Ready,
    /// Uncaught fault while dispatching.
    Error,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Dispatched => "dispatched",
            DocumentStatus::WebhookError => "webhook_error",
            DocumentStatus::WebhookUnreachable => "webhook_unreachable",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(DocumentStatus::Processing),
            "dispatched" => Some(DocumentStatus::Dispatched),
            "webhook_error" => Some(DocumentStatus::WebhookError),
            "webhook_unreachable" => Some(DocumentStatus::WebhookUnreachable),
            "ready" => Some(DocumentStatus::Ready),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

/// Result of one outbound dispatch attempt.
#[derive(Debug)]
pub enum DispatchOutcome {
    Accepted,
    Rejected { status_code: u16 },
    Unreachable { error: String },
}

impl DispatchOutcome {
    /// The (status, detail) pair to record on the document.
    pub fn status(&self) -> (DocumentStatus, Option<String>) {
        match self {
            DispatchOutcome::Accepted => (DocumentStatus::Dispatched, None),
            DispatchOutcome::Rejected { status_code } => (
                DocumentStatus::WebhookError,
                Some(format!("webhook returned status {status_code}")),
            ),
            DispatchOutcome::Unreachable { error } => {
                (DocumentStatus::WebhookUnreachable, Some(error.clone()))
            }
        }
    }
}

/// Fallback HTML fragment for callbacks that deliver raw text only.
pub fn fallback_html(raw_text: &str) -> String {
    let escaped = raw_text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>");
    format!("<div>{escaped}</div>")
}
