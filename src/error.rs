//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use nakadi_client_auth::TokenError;
use nakadi_client_shared::BatchItemResponse;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fmt;

/// The error surface of the Nakadi client.
///
/// Every variant produced while talking to the broker carries the
/// human-readable context of the operation that failed as a message
/// prefix. [`NakadiError::is_permanent`] distinguishes input errors that
/// must never be retried from transient transport failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NakadiError {
    /// The configured token provider failed. Never retried.
    #[snafu(display("{}: unable to prepare request: {}", context, source))]
    Token {
        context: &'static str,
        source: TokenError,
    },

    /// The request body could not be serialized. Never retried.
    #[snafu(display("{}: unable to encode json body: {}", context, source))]
    EncodeBody {
        context: &'static str,
        source: serde_json::Error,
    },

    /// No response was received from the broker.
    #[snafu(display("{}: {}", context, source))]
    Transport {
        context: &'static str,
        source: reqwest::Error,
    },

    /// A response arrived but its body could not be read.
    #[snafu(display("{}: unable to read response body: {}", context, source))]
    ReadBody {
        context: &'static str,
        source: reqwest::Error,
    },

    /// The broker answered with an error envelope.
    #[snafu(display("{}: {}", context, detail))]
    Broker {
        context: &'static str,
        status: u16,
        detail: String,
    },

    /// A response body or batch line could not be decoded.
    #[snafu(display("{}: unable to decode response body: {}", context, source))]
    DecodeBody {
        context: &'static str,
        source: serde_json::Error,
    },

    /// Some events of a published batch were not accepted.
    #[snafu(display("{}: {}", context, source))]
    PartialPublish {
        context: &'static str,
        source: BatchItemsError,
    },

    /// Reading from an open stream failed at the I/O level, which
    /// includes the heartbeat watchdog firing.
    #[snafu(display("failed to read next batch: {}", source))]
    StreamIo { source: std::io::Error },

    /// The stream was closed by the caller.
    #[snafu(display("failed to read next batch: stream is closed"))]
    StreamClosed,

    /// The surrounding component was cancelled. Distinct from I/O
    /// failures so callers can shut down quietly.
    #[snafu(display("operation was cancelled"))]
    Cancelled,

    #[snafu(display("processor was already started"))]
    AlreadyStarted,

    #[snafu(display("processor is not running"))]
    NotRunning,

    #[snafu(display("{} streams had errors while closing the stream", count))]
    StreamCloseFailures { count: usize },

    #[snafu(display("internal error: {}", msg))]
    Internal { msg: String },
}

impl NakadiError {
    /// Whether the error is a permanent input error that retrying cannot
    /// fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            NakadiError::Token { .. } | NakadiError::EncodeBody { .. } | NakadiError::Cancelled
        )
    }

    /// Whether the error is the cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NakadiError::Cancelled)
    }
}

/// An error which contains information about the publishing status of
/// each single event in a batch. Callers correlate entries with their
/// events by `eid` and may re-submit the failed ones.
///
/// The plain `Display` form is a terse one-liner; the alternate form
/// (`{:#}`) lists every per-event record.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItemsError(Vec<BatchItemResponse>);

impl BatchItemsError {
    pub fn new(items: Vec<BatchItemResponse>) -> Self {
        BatchItemsError(items)
    }

    /// All per-event records reported by the broker.
    pub fn items(&self) -> &[BatchItemResponse] {
        &self.0
    }

    /// The records of events that were not submitted successfully.
    pub fn failed(&self) -> impl Iterator<Item = &BatchItemResponse> {
        use nakadi_client_shared::PublishingStatus;
        self.0
            .iter()
            .filter(|item| item.publishing_status != PublishingStatus::Submitted)
    }
}

impl fmt::Display for BatchItemsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !f.alternate() {
            return write!(f, "at least one event may not have been published");
        }

        match self.0.len() {
            0 => return write!(f, "an unknown error occurred while publishing event"),
            1 => write!(f, "an error occurred while publishing event: ")?,
            _ => write!(f, "errors occurred while publishing events: ")?,
        }
        for (position, item) in self.0.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}]: {:?}", position, item)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchItemsError {}

/// The broker's application/problem+json error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ProblemJson {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The alternate error envelope some broker endpoints answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ErrorJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Decode an error response body into a [`NakadiError::Broker`]. Tries the
/// problem+json envelope first, then the `{error, error_description}`
/// shape, and falls back to the raw body.
pub(crate) fn decode_broker_error(context: &'static str, status: u16, body: &[u8]) -> NakadiError {
    if let Ok(problem) = serde_json::from_slice::<ProblemJson>(body) {
        if let Some(detail) = problem.detail.or(problem.title) {
            return NakadiError::Broker {
                context,
                status,
                detail,
            };
        }
    }
    if let Ok(error) = serde_json::from_slice::<ErrorJson>(body) {
        let detail = match (error.error, error.error_description) {
            (Some(error), Some(description)) => Some(format!("{}: {}", error, description)),
            (Some(error), None) => Some(error),
            (None, Some(description)) => Some(description),
            (None, None) => None,
        };
        if let Some(detail) = detail {
            return NakadiError::Broker {
                context,
                status,
                detail,
            };
        }
    }
    NakadiError::Broker {
        context,
        status,
        detail: String::from_utf8_lossy(body).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nakadi_client_shared::PublishingStatus;
    use uuid::Uuid;

    #[test]
    fn test_decode_problem_json() {
        let body = br#"{"type":"http://httpstatus.es/404","title":"Not Found","status":404,"detail":"no such event type"}"#;
        let err = decode_broker_error("unable to request event type", 404, body);

        match err {
            NakadiError::Broker { status, ref detail, .. } => {
                assert_eq!(status, 404);
                assert_eq!(detail, "no such event type");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "unable to request event type: no such event type"
        );
    }

    #[test]
    fn test_decode_problem_json_without_detail_uses_title() {
        let body = br#"{"title":"Not Found","status":404}"#;
        let err = decode_broker_error("unable to request event type", 404, body);
        assert_eq!(err.to_string(), "unable to request event type: Not Found");
    }

    #[test]
    fn test_decode_plain_error_json() {
        let body = br#"{"error":"invalid_token","error_description":"The access token is expired"}"#;
        let err = decode_broker_error("unable to commit cursor", 401, body);
        assert_eq!(
            err.to_string(),
            "unable to commit cursor: invalid_token: The access token is expired"
        );
    }

    #[test]
    fn test_decode_falls_back_to_raw_body() {
        let body = b"upstream gateway exploded";
        let err = decode_broker_error("unable to publish events", 502, body);
        assert_eq!(
            err.to_string(),
            "unable to publish events: upstream gateway exploded"
        );
    }

    #[test]
    fn test_problem_json_roundtrip() {
        let problem = ProblemJson {
            problem_type: Some("http://httpstatus.es/409".to_string()),
            title: Some("Conflict".to_string()),
            status: Some(409),
            detail: Some("subscription already exists".to_string()),
        };

        let encoded = serde_json::to_string(&problem).unwrap();
        let decoded: ProblemJson = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, problem);
    }

    #[test]
    fn test_error_json_roundtrip() {
        let error = ErrorJson {
            error: Some("invalid_request".to_string()),
            error_description: Some("missing subscription id".to_string()),
        };

        let encoded = serde_json::to_string(&error).unwrap();
        let decoded: ErrorJson = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, error);
    }

    fn batch_items() -> BatchItemsError {
        BatchItemsError::new(vec![
            BatchItemResponse {
                eid: Some(Uuid::parse_str("74450ab6-5461-11e7-9dd2-87c3afa8811f").unwrap()),
                publishing_status: PublishingStatus::Failed,
                step: Some("validating".to_string()),
                detail: Some("schema validation failed".to_string()),
            },
            BatchItemResponse {
                eid: None,
                publishing_status: PublishingStatus::Aborted,
                step: None,
                detail: None,
            },
        ])
    }

    #[test]
    fn test_batch_items_error_terse_display() {
        assert_eq!(
            batch_items().to_string(),
            "at least one event may not have been published"
        );
    }

    #[test]
    fn test_batch_items_error_verbose_display() {
        let verbose = format!("{:#}", batch_items());
        assert!(verbose.starts_with("errors occurred while publishing events: "));
        assert!(verbose.contains("[0]:"));
        assert!(verbose.contains("[1]:"));
        assert!(verbose.contains("schema validation failed"));
    }

    #[test]
    fn test_batch_items_error_failed_filter() {
        let error = BatchItemsError::new(vec![
            BatchItemResponse {
                eid: None,
                publishing_status: PublishingStatus::Submitted,
                step: None,
                detail: None,
            },
            BatchItemResponse {
                eid: None,
                publishing_status: PublishingStatus::Failed,
                step: None,
                detail: None,
            },
        ]);
        assert_eq!(error.failed().count(), 1);
    }

    #[test]
    fn test_permanent_classification() {
        let token = NakadiError::Token {
            context: "unable to request event types",
            source: nakadi_client_auth::TokenError::Retrieve {
                msg: "boom".to_string(),
            },
        };
        assert!(token.is_permanent());
        assert!(NakadiError::Cancelled.is_permanent());
        assert!(NakadiError::Cancelled.is_cancelled());

        let broker = NakadiError::Broker {
            context: "unable to commit cursor",
            status: 422,
            detail: "stale stream".to_string(),
        };
        assert!(!broker.is_permanent());
        assert!(!broker.is_cancelled());
    }
}
