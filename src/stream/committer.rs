//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use crate::error::{self, NakadiError};
use crate::raw_client::RawClient;
use async_trait::async_trait;
use nakadi_client_retry::retry_policy::RetryWithBackoff;
use nakadi_client_shared::Cursor;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;

/// Acknowledges one processed batch by sending its cursor back to the
/// broker.
#[async_trait]
pub trait CursorCommitter: Send + Sync {
    /// Commit one cursor. The request is tagged with the identity of the
    /// stream the cursor was read from; the broker rejects commits whose
    /// stream is no longer authoritative.
    async fn commit_cursor(&self, cursor: &Cursor) -> Result<(), NakadiError>;
}

#[derive(Serialize)]
struct CommitBody<'a> {
    items: [&'a Cursor; 1],
}

/// POSTs cursors to `/subscriptions/{id}/cursors`. A single attempt per
/// call; the stream engine owns commit retry.
pub(crate) struct HttpCursorCommitter {
    raw: Arc<RawClient>,
    commit_url: String,
}

impl HttpCursorCommitter {
    pub(crate) fn new(raw: Arc<RawClient>, subscription_id: &str) -> Self {
        let commit_url = format!("{}/subscriptions/{}/cursors", raw.base_url(), subscription_id);
        HttpCursorCommitter { raw, commit_url }
    }
}

#[async_trait]
impl CursorCommitter for HttpCursorCommitter {
    async fn commit_cursor(&self, cursor: &Cursor) -> Result<(), NakadiError> {
        const CONTEXT: &str = "unable to commit cursor";

        let mut headers = HeaderMap::new();
        let stream_id = HeaderValue::from_str(&cursor.stream_id).map_err(
            |_: InvalidHeaderValue| NakadiError::Internal {
                msg: format!("cursor carries a malformed stream id {:?}", cursor.stream_id),
            },
        )?;
        // HeaderName::from_static requires the lowercase form; header
        // names compare case-insensitively on the wire
        headers.insert(HeaderName::from_static("x-nakadi-streamid"), stream_id);

        let body = CommitBody { items: [cursor] };
        let response = self
            .raw
            .post_json(
                &self.commit_url,
                &body,
                headers,
                RetryWithBackoff::no_retry(),
                CONTEXT,
            )
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            let buffer = response
                .bytes()
                .await
                .map_err(|source| NakadiError::ReadBody {
                    context: CONTEXT,
                    source,
                })?;
            return Err(error::decode_broker_error(CONTEXT, status.as_u16(), &buffer));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::reader::STREAM_ID_HEADER;

    #[test]
    fn test_commit_body_shape() {
        let cursor = Cursor {
            partition: "0".to_string(),
            offset: "000000000012".to_string(),
            event_type: "order.ORDER_RECEIVED".to_string(),
            cursor_token: "b75c3102".to_string(),
            stream_id: "fa2a4a0e".to_string(),
        };
        let body = CommitBody { items: [&cursor] };

        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded["items"][0]["offset"], "000000000012");
        // the stream id travels in the header, never in the payload
        assert!(encoded["items"][0].get("stream_id").is_none());
    }

    #[test]
    fn test_header_name_matches_wire_header() {
        assert!(STREAM_ID_HEADER.eq_ignore_ascii_case("x-nakadi-streamid"));
    }
}
