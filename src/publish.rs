//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use crate::error::{self, BatchItemsError, NakadiError};
use crate::raw_client::RawClient;
use async_trait::async_trait;
use nakadi_client_config::ApiOptions;
use nakadi_client_retry::retry_policy::RetryWithBackoff;
use nakadi_client_shared::{BatchItemResponse, BusinessEvent, DataChangeEvent, UndefinedEvent};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;

const CONTEXT: &str = "unable to publish events";

/// Publishes one pre-formed batch of already-serialized events. The seam
/// the publish batcher coalesces against; tests substitute mocks.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_events(&self, events: Vec<serde_json::Value>) -> Result<(), NakadiError>;
}

/// Publishes batches of events to one event type.
///
/// All publish methods emit events as a single batch. When a publish
/// method returns [`NakadiError::PartialPublish`] the caller should
/// inspect the carried [`BatchItemsError`] to learn which events of the
/// batch have been published.
pub struct PublishApi {
    raw: Arc<RawClient>,
    publish_url: String,
    backoff: RetryWithBackoff,
}

impl PublishApi {
    pub(crate) fn new(raw: Arc<RawClient>, event_type: &str, options: &ApiOptions) -> PublishApi {
        let publish_url = format!("{}/event-types/{}/events", raw.base_url(), event_type);
        PublishApi {
            raw,
            publish_url,
            backoff: options.backoff(),
        }
    }

    /// Emit a batch of events of any category.
    pub async fn publish<T: Serialize>(&self, events: &[T]) -> Result<(), NakadiError> {
        let response = self
            .raw
            .post_json(&self.publish_url, events, HeaderMap::new(), self.backoff, CONTEXT)
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK => Ok(()),
            StatusCode::MULTI_STATUS | StatusCode::UNPROCESSABLE_ENTITY => {
                let buffer = response
                    .bytes()
                    .await
                    .map_err(|source| NakadiError::ReadBody {
                        context: CONTEXT,
                        source,
                    })?;
                Err(partial_publish_error(&buffer))
            }
            _ => {
                let buffer = response
                    .bytes()
                    .await
                    .map_err(|source| NakadiError::ReadBody {
                        context: CONTEXT,
                        source,
                    })?;
                Err(error::decode_broker_error(CONTEXT, status.as_u16(), &buffer))
            }
        }
    }

    /// Emit a batch of undefined events.
    pub async fn publish_undefined(&self, events: &[UndefinedEvent]) -> Result<(), NakadiError> {
        self.publish(events).await
    }

    /// Emit a batch of business events.
    pub async fn publish_business(&self, events: &[BusinessEvent]) -> Result<(), NakadiError> {
        self.publish(events).await
    }

    /// Emit a batch of data change events.
    pub async fn publish_data_change(&self, events: &[DataChangeEvent]) -> Result<(), NakadiError> {
        self.publish(events).await
    }
}

#[async_trait]
impl EventPublisher for PublishApi {
    async fn publish_events(&self, events: Vec<serde_json::Value>) -> Result<(), NakadiError> {
        self.publish(&events).await
    }
}

/// Decode the body of a 207/422 response into a partial-publish error.
fn partial_publish_error(body: &[u8]) -> NakadiError {
    match serde_json::from_slice::<Vec<BatchItemResponse>>(body) {
        Ok(items) => NakadiError::PartialPublish {
            context: CONTEXT,
            source: BatchItemsError::new(items),
        },
        Err(source) => NakadiError::DecodeBody {
            context: CONTEXT,
            source,
        },
    }
}
