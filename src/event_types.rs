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
use nakadi_client_config::ApiOptions;
use nakadi_client_retry::retry_policy::RetryWithBackoff;
use nakadi_client_shared::EventType;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::Arc;

/// Inspect and manage event types on a Nakadi instance.
pub struct EventTypeApi {
    raw: Arc<RawClient>,
    backoff: RetryWithBackoff,
}

impl EventTypeApi {
    pub(crate) fn new(raw: Arc<RawClient>, options: &ApiOptions) -> EventTypeApi {
        EventTypeApi {
            raw,
            backoff: options.backoff(),
        }
    }

    /// All registered event types.
    pub async fn list(&self) -> Result<Vec<EventType>, NakadiError> {
        self.raw
            .get_json(&self.event_base_url(), self.backoff, "unable to request event types")
            .await
    }

    /// One event type by name.
    pub async fn get(&self, name: &str) -> Result<EventType, NakadiError> {
        self.raw
            .get_json(&self.event_url(name), self.backoff, "unable to request event type")
            .await
    }

    /// Register a new event type.
    pub async fn create(&self, event_type: &EventType) -> Result<(), NakadiError> {
        const CONTEXT: &str = "unable to create event type";

        let response = self
            .raw
            .post_json(
                &self.event_base_url(),
                event_type,
                HeaderMap::new(),
                self.backoff,
                CONTEXT,
            )
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
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

    /// Update an existing event type.
    pub async fn update(&self, event_type: &EventType) -> Result<(), NakadiError> {
        const CONTEXT: &str = "unable to update event type";

        let response = self
            .raw
            .put_json(
                &self.event_url(&event_type.name),
                event_type,
                self.backoff,
                CONTEXT,
            )
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
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

    /// Remove an event type.
    pub async fn delete(&self, name: &str) -> Result<(), NakadiError> {
        self.raw
            .delete(&self.event_url(name), self.backoff, "unable to delete event type")
            .await
    }

    fn event_base_url(&self) -> String {
        format!("{}/event-types", self.raw.base_url())
    }

    fn event_url(&self, name: &str) -> String {
        format!("{}/event-types/{}", self.raw.base_url(), name)
    }
}
