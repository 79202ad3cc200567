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
use nakadi_client_shared::{Subscription, SubscriptionStats};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct ItemsEnvelope<T> {
    items: Vec<T>,
}

/// Manage subscriptions on a Nakadi instance.
pub struct SubscriptionApi {
    raw: Arc<RawClient>,
    backoff: RetryWithBackoff,
}

impl SubscriptionApi {
    pub(crate) fn new(raw: Arc<RawClient>, options: &ApiOptions) -> SubscriptionApi {
        SubscriptionApi {
            raw,
            backoff: options.backoff(),
        }
    }

    /// All available subscriptions.
    pub async fn list(&self) -> Result<Vec<Subscription>, NakadiError> {
        let envelope: ItemsEnvelope<Subscription> = self
            .raw
            .get_json(&self.sub_base_url(), self.backoff, "unable to request subscriptions")
            .await?;
        Ok(envelope.items)
    }

    /// One subscription by its id.
    pub async fn get(&self, id: &str) -> Result<Subscription, NakadiError> {
        self.raw
            .get_json(&self.sub_url(id), self.backoff, "unable to request subscription")
            .await
    }

    /// Initialize a new subscription. When an equivalent subscription
    /// already exists the pre-existing one is returned.
    pub async fn create(&self, subscription: &Subscription) -> Result<Subscription, NakadiError> {
        const CONTEXT: &str = "unable to create subscription";

        let response = self
            .raw
            .post_json(
                &self.sub_base_url(),
                subscription,
                HeaderMap::new(),
                self.backoff,
                CONTEXT,
            )
            .await?;

        let status = response.status();
        let buffer = response
            .bytes()
            .await
            .map_err(|source| NakadiError::ReadBody {
                context: CONTEXT,
                source,
            })?;
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(error::decode_broker_error(CONTEXT, status.as_u16(), &buffer));
        }

        serde_json::from_slice(&buffer).map_err(|source| NakadiError::DecodeBody {
            context: CONTEXT,
            source,
        })
    }

    /// Remove an existing subscription.
    pub async fn delete(&self, id: &str) -> Result<(), NakadiError> {
        self.raw
            .delete(&self.sub_url(id), self.backoff, "unable to delete subscription")
            .await
    }

    /// Statistic information for a subscription: per event type, the
    /// partitions with their state, lag and assigned stream id.
    pub async fn stats(&self, id: &str) -> Result<Vec<SubscriptionStats>, NakadiError> {
        let url = format!("{}/stats", self.sub_url(id));
        let envelope: ItemsEnvelope<SubscriptionStats> = self
            .raw
            .get_json(&url, self.backoff, "unable to get stats for subscription")
            .await?;
        Ok(envelope.items)
    }

    fn sub_base_url(&self) -> String {
        format!("{}/subscriptions", self.raw.base_url())
    }

    fn sub_url(&self, id: &str) -> String {
        format!("{}/subscriptions/{}", self.raw.base_url(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nakadi_client_config::ClientConfigBuilder;

    fn api() -> SubscriptionApi {
        let config = ClientConfigBuilder::default()
            .base_url("http://localhost:8080")
            .build()
            .unwrap();
        SubscriptionApi::new(Arc::new(RawClient::new(&config)), &ApiOptions::default())
    }

    #[test]
    fn test_urls() {
        let api = api();
        assert_eq!(api.sub_base_url(), "http://localhost:8080/subscriptions");
        assert_eq!(
            api.sub_url("7d1047ad"),
            "http://localhost:8080/subscriptions/7d1047ad"
        );
    }

    #[test]
    fn test_items_envelope_decodes() {
        let body = r#"{"items": [{"owning_application": "order-service",
                                  "event_types": ["order.ORDER_RECEIVED"]}]}"#;
        let envelope: ItemsEnvelope<Subscription> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.items[0].owning_application, "order-service");
    }
}
