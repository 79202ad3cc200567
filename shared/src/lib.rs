//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Shared wire and domain types of the Nakadi client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A read position within one partition of one event type.
///
/// Cursors are produced by a subscription stream and must be committed
/// against the very stream instance that produced them: the transient
/// `stream_id` is never part of the serialized cursor but travels in the
/// `X-Nakadi-StreamId` header of the commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub partition: String,
    pub offset: String,
    pub event_type: String,
    pub cursor_token: String,
    /// Identifier of the stream this cursor was read from.
    #[serde(skip)]
    pub stream_id: String,
}

/// The meta information which comes along with all Nakadi events. For
/// publishing purposes only `eid` and `occurred_at` must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub eid: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_eids: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_ctx: Option<HashMap<String, String>>,
}

impl EventMetadata {
    /// Metadata with a fresh random `eid`, occurred now.
    pub fn new() -> Self {
        EventMetadata {
            eid: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type: None,
            partition: None,
            parent_eids: None,
            flow_id: None,
            received_at: None,
            span_ctx: None,
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        EventMetadata::new()
    }
}

/// An event from the category "undefined": metadata plus a free payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndefinedEvent {
    pub metadata: EventMetadata,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// An event from the category "business": metadata plus domain fields at
/// the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessEvent {
    pub metadata: EventMetadata,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// The operation that produced a data change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOp {
    Create,
    Update,
    Delete,
    Snapshot,
}

/// An event from the category "data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeEvent {
    pub metadata: EventMetadata,
    pub data: serde_json::Value,
    pub data_op: DataOp,
    pub data_type: String,
}

/// The category of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Undefined,
    Business,
    Data,
}

/// A non optional description of the schema of an event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypeSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub schema_type: String,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Operational statistics used by the broker to optimize throughput for an
/// event type. Provided on event type creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeStatistics {
    pub messages_per_minute: u64,
    pub message_size: u64,
    pub read_parallelism: u64,
    pub write_parallelism: u64,
}

/// Additional parameters for tuning an event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeOptions {
    pub retention_time: i64,
}

/// A record granting one attribute holder access to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationAttribute {
    pub data_type: String,
    pub value: String,
}

/// Per-operation access control of an event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeAuthorization {
    pub admins: Vec<AuthorizationAttribute>,
    pub readers: Vec<AuthorizationAttribute>,
    pub writers: Vec<AuthorizationAttribute>,
}

/// A kind of event that can be processed on a Nakadi service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventType {
    pub name: String,
    pub owning_application: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_strategies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_mode: Option<String>,
    pub schema: EventTypeSchema,
    #[serde(default)]
    pub partition_key_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_statistics: Option<EventTypeStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<EventTypeOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<EventTypeAuthorization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Where a fresh subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFrom {
    Begin,
    End,
    Cursors,
}

/// Access control of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAuthorization {
    pub admins: Vec<AuthorizationAttribute>,
    pub readers: Vec<AuthorizationAttribute>,
}

/// A subscription as used by the Nakadi high level API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub owning_application: String,
    pub event_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_from: Option<ReadFrom>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<SubscriptionAuthorization>,
}

/// Statistic information for one partition of a subscribed event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unconsumed_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
}

/// Detailed statistics for one event type of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    pub event_type: String,
    pub partitions: Vec<PartitionStats>,
}

/// The publishing status of a single event within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishingStatus {
    Submitted,
    Failed,
    Aborted,
}

/// If a batch is only published partially, each batch item response
/// reports whether a single event was successfully published or not.
/// Events are correlated by `eid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eid: Option<Uuid>,
    pub publishing_status: PublishingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> EventMetadata {
        EventMetadata {
            eid: Uuid::parse_str("74450ab6-5461-11e7-9dd2-87c3afa8811f").unwrap(),
            occurred_at: "2017-06-20T08:38:00Z".parse().unwrap(),
            event_type: Some("order.ORDER_RECEIVED".to_string()),
            partition: None,
            parent_eids: None,
            flow_id: Some("X6dA3vLCSKKBVbvnqzs6".to_string()),
            received_at: None,
            span_ctx: None,
        }
    }

    #[test]
    fn test_cursor_stream_id_not_serialized() {
        let cursor = Cursor {
            partition: "0".to_string(),
            offset: "000000000012".to_string(),
            event_type: "order.ORDER_RECEIVED".to_string(),
            cursor_token: "b75c3102".to_string(),
            stream_id: "fa2a4a0e".to_string(),
        };

        let encoded = serde_json::to_value(&cursor).unwrap();
        assert!(encoded.get("stream_id").is_none());

        let decoded: Cursor = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.stream_id, "");
        assert_eq!(decoded.offset, cursor.offset);
    }

    #[test]
    fn test_undefined_event_roundtrip() {
        let mut payload = serde_json::Map::new();
        payload.insert("operation".to_string(), json!("add"));
        let event = UndefinedEvent {
            metadata: metadata(),
            payload,
        };

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: UndefinedEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_business_event_roundtrip() {
        let mut payload = serde_json::Map::new();
        payload.insert("order_number".to_string(), json!("24873243241"));
        let event = BusinessEvent {
            metadata: metadata(),
            payload,
        };

        let encoded = serde_json::to_value(&event).unwrap();
        // domain fields live at the top level, next to the metadata
        assert_eq!(encoded["order_number"], json!("24873243241"));

        let decoded: BusinessEvent = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_data_change_event_roundtrip() {
        let event = DataChangeEvent {
            metadata: metadata(),
            data: json!({"order_number": "24873243241"}),
            data_op: DataOp::Snapshot,
            data_type: "order".to_string(),
        };

        let encoded = serde_json::to_string(&event).unwrap();
        assert!(encoded.contains(r#""data_op":"snapshot""#));

        let decoded: DataChangeEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_subscription_roundtrip() {
        let subscription = Subscription {
            id: Some("7d1047ad".to_string()),
            owning_application: "order-service".to_string(),
            event_types: vec!["order.ORDER_RECEIVED".to_string()],
            consumer_group: Some("default".to_string()),
            read_from: Some(ReadFrom::End),
            created_at: Some("2017-06-20T08:38:00Z".parse().unwrap()),
            authorization: None,
        };

        let encoded = serde_json::to_string(&subscription).unwrap();
        assert!(encoded.contains(r#""read_from":"end""#));

        let decoded: Subscription = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, subscription);
    }

    #[test]
    fn test_batch_item_response_decodes_broker_payload() {
        let body = r#"[
            {"eid": "74450ab6-5461-11e7-9dd2-87c3afa8811f",
             "publishing_status": "failed",
             "step": "validating",
             "detail": "schema validation failed"},
            {"publishing_status": "aborted"}
        ]"#;

        let items: Vec<BatchItemResponse> = serde_json::from_str(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].publishing_status, PublishingStatus::Failed);
        assert_eq!(items[0].step.as_deref(), Some("validating"));
        assert_eq!(items[1].publishing_status, PublishingStatus::Aborted);
        assert!(items[1].eid.is_none());
    }

    #[test]
    fn test_subscription_stats_decodes() {
        let body = r#"{
            "event_type": "order.ORDER_RECEIVED",
            "partitions": [
                {"partition": "0", "state": "assigned",
                 "unconsumed_events": 42, "stream_id": "fa2a4a0e"}
            ]
        }"#;

        let stats: SubscriptionStats = serde_json::from_str(body).unwrap();
        assert_eq!(stats.partitions.len(), 1);
        assert_eq!(stats.partitions[0].unconsumed_events, Some(42));
        assert_eq!(stats.partitions[0].stream_id.as_deref(), Some("fa2a4a0e"));
    }
}
