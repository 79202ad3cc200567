//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use crate::batcher::PublishBatcher;
use crate::event_types::EventTypeApi;
use crate::processor::{HttpStreamFactory, Processor, ProcessorNotifier};
use crate::publish::PublishApi;
use crate::raw_client::RawClient;
use crate::stream::{
    CursorCommitter, HttpCursorCommitter, HttpStreamOpener, StreamNotifier, StreamOpener,
    SubscriptionStream,
};
use crate::subscriptions::SubscriptionApi;
use nakadi_client_config::{ApiOptions, BatcherOptions, ClientConfig, ProcessorOptions, StreamOptions};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};

/// Applications should use ClientFactory to create resources they need.
///
/// The factory holds the shared HTTP transport and a tokio runtime that
/// runs all background tasks: stream supervisors, processor workers and
/// the publish dispatcher.
///
/// # Examples
///
/// ```no_run
/// use nakadi_client::client_factory::ClientFactory;
/// use nakadi_client_config::{ApiOptions, ClientConfigBuilder};
/// use nakadi_client_shared::{DataChangeEvent, DataOp, EventMetadata};
///
/// #[tokio::main]
/// async fn main() {
///     let config = ClientConfigBuilder::default()
///         .base_url("http://localhost:8080")
///         .build()
///         .expect("creating config");
///
///     let client_factory = ClientFactory::new(config);
///     let publish = client_factory.create_publish_api("order.ORDER_RECEIVED", &ApiOptions::default());
///
///     let event = DataChangeEvent {
///         metadata: EventMetadata::new(),
///         data: serde_json::json!({"order_number": "24873243241"}),
///         data_op: DataOp::Create,
///         data_type: "order".to_string(),
///     };
///     publish.publish_data_change(&[event]).await.expect("publish event");
/// }
/// ```
pub struct ClientFactory(Arc<ClientFactoryInternal>);

struct ClientFactoryInternal {
    raw: Arc<RawClient>,
    runtime: Runtime,
}

impl ClientFactory {
    pub fn new(config: ClientConfig) -> ClientFactory {
        let runtime = Runtime::new().expect("create runtime");
        let raw = Arc::new(RawClient::new(&config));
        ClientFactory(Arc::new(ClientFactoryInternal { raw, runtime }))
    }

    /// An API for inspecting and managing event types.
    pub fn create_event_type_api(&self, options: &ApiOptions) -> EventTypeApi {
        EventTypeApi::new(self.0.raw.clone(), options)
    }

    /// An API for managing subscriptions.
    pub fn create_subscription_api(&self, options: &ApiOptions) -> SubscriptionApi {
        SubscriptionApi::new(self.0.raw.clone(), options)
    }

    /// An API publishing batches to one event type.
    pub fn create_publish_api(&self, event_type: &str, options: &ApiOptions) -> PublishApi {
        PublishApi::new(self.0.raw.clone(), event_type, options)
    }

    /// A batcher coalescing concurrent single-event submissions into
    /// batched publishes against one event type.
    pub fn create_publish_batcher(
        &self,
        event_type: &str,
        api_options: &ApiOptions,
        batcher_options: &BatcherOptions,
    ) -> PublishBatcher {
        let api = Arc::new(self.create_publish_api(event_type, api_options));
        PublishBatcher::start(api, batcher_options, &self.runtime_handle())
    }

    /// A supervised stream consuming one subscription.
    pub fn create_subscription_stream(
        &self,
        subscription_id: &str,
        options: &StreamOptions,
        notifier: Arc<dyn StreamNotifier>,
    ) -> SubscriptionStream {
        let opener: Arc<dyn StreamOpener> = Arc::new(HttpStreamOpener::new(
            self.0.raw.clone(),
            subscription_id.to_string(),
            *options,
        ));
        let committer: Arc<dyn CursorCommitter> =
            Arc::new(HttpCursorCommitter::new(self.0.raw.clone(), subscription_id));
        SubscriptionStream::start(
            opener,
            committer,
            options.stream_backoff(),
            options.commit_backoff(),
            notifier,
            &self.runtime_handle(),
        )
    }

    /// A processor multiplexing several streams of one subscription into
    /// a single operation.
    pub fn create_processor(
        &self,
        subscription_id: &str,
        options: &ProcessorOptions,
        notifier: Arc<dyn ProcessorNotifier>,
    ) -> Processor {
        let factory = Arc::new(HttpStreamFactory::new(
            self.0.raw.clone(),
            subscription_id.to_string(),
            options.stream_options(),
            notifier.clone(),
            self.runtime_handle(),
        ));
        Processor::new(factory, notifier, options, self.runtime_handle())
    }

    /// The handle of the factory runtime. The handle is internally
    /// reference counted and can be cloned.
    pub fn runtime_handle(&self) -> Handle {
        self.0.runtime.handle().clone()
    }
}

impl Clone for ClientFactory {
    fn clone(&self) -> ClientFactory {
        ClientFactory(self.0.clone())
    }
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory")
            .field("raw_client", &self.0.raw)
            .finish()
    }
}
