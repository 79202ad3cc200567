//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Configuration for the Nakadi client and its sub APIs.
//!
//! Every option struct comes with a builder and sensible defaults, so
//! most callers only set the values they care about:
//!
//! ```
//! use nakadi_client_config::ClientConfigBuilder;
//!
//! let config = ClientConfigBuilder::default()
//!     .base_url("http://localhost:8080")
//!     .build()
//!     .expect("creating config");
//! assert_eq!(config.base_url(), "http://localhost:8080");
//! ```

use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use nakadi_client_auth::TokenProvider;
use nakadi_client_retry::retry_policy::RetryWithBackoff;
use std::sync::Arc;
use std::time::Duration;

/// A basic configuration to access a Nakadi instance. The client config is
/// shared by all sub APIs created from one client factory.
#[derive(Builder, Debug, Getters, CopyGetters, Clone)]
#[builder(setter(into))]
pub struct ClientConfig {
    /// Base URL of the Nakadi instance, e.g. `http://localhost:8080`.
    #[get = "pub"]
    pub base_url: String,

    /// Timeout applied to plain (non-streaming) requests and to the
    /// connect phase of stream requests.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(30)")]
    pub connection_timeout: Duration,

    /// Optional token provider. When set, every request carries
    /// `Authorization: Bearer <token>`.
    #[get = "pub"]
    #[builder(default)]
    pub token_provider: Option<Arc<dyn TokenProvider>>,
}

/// Retry behavior of the event type, subscription and publish APIs.
#[derive(Builder, Debug, Getters, CopyGetters, Clone, Copy)]
#[builder(setter(into))]
pub struct ApiOptions {
    /// Whether failed requests are retried with exponential backoff.
    #[get_copy = "pub"]
    #[builder(default = "false")]
    pub retry: bool,

    /// The initial (minimal) retry interval used for the exponential
    /// backoff algorithm.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_millis(10)")]
    pub initial_retry_interval: Duration,

    /// The maximum retry interval. Once the exponential backoff reaches
    /// this value the retry intervals remain constant.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(10)")]
    pub max_retry_interval: Duration,

    /// The maximum time spent on retries. Once this value is reached the
    /// backoff is halted and the request fails with the last error.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(30)")]
    pub max_elapsed_time: Duration,
}

impl Default for ApiOptions {
    fn default() -> Self {
        ApiOptionsBuilder::default().build().expect("default api options")
    }
}

impl ApiOptions {
    /// The backoff schedule for one request.
    pub fn backoff(&self) -> RetryWithBackoff {
        if self.retry {
            RetryWithBackoff::default()
                .initial_delay(self.initial_retry_interval)
                .max_delay(self.max_retry_interval)
                .max_elapsed(self.max_elapsed_time)
        } else {
            RetryWithBackoff::no_retry()
        }
    }
}

/// Options for a single subscription stream.
#[derive(Builder, Debug, Getters, CopyGetters, Clone, Copy)]
#[builder(setter(into))]
pub struct StreamOptions {
    /// Maximum number of events in each batch. 0 leaves the choice to the
    /// broker and omits the query parameter.
    #[get_copy = "pub"]
    #[builder(default = "0")]
    pub batch_limit: u32,

    /// Maximum time the broker waits before flushing a partial batch.
    /// This is also the broker's heartbeat interval: the stream watchdog
    /// allows twice this duration per read.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(30)")]
    pub batch_flush_timeout: Duration,

    /// The amount of uncommitted events the broker will stream before
    /// pausing the stream until a commit arrives.
    #[get_copy = "pub"]
    #[builder(default = "10")]
    pub max_uncommitted_events: u32,

    /// The initial retry interval used when (re)opening the stream.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_millis(10)")]
    pub initial_retry_interval: Duration,

    /// The maximum retry interval used when (re)opening the stream.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(10)")]
    pub max_retry_interval: Duration,

    /// Whether cursor commits are retried with exponential backoff.
    #[get_copy = "pub"]
    #[builder(default = "false")]
    pub commit_retry: bool,

    /// The maximum time spent retrying one cursor commit.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(30)")]
    pub commit_max_elapsed_time: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptionsBuilder::default().build().expect("default stream options")
    }
}

impl StreamOptions {
    /// The schedule used to reopen a failed stream. Opening is retried
    /// until it succeeds or the stream is closed.
    pub fn stream_backoff(&self) -> RetryWithBackoff {
        RetryWithBackoff::default()
            .initial_delay(self.initial_retry_interval)
            .max_delay(self.max_retry_interval)
            .unbounded_elapsed()
    }

    /// The schedule used for one cursor commit.
    pub fn commit_backoff(&self) -> RetryWithBackoff {
        if self.commit_retry {
            RetryWithBackoff::default()
                .initial_delay(self.initial_retry_interval)
                .max_delay(self.max_retry_interval)
                .max_elapsed(self.commit_max_elapsed_time)
        } else {
            RetryWithBackoff::no_retry()
        }
    }
}

/// Options for the parallel processor.
#[derive(Builder, Debug, Getters, CopyGetters, Clone, Copy)]
#[builder(setter(into))]
pub struct ProcessorOptions {
    /// The maximum number of events in each batch, per stream.
    #[get_copy = "pub"]
    #[builder(default = "1")]
    pub batch_limit: u32,

    /// Maximum time the broker waits before flushing a partial batch.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(30)")]
    pub batch_flush_timeout: Duration,

    /// The number of parallel streams used to consume events.
    #[get_copy = "pub"]
    #[builder(default = "1")]
    pub stream_count: u32,

    /// Upper bound on the number of events handled per minute, across all
    /// streams. 0 disables pacing entirely.
    #[get_copy = "pub"]
    #[builder(default = "0")]
    pub events_per_minute: u32,

    /// The amount of uncommitted events the broker will stream before
    /// pausing the stream until a commit arrives.
    #[get_copy = "pub"]
    #[builder(default = "10")]
    pub max_uncommitted_events: u32,

    /// The initial retry interval for stream reopening and commits.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_millis(10)")]
    pub initial_retry_interval: Duration,

    /// The maximum retry interval for stream reopening and commits.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(10)")]
    pub max_retry_interval: Duration,

    /// Whether cursor commits are retried with exponential backoff.
    #[get_copy = "pub"]
    #[builder(default = "true")]
    pub commit_retry: bool,

    /// The maximum time spent retrying one cursor commit.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(30)")]
    pub commit_max_elapsed_time: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        ProcessorOptionsBuilder::default()
            .build()
            .expect("default processor options")
    }
}

impl ProcessorOptions {
    /// The per-stream options of the underlying subscription streams.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            batch_limit: self.batch_limit,
            batch_flush_timeout: self.batch_flush_timeout,
            max_uncommitted_events: self.max_uncommitted_events,
            initial_retry_interval: self.initial_retry_interval,
            max_retry_interval: self.max_retry_interval,
            commit_retry: self.commit_retry,
            commit_max_elapsed_time: self.commit_max_elapsed_time,
        }
    }

    /// The time budget of one batch on one stream. Each processor worker
    /// sleeps the unused remainder of this budget per iteration, which
    /// caps the aggregate rate at `events_per_minute`.
    pub fn time_per_batch(&self) -> Duration {
        if self.events_per_minute == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(60) / self.events_per_minute * self.stream_count * self.batch_limit
    }
}

/// Options for the publish batcher.
#[derive(Builder, Debug, Getters, CopyGetters, Clone, Copy)]
#[builder(setter(into))]
pub struct BatcherOptions {
    /// How long a batch may collect events, measured from the enqueue time
    /// of its first event.
    #[get_copy = "pub"]
    #[builder(default = "Duration::from_secs(1)")]
    pub batch_collection_timeout: Duration,

    /// Maximum number of events in one coalesced batch.
    #[get_copy = "pub"]
    #[builder(default = "10")]
    pub max_batch_size: usize,

    /// Capacity of the coalescing queue. A full queue blocks further
    /// submissions until the dispatcher drains it.
    #[get_copy = "pub"]
    #[builder(default = "1000")]
    pub batch_queue_size: usize,
}

impl Default for BatcherOptions {
    fn default() -> Self {
        BatcherOptionsBuilder::default().build().expect("default batcher options")
    }
}
