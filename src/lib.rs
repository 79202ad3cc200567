//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! A client library for the Nakadi event broker.
//!
//! The crate provides convenient access to Nakadi's API: managing event
//! type definitions and subscriptions, publishing events, and processing
//! events on top of the subscription based high level API.
//!
//! * [`client_factory::ClientFactory`] is the entry point; it owns the
//!   HTTP transport and the runtime for all background tasks.
//! * [`event_types::EventTypeApi`] and [`subscriptions::SubscriptionApi`]
//!   cover the CRUD surfaces.
//! * [`publish::PublishApi`] emits batches;
//!   [`batcher::PublishBatcher`] coalesces concurrent single-event
//!   submissions into size- and age-bounded batches.
//! * [`stream::SubscriptionStream`] is a supervised, auto-reopening
//!   consumer of one subscription stream;
//!   [`processor::Processor`] multiplexes several of them into one
//!   operation with automatic cursor commits.
//!
//! All sub APIs can be configured to retry failed requests with an
//! exponential backoff.

pub mod batcher;
pub mod client_factory;
pub mod error;
pub mod event_types;
pub mod processor;
pub mod publish;
pub mod stream;
pub mod subscriptions;

mod raw_client;
