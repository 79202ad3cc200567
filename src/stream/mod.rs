//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Consuming a Nakadi subscription stream.
//!
//! The module is split along small capability contracts so tests can
//! substitute mocks: a [`StreamOpener`] produces a [`BatchReader`] for one
//! physical stream, a [`CursorCommitter`] acknowledges processed batches,
//! and [`SubscriptionStream`] supervises the reader lifecycle behind a
//! blocking `next_events`/`commit_cursor` API.

mod committer;
mod engine;
mod reader;

pub use committer::CursorCommitter;
pub use engine::{EventStream, SubscriptionStream};
pub use reader::{BatchReader, StreamOpener};

pub(crate) use committer::HttpCursorCommitter;
pub(crate) use reader::HttpStreamOpener;

use crate::error::NakadiError;
use std::time::Duration;

/// Health signal hooks of a subscription stream.
///
/// `notify_error` is invoked for every failed attempt together with the
/// upcoming backoff delay; `notify_ok` is invoked on the first success
/// after one or more failures. These hooks are the library's only health
/// signal and must not block meaningfully.
pub trait StreamNotifier: Send + Sync {
    fn notify_error(&self, err: &NakadiError, next_wait: Duration);
    fn notify_ok(&self);
}

/// A notifier that drops all signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl StreamNotifier for NoopNotifier {
    fn notify_error(&self, _err: &NakadiError, _next_wait: Duration) {}
    fn notify_ok(&self) {}
}
