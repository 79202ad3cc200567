//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use crate::error::NakadiError;
use crate::stream::committer::CursorCommitter;
use crate::stream::reader::{BatchReader, StreamOpener};
use crate::stream::StreamNotifier;
use async_trait::async_trait;
use bytes::Bytes;
use nakadi_client_retry::retry_async::retry_notify_async;
use nakadi_client_retry::retry_policy::RetryWithBackoff;
use nakadi_client_retry::retry_result::{RetryError, RetryResult};
use nakadi_client_shared::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the engine's event channel. Bounds how far the reader can
/// run ahead of the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 10;

type BatchResult = Result<(Cursor, Bytes), NakadiError>;

/// The consumer side of one subscription stream.
#[async_trait]
pub trait EventStream: Send {
    /// The next batch of events, in broker order.
    async fn next_events(&mut self) -> Result<(Cursor, Bytes), NakadiError>;
    /// Acknowledge one batch.
    async fn commit_cursor(&self, cursor: &Cursor) -> Result<(), NakadiError>;
    /// Terminate the stream.
    async fn close(&mut self) -> Result<(), NakadiError>;
}

/// A supervised, auto-reopening consumer of one subscription stream.
///
/// A background supervisor task owns the current [`BatchReader`]: it
/// opens the stream (retrying with the stream backoff), forwards every
/// real batch onto a bounded channel and reopens the stream whenever a
/// read fails. Keep-alive batches are suppressed. Read failures are also
/// forwarded, so `next_events` surfaces them while the supervisor is
/// already reconnecting.
///
/// Cancellation is cooperative: the token is checked before every read
/// and before every channel send. Once closed, `next_events` returns
/// [`NakadiError::Cancelled`].
pub struct SubscriptionStream {
    receiver: mpsc::Receiver<BatchResult>,
    committer: Arc<dyn CursorCommitter>,
    commit_backoff: RetryWithBackoff,
    notifier: Arc<dyn StreamNotifier>,
    token: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl SubscriptionStream {
    /// Spawn the supervisor on `handle` and hand out the consumer side.
    pub(crate) fn start(
        opener: Arc<dyn StreamOpener>,
        committer: Arc<dyn CursorCommitter>,
        stream_backoff: RetryWithBackoff,
        commit_backoff: RetryWithBackoff,
        notifier: Arc<dyn StreamNotifier>,
        handle: &Handle,
    ) -> SubscriptionStream {
        let token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let supervisor = handle.spawn(supervise(
            opener,
            sender,
            token.clone(),
            stream_backoff,
            notifier.clone(),
        ));
        SubscriptionStream {
            receiver,
            committer,
            commit_backoff,
            notifier,
            token,
            supervisor: Some(supervisor),
        }
    }

    /// The next batch of events, in broker order. Blocks until a batch
    /// arrives, the stream fails transiently (the failure is returned and
    /// the stream reopens on its own), or the stream is closed.
    pub async fn next_events(&mut self) -> Result<(Cursor, Bytes), NakadiError> {
        if self.token.is_cancelled() {
            return Err(NakadiError::Cancelled);
        }
        tokio::select! {
            _ = self.token.cancelled() => Err(NakadiError::Cancelled),
            item = self.receiver.recv() => match item {
                Some(result) => result,
                None => Err(NakadiError::Cancelled),
            },
        }
    }

    /// Commit one cursor on the caller's task, retrying with the commit
    /// backoff. The notifier fires for every retry and on the first
    /// success after a failure. A commit racing with stream recycling is
    /// rejected by the broker, because the request carries the stream id
    /// the cursor was read under; that rejection is surfaced verbatim.
    pub async fn commit_cursor(&self, cursor: &Cursor) -> Result<(), NakadiError> {
        let mut had_error = false;
        let committer = self.committer.clone();
        let notifier = self.notifier.clone();

        let commit = retry_notify_async(
            self.commit_backoff,
            || {
                let committer = committer.clone();
                async move {
                    match committer.commit_cursor(cursor).await {
                        Ok(()) => RetryResult::Success(()),
                        Err(err) if err.is_permanent() => RetryResult::Fail(err),
                        Err(err) => RetryResult::Retry(err),
                    }
                }
            },
            |err, next_wait| {
                had_error = true;
                notifier.notify_error(err, next_wait);
            },
        );

        let result = tokio::select! {
            _ = self.token.cancelled() => return Err(NakadiError::Cancelled),
            result = commit => result,
        };

        match result {
            Ok(()) => {
                if had_error {
                    self.notifier.notify_ok();
                }
                Ok(())
            }
            Err(RetryError { error, .. }) => Err(error),
        }
    }

    /// Cancel the supervisor and wait for it to wind down. A batch that
    /// is already queued may still be delivered to a concurrent
    /// `next_events` call; afterwards `next_events` returns cancellation.
    pub async fn close(&mut self) -> Result<(), NakadiError> {
        self.token.cancel();
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.await.map_err(|err| NakadiError::Internal {
                msg: format!("stream supervisor failed: {}", err),
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventStream for SubscriptionStream {
    async fn next_events(&mut self) -> Result<(Cursor, Bytes), NakadiError> {
        SubscriptionStream::next_events(self).await
    }

    async fn commit_cursor(&self, cursor: &Cursor) -> Result<(), NakadiError> {
        SubscriptionStream::commit_cursor(self, cursor).await
    }

    async fn close(&mut self) -> Result<(), NakadiError> {
        SubscriptionStream::close(self).await
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The supervisor loop. Owns the current reader; exits only on
/// cancellation. Dropping the sender on exit closes the channel, so the
/// channel closes exactly on terminal cancellation and stays open across
/// transient reader failures.
async fn supervise(
    opener: Arc<dyn StreamOpener>,
    sender: mpsc::Sender<BatchResult>,
    token: CancellationToken,
    stream_backoff: RetryWithBackoff,
    notifier: Arc<dyn StreamNotifier>,
) {
    info!("starting stream supervisor");
    'supervise: while !token.is_cancelled() {
        let mut reader =
            match open_with_retry(&*opener, &sender, &token, stream_backoff, &*notifier).await {
                Some(reader) => reader,
                None => break,
            };

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => {
                    reader.close();
                    break 'supervise;
                }
                next = reader.next_batch() => next,
            };

            match next {
                Ok((cursor, Some(events))) => {
                    let delivered = tokio::select! {
                        _ = token.cancelled() => false,
                        sent = sender.send(Ok((cursor, events))) => sent.is_ok(),
                    };
                    if !delivered {
                        reader.close();
                        break 'supervise;
                    }
                }
                Ok((_, None)) => {
                    // keep-alive, not delivered upstream
                }
                Err(err) if err.is_cancelled() => {
                    reader.close();
                    break 'supervise;
                }
                Err(err) => {
                    reader.close();
                    warn!(error = %err, "stream failed, reopening");
                    if sender.send(Err(err)).await.is_err() {
                        break 'supervise;
                    }
                    break;
                }
            }
        }
    }
    info!("stream supervisor terminated");
}

/// Open a stream, retrying with the backoff schedule until it succeeds or
/// the token is cancelled. When a schedule runs out of delays the last
/// error is surfaced on the channel and a fresh schedule starts.
async fn open_with_retry(
    opener: &dyn StreamOpener,
    sender: &mpsc::Sender<BatchResult>,
    token: &CancellationToken,
    stream_backoff: RetryWithBackoff,
    notifier: &dyn StreamNotifier,
) -> Option<Box<dyn BatchReader>> {
    loop {
        // a copy of the policy is a freshly reset schedule
        let mut schedule = stream_backoff;
        let mut had_error = false;
        loop {
            if token.is_cancelled() {
                return None;
            }
            let attempt = tokio::select! {
                _ = token.cancelled() => return None,
                attempt = opener.open_stream() => attempt,
            };
            match attempt {
                Ok(reader) => {
                    if had_error {
                        notifier.notify_ok();
                    }
                    return Some(reader);
                }
                Err(err) => {
                    had_error = true;
                    match schedule.next() {
                        Some(delay) => {
                            notifier.notify_error(&err, delay);
                            debug!(error = %err, ?delay, "failed to open stream, backing off");
                            tokio::select! {
                                _ = token.cancelled() => return None,
                                _ = sleep(delay) => {}
                            }
                        }
                        None => {
                            notifier.notify_error(&err, Duration::ZERO);
                            warn!(error = %err, "failed to open stream, surfacing the failure");
                            if sender.send(Err(err)).await.is_err() {
                                return None;
                            }
                            break;
                        }
                    }
                }
            }
        }
    }
}
