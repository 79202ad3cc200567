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
use crate::raw_client::RawClient;
use crate::stream::{
    CursorCommitter, EventStream, HttpCursorCommitter, HttpStreamOpener, StreamNotifier,
    StreamOpener, SubscriptionStream,
};
use async_trait::async_trait;
use nakadi_client_config::{ProcessorOptions, StreamOptions};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A procedure that consumes event batches from a [`Processor`].
///
/// The operation receives the position of the stream within the
/// processor, the broker-assigned stream id, and the raw JSON array of
/// events. Returning an error halts the underlying stream; a fresh one
/// takes its slot and the batch is not committed.
#[async_trait]
pub trait BatchOperation: Send + Sync {
    async fn process(
        &self,
        stream_no: usize,
        stream_id: &str,
        events: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Health signal hooks of a processor, tagged with the stream number that
/// produced them.
pub trait ProcessorNotifier: Send + Sync {
    fn notify_error(&self, stream_no: usize, err: &NakadiError, next_wait: Duration);
    fn notify_ok(&self, stream_no: usize);
}

/// A notifier that drops all signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcessorNotifier;

impl ProcessorNotifier for NoopProcessorNotifier {
    fn notify_error(&self, _stream_no: usize, _err: &NakadiError, _next_wait: Duration) {}
    fn notify_ok(&self, _stream_no: usize) {}
}

/// Prefixes stream-level signals with the stream number.
struct StreamNumberNotifier {
    stream_no: usize,
    inner: Arc<dyn ProcessorNotifier>,
}

impl StreamNotifier for StreamNumberNotifier {
    fn notify_error(&self, err: &NakadiError, next_wait: Duration) {
        self.inner.notify_error(self.stream_no, err, next_wait);
    }

    fn notify_ok(&self) {
        self.inner.notify_ok(self.stream_no);
    }
}

/// Creates the streams a processor consumes; a seam for tests.
pub(crate) trait StreamFactory: Send + Sync {
    fn create(&self, stream_no: usize) -> Box<dyn EventStream>;
}

pub(crate) struct HttpStreamFactory {
    raw: Arc<RawClient>,
    subscription_id: String,
    options: StreamOptions,
    notifier: Arc<dyn ProcessorNotifier>,
    handle: Handle,
}

impl HttpStreamFactory {
    pub(crate) fn new(
        raw: Arc<RawClient>,
        subscription_id: String,
        options: StreamOptions,
        notifier: Arc<dyn ProcessorNotifier>,
        handle: Handle,
    ) -> Self {
        HttpStreamFactory {
            raw,
            subscription_id,
            options,
            notifier,
            handle,
        }
    }
}

impl StreamFactory for HttpStreamFactory {
    fn create(&self, stream_no: usize) -> Box<dyn EventStream> {
        let opener: Arc<dyn StreamOpener> = Arc::new(HttpStreamOpener::new(
            self.raw.clone(),
            self.subscription_id.clone(),
            self.options,
        ));
        let committer: Arc<dyn CursorCommitter> =
            Arc::new(HttpCursorCommitter::new(self.raw.clone(), &self.subscription_id));
        let notifier = Arc::new(StreamNumberNotifier {
            stream_no,
            inner: self.notifier.clone(),
        });
        Box::new(SubscriptionStream::start(
            opener,
            committer,
            self.options.stream_backoff(),
            self.options.commit_backoff(),
            notifier,
            &self.handle,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessorState {
    Created,
    Running,
    Stopped,
}

/// A high level consumer of a subscription.
///
/// The processor runs `stream_count` subscription streams in parallel and
/// dispatches every batch to one operation. Cursors of successfully
/// processed batches are committed automatically; a failing operation
/// recycles its stream. When `events_per_minute` is set, each worker
/// paces itself to its share of the budget.
///
/// Commits stay adjacent to their producing stream on purpose: funneling
/// all streams through one shared work queue would break per-partition
/// ordering.
pub struct Processor {
    state: Mutex<ProcessorState>,
    factory: Arc<dyn StreamFactory>,
    notifier: Arc<dyn ProcessorNotifier>,
    stream_count: usize,
    time_per_batch: Duration,
    token: CancellationToken,
    close_sender: mpsc::Sender<Result<(), NakadiError>>,
    close_results: AsyncMutex<mpsc::Receiver<Result<(), NakadiError>>>,
    handle: Handle,
}

impl Processor {
    pub(crate) fn new(
        factory: Arc<dyn StreamFactory>,
        notifier: Arc<dyn ProcessorNotifier>,
        options: &ProcessorOptions,
        handle: Handle,
    ) -> Processor {
        let stream_count = options.stream_count().max(1) as usize;
        let (close_sender, close_receiver) = mpsc::channel(stream_count);
        Processor {
            state: Mutex::new(ProcessorState::Created),
            factory,
            notifier,
            stream_count,
            time_per_batch: options.time_per_batch(),
            token: CancellationToken::new(),
            close_sender,
            close_results: AsyncMutex::new(close_receiver),
            handle,
        }
    }

    /// Begin event processing. Fails when the processor is already
    /// running or was stopped before; a processor runs exactly once.
    pub fn start(&self, operation: Arc<dyn BatchOperation>) -> Result<(), NakadiError> {
        {
            let mut state = self.state.lock().expect("processor state lock");
            if *state != ProcessorState::Created {
                return Err(NakadiError::AlreadyStarted);
            }
            *state = ProcessorState::Running;
        }

        info!(streams = self.stream_count, "starting processor");
        for stream_no in 0..self.stream_count {
            self.handle.spawn(run_worker(
                self.factory.clone(),
                operation.clone(),
                stream_no,
                self.token.clone(),
                self.time_per_batch,
                self.close_sender.clone(),
                self.notifier.clone(),
            ));
        }
        Ok(())
    }

    /// Halt all streams and terminate event processing. Waits for every
    /// stream's close result exactly once; close failures are aggregated
    /// into a count-bearing error. Fails when the processor is not
    /// running.
    pub async fn stop(&self) -> Result<(), NakadiError> {
        {
            let mut state = self.state.lock().expect("processor state lock");
            if *state != ProcessorState::Running {
                return Err(NakadiError::NotRunning);
            }
            *state = ProcessorState::Stopped;
        }

        info!("stopping processor");
        self.token.cancel();

        let mut failures = 0;
        let mut results = self.close_results.lock().await;
        for _ in 0..self.stream_count {
            match results.recv().await {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "stream failed to close");
                    failures += 1;
                }
                None => break,
            }
        }

        if failures > 0 {
            Err(NakadiError::StreamCloseFailures { count: failures })
        } else {
            Ok(())
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// One worker: consumes one stream slot until the processor stops.
async fn run_worker(
    factory: Arc<dyn StreamFactory>,
    operation: Arc<dyn BatchOperation>,
    stream_no: usize,
    token: CancellationToken,
    time_per_batch: Duration,
    close_sender: mpsc::Sender<Result<(), NakadiError>>,
    notifier: Arc<dyn ProcessorNotifier>,
) {
    let mut stream = factory.create(stream_no);

    // desynchronize the paced streams with a random initial offset
    if time_per_batch > Duration::ZERO {
        let nanos = rand::thread_rng().gen_range(0..time_per_batch.as_nanos() as u64);
        tokio::select! {
            _ = token.cancelled() => {
                let _ = close_sender.send(stream.close().await).await;
                return;
            }
            _ = sleep(Duration::from_nanos(nanos)) => {}
        }
    }

    loop {
        if token.is_cancelled() {
            let _ = close_sender.send(stream.close().await).await;
            return;
        }

        let start = Instant::now();
        let next = tokio::select! {
            _ = token.cancelled() => continue,
            next = stream.next_events() => next,
        };
        match next {
            // the stream reopens on its own and has already notified
            Err(_) => continue,
            Ok((cursor, events)) => {
                match operation.process(stream_no, &cursor.stream_id, &events).await {
                    Ok(()) => {
                        if let Err(err) = stream.commit_cursor(&cursor).await {
                            warn!(stream_no, error = %err, "failed to commit cursor");
                        }
                    }
                    Err(err) => {
                        warn!(stream_no, error = %err, "operation failed, recycling stream");
                        if let Err(err) = stream.close().await {
                            notifier.notify_error(stream_no, &err, Duration::ZERO);
                        }
                        stream = factory.create(stream_no);
                        continue;
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        if time_per_batch > elapsed {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(time_per_batch - elapsed) => {}
            }
        }
    }
}
