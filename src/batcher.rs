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
use crate::publish::EventPublisher;
use nakadi_client_config::BatcherOptions;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error};

const CONTEXT: &str = "unable to publish events";

/// The result every caller of one coalesced batch receives. The broker
/// answers once per batch, so the error is shared.
pub type SharedPublishResult = Result<(), Arc<NakadiError>>;

struct PendingPublish {
    enqueued_at: Instant,
    event: serde_json::Value,
    result: oneshot::Sender<SharedPublishResult>,
}

/// Turns many concurrent single-event submissions into few batched
/// broker requests.
///
/// [`publish`] enqueues one event into a bounded coalescing queue and
/// blocks until the batch containing it completes; the batch result is
/// fanned back to every participating caller. Batches are bounded in
/// size (`max_batch_size`) and in age (`batch_collection_timeout`,
/// measured from the first event's submission). A full queue blocks
/// further submissions, propagating backpressure to publishers.
///
/// [`publish_batch`] bypasses coalescing: a pre-formed batch is
/// published immediately in the calling context and never mingles with
/// coalesced events.
///
/// [`publish`]: PublishBatcher::publish
/// [`publish_batch`]: PublishBatcher::publish_batch
pub struct PublishBatcher {
    sender: Mutex<Option<mpsc::Sender<PendingPublish>>>,
    publisher: Arc<dyn EventPublisher>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PublishBatcher {
    pub(crate) fn start(
        publisher: Arc<dyn EventPublisher>,
        options: &BatcherOptions,
        handle: &Handle,
    ) -> PublishBatcher {
        let (sender, receiver) = mpsc::channel(options.batch_queue_size());
        let dispatcher = handle.spawn(dispatch(
            receiver,
            publisher.clone(),
            options.batch_collection_timeout(),
            options.max_batch_size(),
        ));
        PublishBatcher {
            sender: Mutex::new(Some(sender)),
            publisher,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Publish one event as part of a coalesced batch. Blocks until the
    /// batch completes publication.
    pub async fn publish<T: Serialize>(&self, event: &T) -> SharedPublishResult {
        let event = serde_json::to_value(event).map_err(|source| {
            Arc::new(NakadiError::EncodeBody {
                context: CONTEXT,
                source,
            })
        })?;
        let sender = match self.sender.lock().expect("batcher queue lock").clone() {
            Some(sender) => sender,
            None => return Err(Arc::new(NakadiError::Cancelled)),
        };
        let (result_sender, result_receiver) = oneshot::channel();
        let pending = PendingPublish {
            enqueued_at: Instant::now(),
            event,
            result: result_sender,
        };
        if sender.send(pending).await.is_err() {
            return Err(Arc::new(NakadiError::Cancelled));
        }
        // the queue must close once the batcher drops its sender, even
        // while callers are still waiting for their results
        drop(sender);
        match result_receiver.await {
            Ok(result) => result,
            Err(_closed) => Err(Arc::new(NakadiError::Cancelled)),
        }
    }

    /// Publish a pre-formed batch immediately in the calling context,
    /// forwarding it verbatim.
    pub async fn publish_batch<T: Serialize>(&self, events: &[T]) -> Result<(), NakadiError> {
        let values = events
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| NakadiError::EncodeBody {
                context: CONTEXT,
                source,
            })?;
        self.publisher.publish_events(values).await
    }

    /// Close the coalescing queue and wait for the dispatcher to exit.
    /// A pending batch is flushed first. Closing twice is a no-op.
    pub async fn close(&self) {
        drop(self.sender.lock().expect("batcher queue lock").take());
        let dispatcher = self.dispatcher.lock().expect("batcher dispatcher lock").take();
        if let Some(dispatcher) = dispatcher {
            if let Err(err) = dispatcher.await {
                error!(error = %err, "publish dispatcher failed");
            }
        }
    }
}

/// The dispatcher: collects queued events into `(current_batch,
/// deadline)` state and flushes on size, on deadline, or on queue close.
/// Flushes run sequentially; batch k completes before batch k+1 begins.
async fn dispatch(
    mut receiver: mpsc::Receiver<PendingPublish>,
    publisher: Arc<dyn EventPublisher>,
    collection_timeout: Duration,
    max_batch_size: usize,
) {
    debug!("starting publish dispatcher");
    let mut batch: Vec<PendingPublish> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        if batch.is_empty() {
            match receiver.recv().await {
                Some(event) => {
                    deadline = Some(event.enqueued_at + collection_timeout);
                    batch.push(event);
                }
                None => break,
            }
        } else if batch.len() >= max_batch_size {
            flush(&mut batch, &*publisher).await;
            deadline = None;
        } else {
            let flush_at = deadline.expect("deadline is armed with the first event");
            tokio::select! {
                _ = sleep_until(flush_at) => {
                    flush(&mut batch, &*publisher).await;
                    deadline = None;
                }
                event = receiver.recv() => match event {
                    Some(event) => batch.push(event),
                    None => break,
                },
            }
        }
    }

    flush(&mut batch, &*publisher).await;
    debug!("publish dispatcher terminated");
}

/// Publish one collected batch and fan the shared result out to every
/// participating caller. An empty flush is a no-op.
async fn flush(batch: &mut Vec<PendingPublish>, publisher: &dyn EventPublisher) {
    if batch.is_empty() {
        return;
    }
    let pending = std::mem::take(batch);
    let (events, callers): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .map(|entry| (entry.event, entry.result))
        .unzip();

    debug!(events = events.len(), "publishing coalesced batch");
    let result = publisher.publish_events(events).await.map_err(Arc::new);
    for caller in callers {
        // a caller that gave up on its result is fine
        let _ = caller.send(result.clone());
    }
}
