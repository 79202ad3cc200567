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
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use nakadi_client_config::StreamOptions;
use nakadi_client_shared::Cursor;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// The response header carrying the broker-assigned stream identity.
pub(crate) const STREAM_ID_HEADER: &str = "X-Nakadi-StreamId";

/// Reads batches from one open physical stream.
#[async_trait]
pub trait BatchReader: Send {
    /// Read the next newline-delimited batch. The returned cursor is
    /// stamped with the identity of the stream it was read from;
    /// keep-alive batches yield `None` events.
    async fn next_batch(&mut self) -> Result<(Cursor, Option<Bytes>), NakadiError>;

    /// Close the underlying stream. Idempotent; subsequent reads fail
    /// with "stream is closed".
    fn close(&mut self);
}

/// Opens one physical stream against the broker.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open_stream(&self) -> Result<Box<dyn BatchReader>, NakadiError>;
}

/// One line of the stream body.
#[derive(Deserialize)]
struct BatchLine {
    cursor: Cursor,
    #[serde(default)]
    events: Option<Box<RawValue>>,
}

pub(crate) type BodyStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Opens `GET /subscriptions/{id}/events` and wraps the chunked response
/// body into an [`HttpBatchReader`].
pub(crate) struct HttpStreamOpener {
    raw: Arc<RawClient>,
    subscription_id: String,
    options: StreamOptions,
}

impl HttpStreamOpener {
    pub(crate) fn new(raw: Arc<RawClient>, subscription_id: String, options: StreamOptions) -> Self {
        HttpStreamOpener {
            raw,
            subscription_id,
            options,
        }
    }
}

#[async_trait]
impl StreamOpener for HttpStreamOpener {
    async fn open_stream(&self) -> Result<Box<dyn BatchReader>, NakadiError> {
        const CONTEXT: &str = "unable to open stream";

        let url = stream_url(self.raw.base_url(), &self.subscription_id, &self.options);
        let mut request = self.raw.stream_client().get(&url);
        if let Some(token) = self.raw.bearer_token(CONTEXT).await? {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|source| NakadiError::Transport {
                context: CONTEXT,
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let buffer = response
                .bytes()
                .await
                .map_err(|source| NakadiError::ReadBody {
                    context: CONTEXT,
                    source,
                })?;
            return Err(error::decode_broker_error(CONTEXT, status.as_u16(), &buffer));
        }

        let stream_id = response
            .headers()
            .get(STREAM_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        debug!(%stream_id, subscription_id = %self.subscription_id, "opened subscription stream");

        // the broker sends a batch at least every flush timeout, so a
        // read that takes twice that long means the connection is dead
        let read_timeout = 2 * self.options.batch_flush_timeout();
        Ok(Box::new(HttpBatchReader::new(
            stream_id,
            response.bytes_stream().boxed(),
            read_timeout,
        )))
    }
}

/// Build the stream URL; query parameters with zero values are omitted.
fn stream_url(base_url: &str, subscription_id: &str, options: &StreamOptions) -> String {
    let mut url = format!("{}/subscriptions/{}/events", base_url, subscription_id);
    let mut params = Vec::new();
    if options.batch_limit() > 0 {
        params.push(format!("batch_limit={}", options.batch_limit()));
    }
    if options.batch_flush_timeout() > Duration::ZERO {
        params.push(format!(
            "batch_flush_timeout={}",
            options.batch_flush_timeout().as_secs()
        ));
    }
    if options.max_uncommitted_events() > 0 {
        params.push(format!(
            "max_uncommitted_events={}",
            options.max_uncommitted_events()
        ));
    }
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

/// Line-buffers a chunked stream body into batches.
pub(crate) struct HttpBatchReader {
    stream_id: String,
    body: Option<BodyStream>,
    buffer: BytesMut,
    read_timeout: Duration,
}

impl HttpBatchReader {
    pub(crate) fn new(stream_id: String, body: BodyStream, read_timeout: Duration) -> Self {
        HttpBatchReader {
            stream_id,
            body: Some(body),
            buffer: BytesMut::new(),
            read_timeout,
        }
    }

    /// Take one complete line out of the buffer, without its terminator.
    fn take_line(&mut self) -> Option<Bytes> {
        while let Some(position) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.buffer.split_to(position + 1);
            line.truncate(position);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if !line.is_empty() {
                return Some(line.freeze());
            }
        }
        None
    }

    fn parse_line(&self, line: &[u8]) -> Result<(Cursor, Option<Bytes>), NakadiError> {
        let batch: BatchLine =
            serde_json::from_slice(line).map_err(|source| NakadiError::DecodeBody {
                context: "failed to unmarshal next batch",
                source,
            })?;
        let mut cursor = batch.cursor;
        cursor.stream_id = self.stream_id.clone();
        let events = batch
            .events
            .map(|raw| Bytes::copy_from_slice(raw.get().as_bytes()));
        Ok((cursor, events))
    }
}

#[async_trait]
impl BatchReader for HttpBatchReader {
    async fn next_batch(&mut self) -> Result<(Cursor, Option<Bytes>), NakadiError> {
        if self.body.is_none() {
            return Err(NakadiError::StreamClosed);
        }

        loop {
            if let Some(line) = self.take_line() {
                return self.parse_line(&line);
            }

            let body = match self.body.as_mut() {
                Some(body) => body,
                None => return Err(NakadiError::StreamClosed),
            };
            let chunk = match timeout(self.read_timeout, body.next()).await {
                Err(_elapsed) => {
                    self.close();
                    return Err(NakadiError::StreamIo {
                        source: io::Error::new(
                            io::ErrorKind::TimedOut,
                            "no batch within twice the heartbeat interval",
                        ),
                    });
                }
                Ok(None) => {
                    self.close();
                    return Err(NakadiError::StreamIo {
                        source: io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended"),
                    });
                }
                Ok(Some(Err(source))) => {
                    self.close();
                    return Err(NakadiError::Transport {
                        context: "failed to read next batch",
                        source,
                    });
                }
                Ok(Some(Ok(chunk))) => chunk,
            };
            self.buffer.extend_from_slice(&chunk);
        }
    }

    fn close(&mut self) {
        self.body = None;
        self.buffer.clear();
    }
}
