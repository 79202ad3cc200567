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
use nakadi_client_auth::TokenProvider;
use nakadi_client_config::ClientConfig;
use nakadi_client_retry::retry_async::retry_async;
use nakadi_client_retry::retry_policy::RetryWithBackoff;
use nakadi_client_retry::retry_result::{RetryError, RetryResult};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// The uniform HTTP request core shared by every sub API.
///
/// Each request runs inside a retry loop driven by the caller's backoff
/// schedule. Per attempt: a bearer token is fetched when a provider is
/// configured (a provider failure is permanent), the request is sent (a
/// transport failure is transient), and a response with status >= 500 is
/// classified transient after its body was decoded so the final failure
/// carries the broker's reason. Any response below 500 ends the retries
/// and is handled per verb.
pub(crate) struct RawClient {
    http_client: Client,
    stream_client: Client,
    base_url: String,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl RawClient {
    pub(crate) fn new(config: &ClientConfig) -> RawClient {
        let http_client = Client::builder()
            .timeout(config.connection_timeout())
            .connect_timeout(config.connection_timeout())
            .build()
            .expect("create http client");
        // the stream client must not bound the total request duration,
        // only the connect phase
        let stream_client = Client::builder()
            .connect_timeout(config.connection_timeout())
            .build()
            .expect("create http stream client");
        RawClient {
            http_client,
            stream_client,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            token_provider: config.token_provider().clone(),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The client used for long-lived stream requests.
    pub(crate) fn stream_client(&self) -> &Client {
        &self.stream_client
    }

    /// The bearer token for the next request attempt, if a provider is
    /// configured.
    pub(crate) async fn bearer_token(
        &self,
        context: &'static str,
    ) -> Result<Option<String>, NakadiError> {
        match &self.token_provider {
            Some(provider) => match provider.retrieve_token().await {
                Ok(token) => Ok(Some(token)),
                Err(source) => Err(NakadiError::Token { context, source }),
            },
            None => Ok(None),
        }
    }

    /// Fetch JSON encoded data with a GET request.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        backoff: RetryWithBackoff,
        context: &'static str,
    ) -> Result<T, NakadiError> {
        let response = self
            .send_with_retry(Method::GET, url, None, HeaderMap::new(), backoff, context)
            .await?;

        let status = response.status();
        let buffer = response
            .bytes()
            .await
            .map_err(|source| NakadiError::ReadBody { context, source })?;
        if status != StatusCode::OK {
            return Err(error::decode_broker_error(context, status.as_u16(), &buffer));
        }
        serde_json::from_slice(&buffer).map_err(|source| NakadiError::DecodeBody { context, source })
    }

    /// Send JSON encoded data via PUT and return the raw response for
    /// caller-specific status handling.
    pub(crate) async fn put_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        backoff: RetryWithBackoff,
        context: &'static str,
    ) -> Result<Response, NakadiError> {
        let encoded =
            serde_json::to_vec(body).map_err(|source| NakadiError::EncodeBody { context, source })?;
        self.send_with_retry(Method::PUT, url, Some(encoded), HeaderMap::new(), backoff, context)
            .await
    }

    /// Send JSON encoded data via POST and return the raw response for
    /// caller-specific status handling. `headers` are added to every
    /// attempt (the cursor commit uses this for its stream-id header).
    pub(crate) async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        headers: HeaderMap,
        backoff: RetryWithBackoff,
        context: &'static str,
    ) -> Result<Response, NakadiError> {
        let encoded =
            serde_json::to_vec(body).map_err(|source| NakadiError::EncodeBody { context, source })?;
        self.send_with_retry(Method::POST, url, Some(encoded), headers, backoff, context)
            .await
    }

    /// Send a DELETE request. 200 and 204 count as success, anything else
    /// is decoded through the broker error envelope.
    pub(crate) async fn delete(
        &self,
        url: &str,
        backoff: RetryWithBackoff,
        context: &'static str,
    ) -> Result<(), NakadiError> {
        let response = self
            .send_with_retry(Method::DELETE, url, None, HeaderMap::new(), backoff, context)
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            let buffer = response
                .bytes()
                .await
                .map_err(|source| NakadiError::ReadBody { context, source })?;
            return Err(error::decode_broker_error(context, status.as_u16(), &buffer));
        }
        Ok(())
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        headers: HeaderMap,
        backoff: RetryWithBackoff,
        context: &'static str,
    ) -> Result<Response, NakadiError> {
        let result = retry_async(backoff, || {
            let method = method.clone();
            let body = body.clone();
            let headers = headers.clone();
            async move {
                let token = match self.bearer_token(context).await {
                    Ok(token) => token,
                    Err(err) => return RetryResult::Fail(err),
                };

                let mut request = self.http_client.request(method, url).headers(headers);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                if let Some(body) = body {
                    request = request
                        .header(CONTENT_TYPE, "application/json;charset=UTF-8")
                        .body(body);
                }

                let response = match request.send().await {
                    Ok(response) => response,
                    Err(source) => {
                        return RetryResult::Retry(NakadiError::Transport { context, source })
                    }
                };

                if response.status().is_server_error() {
                    let status = response.status().as_u16();
                    return match response.bytes().await {
                        Ok(buffer) => RetryResult::Retry(error::decode_broker_error(
                            context, status, &buffer,
                        )),
                        Err(source) => {
                            RetryResult::Retry(NakadiError::ReadBody { context, source })
                        }
                    };
                }

                RetryResult::Success(response)
            }
        })
        .await;

        result.map_err(|RetryError { error, .. }| error)
    }
}

impl std::fmt::Debug for RawClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawClient")
            .field("base_url", &self.base_url)
            .field("has_token_provider", &self.token_provider.is_some())
            .finish()
    }
}
