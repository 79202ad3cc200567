//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Token acquisition for the Nakadi client.
//!
//! Every request sent to the broker carries a bearer token when a
//! [`TokenProvider`] is configured. A provider failure is a permanent
//! error: the surrounding request is not retried.

use async_trait::async_trait;
use snafu::Snafu;
use std::fmt::Debug;

/// The error returned when a token could not be obtained.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TokenError {
    #[snafu(display("unable to obtain token: {}", msg))]
    Retrieve { msg: String },
}

/// A client-side source of bearer tokens.
///
/// Implementations typically wrap an OAuth2 client or read a rotating
/// token from disk. The provider is called once per request attempt, so
/// implementations should cache tokens until close to expiry.
#[async_trait]
pub trait TokenProvider: Debug + Send + Sync {
    /// Retrieve a token to be sent as `Authorization: Bearer <token>`.
    async fn retrieve_token(&self) -> Result<String, TokenError>;
}

/// Provides one fixed token. Useful for tests and for deployments where
/// token rotation happens outside the process.
#[derive(Debug, Clone)]
pub struct FixedTokenProvider {
    token: String,
}

impl FixedTokenProvider {
    pub fn new<T: Into<String>>(token: T) -> Self {
        FixedTokenProvider { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for FixedTokenProvider {
    async fn retrieve_token(&self) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}
