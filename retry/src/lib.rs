//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Retry is a crate for retrying something that can fail with exponential backoff.
//! It is designed to have a declarative interface for ease of use.
//!
//! A `RetryWithBackoff` value is a schedule of delays; passing a copy of the
//! value to one of the retry functions always starts a fresh schedule.

pub mod retry_async;
pub mod retry_policy;
pub mod retry_result;
