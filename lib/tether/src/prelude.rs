//! Prelude module for convenient imports.
//!
//! ```
//! use tether::prelude::*;
//! ```

pub use crate::{
    ApiClient, Body, ClientConfig, ClientOptions, Error, ErrorReporter, FailureContext, Headers,
    Method, Outcome, Params, Payload, Response, ResponseType, Result, RetryOptions, StatusCode,
};
pub use serde::{Deserialize, Serialize};
