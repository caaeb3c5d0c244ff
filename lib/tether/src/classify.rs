//! Response classification and payload decoding.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Response, ResponseType, Result, from_json};

/// Verdict on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Status in `[200, 400)`.
    Success,
    /// Anything else.
    Failure,
}

/// Returns `true` for statuses in `[200, 400)`.
#[must_use]
pub const fn is_success_status(status: u16) -> bool {
    status >= 200 && status < 400
}

/// Classify a response by its status.
#[must_use]
pub const fn classify(response: &Response) -> Classification {
    if is_success_status(response.status()) {
        Classification::Success
    } else {
        Classification::Failure
    }
}

/// Body of a successful response, decoded per the expected response type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A JSON document. An empty body decodes to `null`.
    Json(Value),
    /// An HTML page.
    Html(String),
    /// Anything else.
    Raw(Bytes),
}

impl Payload {
    /// Decode `body` as `response_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonDeserialization`](crate::Error::JsonDeserialization)
    /// if a JSON body is malformed.
    pub fn decode(response_type: ResponseType, body: Bytes) -> Result<Self> {
        match response_type {
            ResponseType::Json if body.iter().all(u8::is_ascii_whitespace) => {
                Ok(Self::Json(Value::Null))
            }
            ResponseType::Json => from_json(&body).map(Self::Json),
            ResponseType::Html => Ok(Self::Html(String::from_utf8_lossy(&body).into_owned())),
            ResponseType::Other => Ok(Self::Raw(body)),
        }
    }

    /// The JSON document, if this is one.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Html(_) | Self::Raw(_) => None,
        }
    }

    /// The HTML text, if this is a page.
    #[must_use]
    pub fn as_html(&self) -> Option<&str> {
        match self {
            Self::Html(text) => Some(text),
            Self::Json(_) | Self::Raw(_) => None,
        }
    }

    /// Deserialize a JSON payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not JSON or does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Json(value) => {
                serde_path_to_error::deserialize(value).map_err(|err| {
                    let path = err.path().to_string();
                    crate::Error::json_deserialization(path, err.inner().to_string())
                })
            }
            Self::Html(_) | Self::Raw(_) => Err(crate::Error::decoding("payload is not JSON")),
        }
    }
}

/// Result of a request that reached the service.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The decoded body of a successful response.
    Success(Payload),
    /// A failed response, unchanged. The reporter has already seen it.
    Failure(Response),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The payload of a success.
    #[must_use]
    pub const fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure(_) => None,
        }
    }

    /// The response of a failure.
    #[must_use]
    pub const fn failure(&self) -> Option<&Response> {
        match self {
            Self::Success(_) => None,
            Self::Failure(response) => Some(response),
        }
    }

    /// Consume into the payload, handing back the failed response otherwise.
    ///
    /// # Errors
    ///
    /// Returns the response of a failure.
    pub fn into_payload(self) -> std::result::Result<Payload, Response> {
        match self {
            Self::Success(payload) => Ok(payload),
            Self::Failure(response) => Err(response),
        }
    }
}
