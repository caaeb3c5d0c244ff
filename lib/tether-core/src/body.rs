//! Body serialization utilities.

use bytes::Bytes;

use crate::Result;

const JSON_MIME: &str = "application/json";
const FORM_MIME: &str = "application/x-www-form-urlencoded";
const HTML_MIME: &str = "text/html";

/// Request body, structured until the encoding stage turns it into bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Already-encoded bytes, sent as-is.
    Bytes(Bytes),
    /// A JSON document, encoded as `application/json`.
    Json(serde_json::Value),
    /// Form fields, encoded as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

impl Body {
    /// Build a JSON body from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Build a form body from name/value pairs.
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    /// Returns the encoded bytes, if the body has already been encoded.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Json(_) | Self::Form(_) => None,
        }
    }

    /// Returns `true` once the body is plain bytes.
    #[must_use]
    pub const fn is_encoded(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    /// Encode into bytes, along with the content type the encoding implies.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(self) -> Result<(Bytes, Option<&'static str>)> {
        match self {
            Self::Bytes(bytes) => Ok((bytes, None)),
            Self::Json(value) => Ok((to_json(&value)?, Some(JSON_MIME))),
            Self::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                Ok((Bytes::from(encoded), Some(FORM_MIME)))
            }
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// The kind of response a client expects from its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseType {
    /// JSON documents (`application/json`).
    #[default]
    Json,
    /// HTML pages (`text/html`).
    Html,
    /// Anything else, handed back as raw bytes.
    Other,
}

impl ResponseType {
    /// The `Accept` header value matching this response type, if any.
    #[must_use]
    pub const fn accept(&self) -> Option<&'static str> {
        match self {
            Self::Json => Some(JSON_MIME),
            Self::Html => Some(HTML_MIME),
            Self::Other => None,
        }
    }
}

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// # Example
///
/// ```
/// use tether_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Widget { name: String }
///
/// let widget = Widget { name: "sprocket".to_string() };
/// let bytes = to_json(&widget).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"name":"sprocket"}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Serialize a value to form URL-encoded bytes.
///
/// Uses `serde_html_form` which supports `Vec<T>` for repeated form fields
/// (e.g., `tags=a&tags=b&tags=c`).
///
/// # Errors
///
/// Returns an error if form serialization fails.
pub fn to_form<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_html_form::to_string(value)
        .map(|s| Bytes::from(s.into_bytes()))
        .map_err(Into::into)
}

/// Serialize a value to a query string.
///
/// # Errors
///
/// Returns an error if query serialization fails.
///
/// # Example
///
/// ```
/// use tether_core::to_query_string;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Search {
///     q: String,
///     #[serde(skip_serializing_if = "Option::is_none")]
///     page: Option<u32>,
/// }
///
/// let search = Search { q: "rust".to_string(), page: Some(1) };
/// let query = to_query_string(&search).expect("serialize");
/// assert_eq!(query, "q=rust&page=1");
/// ```
pub fn to_query_string<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_html_form::to_string(value).map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails, with the error message
/// including the path to the problematic field (e.g., "user.address.city").
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}
