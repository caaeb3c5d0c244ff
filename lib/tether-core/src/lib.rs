//! Core types and traits for the tether service client chassis.
//!
//! This crate provides the transport-neutral types used by tether:
//! - [`Method`] - HTTP method enum
//! - [`Request`], [`RequestBuilder`] and [`Body`] - HTTP request types
//! - [`Response`] - HTTP response type
//! - [`Error`] and [`Result`] - Error handling
//! - [`Transport`] - The dispatch primitive an adapter plugs into
//! - [`Headers`] and [`Params`] - Header and query parameter maps

mod body;
mod error;
mod headers;
mod method;
mod request;
mod response;
mod transport;

pub use body::{Body, ResponseType, from_json, to_form, to_json, to_query_string};
pub use error::{Error, Result, TransportError};
pub use headers::{Headers, Params, find_header, insert_header, merge_headers};
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use transport::{ResponseFuture, Transport, TransportFn, transport_fn};

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
