//! The dispatch primitive adapters plug into.
//!
//! A [`Transport`] performs the actual network I/O for a fully encoded
//! request. Implement it to plug in a different HTTP stack, or use
//! [`transport_fn`] to turn a closure into one (handy for stubs in tests).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::{Request, Response, Result};

/// Boxed future returned by [`Transport::dispatch`].
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// Underlying network transport.
///
/// Implementations receive requests whose query is already in the URL and
/// whose body is plain bytes, and return the status, headers, and body, or a
/// transport-level error.
pub trait Transport: Send + Sync + 'static {
    /// Send the request over the network.
    fn dispatch(&self, request: Request) -> ResponseFuture;
}

/// A [`Transport`] backed by a closure, see [`transport_fn`].
#[derive(Clone, Copy)]
pub struct TransportFn<F> {
    f: F,
}

impl<F> fmt::Debug for TransportFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFn").finish_non_exhaustive()
    }
}

/// Create a [`Transport`] from an async closure.
///
/// # Example
///
/// ```
/// use tether_core::{Headers, Response, transport_fn};
///
/// let stub = transport_fn(|_request| async {
///     Ok(Response::new(200, Headers::new(), r#"{"name":"foo"}"#))
/// });
/// # let _ = stub;
/// ```
pub fn transport_fn<F, Fut>(f: F) -> TransportFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    TransportFn { f }
}

impl<F, Fut> Transport for TransportFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn dispatch(&self, request: Request) -> ResponseFuture {
        Box::pin((self.f)(request))
    }
}
