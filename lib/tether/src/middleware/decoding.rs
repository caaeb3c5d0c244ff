//! Response decoding stage.
//!
//! Adds `Accept-Encoding` to outgoing requests, decompresses responses by
//! `Content-Encoding` (gzip, deflate, br, zstd), then normalizes the body to
//! UTF-8: a leading byte order mark is dropped and latin-1 bodies are
//! transcoded, with the `charset` of `Content-Type` rewritten to match.

use std::io::Read;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::middleware::ServiceFuture;
use crate::{Error, Headers, Request, Response, Result, find_header, insert_header};

const ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Layer that decodes response bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodingLayer {
    _private: (),
}

impl DecodingLayer {
    /// Create a new decoding layer.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl<S> Layer<S> for DecodingLayer {
    type Service = Decoding<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Decoding { inner }
    }
}

/// Service that decompresses and charset-normalizes responses.
#[derive(Debug, Clone)]
pub struct Decoding<S> {
    inner: S,
}

/// Decompress bytes based on encoding.
fn decompress(encoding: &str, body: Bytes) -> Result<Bytes> {
    let result = match encoding {
        "gzip" | "x-gzip" => {
            let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::decoding(format!("gzip decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        "deflate" => {
            let mut decoder = flate2::read::DeflateDecoder::new(body.as_ref());
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::decoding(format!("deflate decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        "br" => {
            let mut decompressed = Vec::new();
            brotli::BrotliDecompress(&mut body.as_ref(), &mut decompressed)
                .map_err(|e| Error::decoding(format!("brotli decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        "zstd" => {
            let decompressed = zstd::decode_all(body.as_ref())
                .map_err(|e| Error::decoding(format!("zstd decompression failed: {e}")))?;
            Bytes::from(decompressed)
        }
        // identity, or an encoding we don't know: pass through
        _ => body,
    };

    Ok(result)
}

/// The `charset` parameter of a `Content-Type` value, lowercased.
fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

fn is_latin1(charset: &str) -> bool {
    matches!(
        charset,
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" | "iso_8859-1"
    )
}

/// Bring the body to UTF-8 and keep the `Content-Type` charset in sync.
fn normalize_charset(headers: &mut Headers, body: Bytes) -> Bytes {
    let content_type = find_header(headers, "content-type").map(str::to_string);
    let charset = content_type.as_deref().and_then(charset);

    if let (Some(content_type), Some(charset)) = (&content_type, &charset)
        && is_latin1(charset)
    {
        let text: String = body.iter().copied().map(char::from).collect();
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        insert_header(headers, "Content-Type", format!("{media_type}; charset=utf-8"));
        return Bytes::from(text);
    }

    if body.starts_with(UTF8_BOM) {
        return body.slice(UTF8_BOM.len()..);
    }

    body
}

fn decode_response(response: Response) -> Result<Response> {
    let (status, mut headers, body) = response.into_parts();

    let encoding = find_header(&headers, "content-encoding")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    // HEAD, 204 and 304 answers keep the encoding headers of a full body
    let body = if encoding.is_empty() || encoding == "identity" || body.is_empty() {
        body
    } else {
        let decompressed = decompress(&encoding, body)?;
        headers.retain(|name, _| !name.eq_ignore_ascii_case("content-encoding"));
        insert_header(&mut headers, "content-length", decompressed.len().to_string());
        decompressed
    };

    let body = normalize_charset(&mut headers, body);
    Ok(Response::new(status, headers, body))
}

impl<S> Service<Request> for Decoding<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        if request.header("accept-encoding").is_none() {
            request.set_header("Accept-Encoding", ACCEPT_ENCODING);
        }

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(request).await?;
            decode_response(response)
        })
    }
}
