//! The HTTP transport seam. `CalDavClient` (in `client::caldav_client`) is
//! generic over [`HttpTransport`] so request/response plumbing — retries,
//! compression, connection pooling — can be swapped for a deterministic
//! fake in tests without standing up a real server.
//!
//! [`HyperTransport`] is the production implementation, built on the same
//! `hyper` + `hyper-rustls` client and `async-compression` decoders kept in
//! `common::http`/`common::compression`.

use crate::common::compression::{
    ContentEncoding, add_accept_encoding, add_content_encoding, compress_payload, decompress_body,
    detect_encoding,
};
use crate::common::http::{HyperClient, build_hyper_client};
use crate::config::ClientConfig;
use crate::error::{DavError, NetworkCause};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Method, Uri, header};
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation handed down from the caller. Cloning shares the
/// same cancellation signal; `cancel()` trips every clone at once.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Race a future against cancellation; `None` means cancellation won.
    pub async fn race<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.0.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

/// A fully aggregated, already-decompressed HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_str(&self) -> Result<&str, DavError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| DavError::parse(format!("response body is not UTF-8: {e}"), String::new()))
    }
}

/// Authentication applied to every outgoing request.
pub trait AuthProvider: Send + Sync {
    /// The `Authorization` header value, if any, for this request.
    fn authorization_header(&self) -> Option<String>;
}

/// HTTP Basic auth, the scheme every server in the spec's compatibility
/// matrix supports.
pub struct BasicAuth {
    header_value: String,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        use base64::Engine;
        let token = format!("{username}:{password}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(token);
        Self {
            header_value: format!("Basic {encoded}"),
        }
    }
}

impl AuthProvider for BasicAuth {
    fn authorization_header(&self) -> Option<String> {
        Some(self.header_value.clone())
    }
}

pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn authorization_header(&self) -> Option<String> {
        None
    }
}

/// A seam for sending raw HTTP requests against a CalDAV server. One real
/// implementation ([`HyperTransport`]) and one in-memory test double per
/// test module; `CalDavClient` never calls `hyper` directly.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Option<Bytes>,
        cancel: &CancelToken,
    ) -> impl Future<Output = Result<RawResponse, DavError>> + Send;
}

/// Production transport: `hyper` client pooled across requests, native-root
/// TLS with a WebPKI fallback, and automatic request/response compression.
pub struct HyperTransport {
    client: HyperClient,
    auth: Arc<dyn AuthProvider>,
    user_agent: String,
    connect_timeout: std::time::Duration,
    read_timeout: std::time::Duration,
    request_compression: ContentEncoding,
}

impl HyperTransport {
    pub fn new(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, DavError> {
        let client = build_hyper_client()
            .map_err(|e| DavError::network(NetworkCause::Other(e.to_string())))?;
        Ok(Self {
            client,
            auth,
            user_agent: config.user_agent.clone(),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            request_compression: ContentEncoding::Identity,
        })
    }

    pub fn with_request_compression(mut self, encoding: ContentEncoding) -> Self {
        self.request_compression = encoding;
        self
    }
}

impl HttpTransport for HyperTransport {
    async fn send(
        &self,
        method: Method,
        uri: Uri,
        mut headers: HeaderMap,
        body: Option<Bytes>,
        cancel: &CancelToken,
    ) -> Result<RawResponse, DavError> {
        let mut builder = hyper::Request::builder().method(method).uri(uri);

        if let Ok(value) = header::HeaderValue::from_str(&self.user_agent) {
            builder = builder.header(header::USER_AGENT, value);
        }

        if let Some(auth) = self.auth.authorization_header() {
            if let Ok(value) = header::HeaderValue::from_str(&auth) {
                builder = builder.header(header::AUTHORIZATION, value);
            }
        }

        add_accept_encoding(&mut headers);

        let mut payload = body;
        if let Some(data) = &payload {
            if self.request_compression != ContentEncoding::Identity {
                if let Ok(compressed) =
                    compress_payload(data.clone(), self.request_compression).await
                {
                    payload = Some(compressed);
                    add_content_encoding(&mut headers, self.request_compression);
                }
            }
            if !headers.contains_key(header::CONTENT_TYPE) {
                headers.insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static("application/xml; charset=utf-8"),
                );
            }
        }

        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }

        let request = builder
            .body(Full::new(payload.unwrap_or_default()))
            .map_err(|e| DavError::network(NetworkCause::Other(e.to_string())))?;

        let send_fut = self.client.request(request);
        let total_timeout = self.connect_timeout + self.read_timeout;

        let response = match cancel.race(timeout(total_timeout, send_fut)).await {
            None => return Err(DavError::network(NetworkCause::Cancelled)),
            Some(Err(_)) => return Err(DavError::network(NetworkCause::ReadTimeout)),
            Some(Ok(Err(e))) => {
                return Err(DavError::network(NetworkCause::Other(e.to_string())));
            }
            Some(Ok(Ok(r))) => r,
        };

        let encoding = detect_encoding(response.headers());
        let (parts, incoming) = response.into_parts();
        let body = decompress_body(incoming, encoding)
            .await
            .map_err(|e| DavError::network(NetworkCause::Other(e.to_string())))?;

        Ok(RawResponse {
            status: parts.status.as_u16(),
            headers: parts.headers,
            body,
        })
    }
}
