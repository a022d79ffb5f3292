//! HTTP client with automatic 402 handling
//!
//! [`X402Client`] sends a request through an [`HttpTransport`]. When the
//! server answers `402 Payment Required` with a challenge body, the client
//! asks its [`PaymentSigner`] for a proof, attaches it as the `X-PAYMENT`
//! header and retries the request exactly once.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use x402_challenge::client::X402Client;
//! use x402_challenge::signer::LocalSigner;
//!
//! # async fn example() -> x402_challenge::Result<()> {
//! let signer = Arc::new(LocalSigner::from_env()?);
//! let client = X402Client::new(signer)?;
//!
//! let response = client.get("http://localhost:3000/paid").await?;
//! println!("{}: {}", response.status, response.text());
//! # Ok(())
//! # }
//! ```

use crate::signer::PaymentSigner;
use crate::types::{headers, Challenge};
use crate::{Result, X402Error};
use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::sync::Arc;

/// An outgoing HTTP request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    /// Create a request with no headers or body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// A GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// A POST request with a JSON body
    pub fn post_json<T: serde::Serialize>(url: impl Into<String>, body: &T) -> Result<Self> {
        Ok(Self::new(Method::POST, url)
            .with_body(serde_json::to_vec(body)?)
            .with_header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ))
    }

    /// Add or replace a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A received HTTP response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Decode the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends HTTP requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[async_trait]
impl HttpTransport for reqwest::Client {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = url::Url::parse(&request.url)?;
        let mut builder =
            reqwest::Client::request(self, request.method, url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

/// HTTP client that pays for 402-protected resources
#[derive(Clone)]
pub struct X402Client {
    transport: Arc<dyn HttpTransport>,
    signer: Arc<dyn PaymentSigner>,
}

impl std::fmt::Debug for X402Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field("transport", &"<transport>")
            .field("signer", &"<signer>")
            .finish()
    }
}

impl X402Client {
    /// Create a client backed by `reqwest`
    pub fn new(signer: Arc<dyn PaymentSigner>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| X402Error::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_transport(Arc::new(client), signer))
    }

    /// Create a client over an arbitrary transport
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        signer: Arc<dyn PaymentSigner>,
    ) -> Self {
        Self { transport, signer }
    }

    /// GET `url`, paying if required
    pub async fn get(&self, url: &str) -> Result<TransportResponse> {
        self.request(TransportRequest::get(url)).await
    }

    /// POST a JSON body to `url`, paying if required
    pub async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<TransportResponse> {
        self.request(TransportRequest::post_json(url, body)?).await
    }

    /// Send `request`, retrying once with a payment proof on 402
    ///
    /// A 402 without a decodable challenge is returned unchanged. Signer
    /// failures are returned as errors.
    pub async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        let retry = request.clone();
        let response = self.transport.request(request).await?;
        if response.status != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        let challenge = match extract_challenge(&response) {
            Some(challenge) => challenge,
            None => {
                tracing::debug!(url = %retry.url, "402 response carried no usable challenge");
                return Ok(response);
            }
        };

        tracing::debug!(
            url = %retry.url,
            price = %challenge.price,
            currency = %challenge.currency,
            "Payment required; requesting signature"
        );
        let proof = self.signer.sign_payment(&challenge).await?;
        let header = HeaderValue::from_str(&proof.to_header()?).map_err(|e| {
            X402Error::invalid_payment_payload(format!("Proof is not a valid header value: {}", e))
        })?;

        let name = HeaderName::from_bytes(headers::X_PAYMENT.as_bytes())
            .map_err(|e| X402Error::config(format!("Invalid payment header name: {}", e)))?;
        self.transport.request(retry.with_header(name, header)).await
    }
}

fn extract_challenge(response: &TransportResponse) -> Option<Challenge> {
    let body: serde_json::Value = response.json().ok()?;
    let challenge = body.get("challenge")?.clone();
    match serde_json::from_value(challenge) {
        Ok(challenge) => Some(challenge),
        Err(e) => {
            tracing::debug!("Malformed challenge in 402 body: {}", e);
            None
        }
    }
}
