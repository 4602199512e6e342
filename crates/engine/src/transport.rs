//! Request/response exchange with the host's local callback endpoints.
//!
//! Every body the host sends back is normalised here: empty bodies become
//! `None`, non-2xx statuses and unparsable JSON become [`TransportError`].

use dealdesk_protocol::{
    CatalogItem, CatalogResponse, Endpoint, SaveColorsRequest, SaveColorsResponse, SellRequest,
    SellResponse, ThemeColors,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Prefix some host builds put in front of the resource name.
pub const RESOURCE_PREFIX: &str = "cfx-nui-";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, timeout, or the body could not be read.
    Network(String),
    /// Host answered with a non-2xx status.
    Status(u16),
    /// Host answered with something that is not the expected JSON.
    Malformed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "network error: {msg}"),
            TransportError::Status(code) => write!(f, "http error status: {code}"),
            TransportError::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Channel to the host. `Ok(None)` means the host answered 2xx with an empty body.
pub trait HostTransport: Send + Sync + 'static {
    fn post(
        &self,
        endpoint: Endpoint,
        body: Value,
    ) -> impl Future<Output = Result<Option<Value>, TransportError>> + Send;
}

/// Strip the `cfx-nui-` prefix when the runtime reports it.
pub fn resource_name(raw: &str) -> &str {
    raw.strip_prefix(RESOURCE_PREFIX).unwrap_or(raw)
}

pub fn decode_body(text: &str) -> Result<Option<Value>, TransportError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| TransportError::Malformed(e.to_string()))
}

fn decode_as<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::Malformed(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Network(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `https://{resource}` with the runtime prefix removed.
    pub fn for_resource(resource: &str) -> Result<Self, TransportError> {
        Self::new(format!("https://{}", resource_name(resource)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }
}

impl HostTransport for HttpTransport {
    fn post(
        &self,
        endpoint: Endpoint,
        body: Value,
    ) -> impl Future<Output = Result<Option<Value>, TransportError>> + Send {
        let client = self.client.clone();
        let url = self.url(endpoint);
        async move {
            let resp = client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            let status = resp.status();
            debug!(%endpoint, status = status.as_u16(), "host responded");
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            let text = resp
                .text()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            decode_body(&text)
        }
    }
}

fn empty_body() -> Value {
    Value::Object(Default::default())
}

/// Post to an endpoint whose response the overlay does not read.
pub async fn notify<T: HostTransport>(
    transport: &T,
    endpoint: Endpoint,
) -> Result<(), TransportError> {
    transport.post(endpoint, empty_body()).await.map(|_| ())
}

/// `/test` echo; used only for diagnostics.
pub async fn diagnostic<T: HostTransport>(
    transport: &T,
) -> Result<Option<Value>, TransportError> {
    transport.post(Endpoint::Test, empty_body()).await
}

/// One `/getAvailableItems` attempt. An empty body is an empty catalog.
pub async fn fetch_catalog<T: HostTransport>(
    transport: &T,
) -> Result<Vec<CatalogItem>, TransportError> {
    let resp: CatalogResponse = match transport
        .post(Endpoint::GetAvailableItems, empty_body())
        .await?
    {
        Some(body) => decode_as(body)?,
        None => CatalogResponse::default(),
    };
    Ok(resp.items)
}

/// `/requestSell`. An empty body reads as an `empty_response` rejection.
pub async fn request_sell<T: HostTransport>(
    transport: &T,
    request: &SellRequest,
) -> Result<SellResponse, TransportError> {
    let body = serde_json::to_value(request).map_err(|e| TransportError::Malformed(e.to_string()))?;
    match transport.post(Endpoint::RequestSell, body).await? {
        Some(body) => decode_as(body),
        None => Ok(SellResponse::empty()),
    }
}

pub async fn save_colors<T: HostTransport>(
    transport: &T,
    colors: &ThemeColors,
) -> Result<SaveColorsResponse, TransportError> {
    let request = SaveColorsRequest {
        colors: colors.clone(),
    };
    let body = serde_json::to_value(&request).map_err(|e| TransportError::Malformed(e.to_string()))?;
    match transport.post(Endpoint::SaveColors, body).await? {
        Some(body) => decode_as(body),
        None => Ok(SaveColorsResponse::default()),
    }
}
