//! [`HttpTransport`] over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use bare::{
    Body, CacheMode, CredentialsMode, HeaderList, HttpTransport, TransportError, TransportRequest,
    TransportResponse,
};
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, PRAGMA};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Settings for [`ReqwestTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReqwestTransportConfig {
    /// `User-Agent` sent to the intermediary.
    pub user_agent: String,
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-exchange timeout in seconds; `None` lets streaming responses run
    /// indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ReqwestTransportConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("bare-client/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: None,
        }
    }
}

/// Request/response transport backed by a `reqwest::Client`.
///
/// Redirects are never followed at this layer: the intermediary's responses
/// are returned as received. There is no cookie store, so credentials are
/// always omitted.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport from `config`.
    pub fn new(config: &ReqwestTransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Connect(format!("cannot build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client. Its redirect policy should be `none`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Converts transport headers, adding no-cache directives when `cache`
/// forbids stored responses.
pub(crate) fn header_map(
    headers: &HeaderList,
    cache: Option<CacheMode>,
) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len() + 2);
    for (name, value) in headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        map.append(name, value);
    }
    if cache.is_some_and(CacheMode::bypasses_cache) {
        map.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        map.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }
    Ok(map)
}

/// Converts response headers; values that are not UTF-8 are decoded lossily.
pub(crate) fn header_list(map: &HeaderMap) -> HeaderList {
    map.iter()
        .map(|(name, value)| {
            (
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else if err.is_connect() || err.is_timeout() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("method {:?}: {e}", request.method)))?;
        if request.credentials != CredentialsMode::Omit {
            debug!(credentials = ?request.credentials, "no cookie store; credentials are omitted");
        }
        let headers = header_map(&request.headers, request.cache)?;

        let mut builder = self.client.request(method, request.url).headers(headers);
        builder = match request.body {
            Body::Empty => builder,
            Body::Full(bytes) => builder.body(bytes),
            // reqwest needs a Sync stream; request bodies are buffered instead.
            body @ Body::Stream(_) => builder.body(body.collect().await?),
        };

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(status = status.as_u16(), "intermediary responded");

        let headers = header_list(response.headers());
        let body = Body::from_stream(response.bytes_stream().map_err(transport_error));
        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_request_timeout() {
        let config = ReqwestTransportConfig::default();
        assert!(config.user_agent.starts_with("bare-client/"));
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.request_timeout_secs, None);
        assert!(ReqwestTransport::new(&config).is_ok());
    }

    #[test]
    fn header_map_keeps_repeats_and_adds_cache_directives() {
        let headers: HeaderList = [
            ("x-bare-forward-headers", "accept"),
            ("x-bare-forward-headers", "accept-language"),
        ]
        .into_iter()
        .collect();

        let map = header_map(&headers, Some(CacheMode::NoStore)).unwrap();
        let forwarded: Vec<_> = map.get_all("x-bare-forward-headers").iter().collect();
        assert_eq!(forwarded.len(), 2);
        assert_eq!(map.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(map.get(PRAGMA).unwrap(), "no-cache");

        let map = header_map(&headers, Some(CacheMode::ForceCache)).unwrap();
        assert!(map.get(CACHE_CONTROL).is_none());
    }

    #[test]
    fn invalid_header_values_are_rejected() {
        let headers: HeaderList = [("x-bare-url", "line\nbreak")].into_iter().collect();
        assert!(matches!(
            header_map(&headers, None),
            Err(TransportError::InvalidRequest(_))
        ));
    }

    #[test]
    fn header_list_preserves_order_and_repeats() {
        let mut map = HeaderMap::new();
        map.append("x-bare-headers-0", HeaderValue::from_static(";{"));
        map.append("x-bare-headers-1", HeaderValue::from_static(";}"));
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));

        let list = header_list(&map);
        assert_eq!(list.get_all("set-cookie").collect::<Vec<_>>(), ["a=1", "b=2"]);
        assert_eq!(list.get("x-bare-headers-1"), Some(";}"));
    }
}
