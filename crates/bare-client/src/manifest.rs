//! Fetching the server manifest.

use bare::{BareClientError, HttpTransport, Manifest, Result, TransportRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::exchange;

/// Fetches and parses the manifest served at `server`.
///
/// Transport failures and non-success statuses become
/// [`BareClientError::ManifestFetchFailed`]; cancellation surfaces as
/// [`BareClientError::Cancelled`].
#[instrument(skip(http, cancel), fields(server = %server))]
pub async fn fetch_manifest(
    http: &dyn HttpTransport,
    server: &Url,
    cancel: Option<&CancellationToken>,
) -> Result<Manifest> {
    debug!("fetching bare manifest");
    let fetch = async {
        let response = http
            .send(TransportRequest::new("GET", server.clone()))
            .await
            .map_err(|e| BareClientError::ManifestFetchFailed {
                status: None,
                message: e.to_string(),
            })?;
        let status = response.status;
        let ok = response.ok();
        let text = response
            .body
            .text()
            .await
            .map_err(|e| BareClientError::ManifestFetchFailed {
                status: Some(status),
                message: e.to_string(),
            })?;
        if !ok {
            warn!(status, "manifest request was rejected");
            return Err(BareClientError::ManifestFetchFailed {
                status: Some(status),
                message: text,
            });
        }
        Manifest::from_json(&text)
    };
    let manifest = exchange::cancellable(cancel, fetch).await?;
    debug!(versions = ?manifest.versions, "fetched bare manifest");
    Ok(manifest)
}
