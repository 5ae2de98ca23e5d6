//! The client facade.
//!
//! [`BareClient`] binds to one Bare server and hides which protocol version
//! it speaks. It is bound either eagerly, from a manifest the host already
//! has, or on demand, by fetching the manifest the first time it is needed.
//!
//! On-demand resolution is shared: concurrent callers wait on one manifest
//! fetch. A failed resolution is not cached; the next call starts a new one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bare::{
    BareClientError, BareHeaders, ClientConfig, Manifest, RemoteTarget, Result, Transports,
    TunneledRequest, TunneledResponse, VersionId,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::exchange;
use crate::manifest::fetch_manifest;
use crate::negotiate::VersionTable;
use crate::protocol::{ClientContext, ProtocolClient};
use crate::tunnel::TunnelSocket;
use crate::websocket::prepare_handshake;

/// A manifest together with the client negotiated from it.
#[derive(Debug)]
struct Resolved {
    manifest: Manifest,
    client: Arc<dyn ProtocolClient>,
}

type PendingResolution = Shared<BoxFuture<'static, Result<Arc<Resolved>>>>;

enum Resolution {
    Unresolved,
    Resolving(PendingResolution),
    Resolved(Arc<Resolved>),
}

struct Inner {
    context: ClientContext,
    versions: VersionTable,
    resolution: Mutex<Resolution>,
    manifest_cancel: Option<CancellationToken>,
}

/// Configures a [`BareClient`] before binding it.
#[derive(Debug)]
pub struct BareClientBuilder {
    server: Url,
    transports: Transports,
    config: ClientConfig,
    versions: VersionTable,
}

impl BareClientBuilder {
    /// Replaces the default configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default version preference table.
    pub fn versions(mut self, versions: VersionTable) -> Self {
        self.versions = versions;
        self
    }

    fn context(&self) -> Result<ClientContext> {
        self.config.validate()?;
        Ok(ClientContext {
            server: self.server.clone(),
            transports: self.transports.clone(),
            config: self.config.clone(),
        })
    }

    /// Binds eagerly to `manifest`.
    ///
    /// Fails with [`BareClientError::UnsupportedVersion`] if no version in the
    /// table is advertised.
    pub fn manifest(self, manifest: Manifest) -> Result<BareClient> {
        let context = self.context()?;
        let client = self.versions.instantiate(&manifest, &context)?;
        info!(server = %context.server, version = %client.version(), "bound bare client");
        let resolved = Arc::new(Resolved { manifest, client });
        Ok(BareClient::from_parts(
            context,
            self.versions,
            Resolution::Resolved(resolved),
            None,
        ))
    }

    /// Defers binding until the first operation needs it.
    ///
    /// `manifest_cancel` cancels manifest fetches only; a cancelled token
    /// makes every later resolution fail with [`BareClientError::Cancelled`].
    pub fn on_demand(self, manifest_cancel: Option<CancellationToken>) -> Result<BareClient> {
        let context = self.context()?;
        Ok(BareClient::from_parts(
            context,
            self.versions,
            Resolution::Unresolved,
            manifest_cancel,
        ))
    }
}

/// Version-agnostic client for one Bare server.
///
/// Cheap to clone; clones share the resolution state.
#[derive(Clone)]
pub struct BareClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BareClient")
            .field("server", &self.inner.context.server.as_str())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

impl BareClient {
    /// Starts configuring a client for `server`.
    pub fn builder(server: Url, transports: Transports) -> BareClientBuilder {
        BareClientBuilder {
            server,
            transports,
            config: ClientConfig::default(),
            versions: VersionTable::default(),
        }
    }

    /// Binds eagerly with default configuration.
    pub fn with_manifest(server: Url, transports: Transports, manifest: Manifest) -> Result<Self> {
        Self::builder(server, transports).manifest(manifest)
    }

    /// Binds on demand with default configuration.
    pub fn on_demand(
        server: Url,
        transports: Transports,
        manifest_cancel: Option<CancellationToken>,
    ) -> Result<Self> {
        Self::builder(server, transports).on_demand(manifest_cancel)
    }

    fn from_parts(
        context: ClientContext,
        versions: VersionTable,
        resolution: Resolution,
        manifest_cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                versions,
                resolution: Mutex::new(resolution),
                manifest_cancel,
            }),
        }
    }

    /// The server this client is bound to.
    pub fn server(&self) -> &Url {
        &self.inner.context.server
    }

    /// The active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.context.config
    }

    /// The manifest, once resolved.
    pub fn manifest(&self) -> Option<Manifest> {
        self.resolved().map(|resolved| resolved.manifest.clone())
    }

    /// The negotiated version, once resolved.
    pub fn version(&self) -> Option<VersionId> {
        self.resolved().map(|resolved| resolved.client.version())
    }

    /// `true` once a protocol client is bound.
    pub fn is_ready(&self) -> bool {
        self.resolved().is_some()
    }

    fn lock_resolution(&self) -> MutexGuard<'_, Resolution> {
        self.inner
            .resolution
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn resolved(&self) -> Option<Arc<Resolved>> {
        match &*self.lock_resolution() {
            Resolution::Resolved(resolved) => Some(Arc::clone(resolved)),
            _ => None,
        }
    }

    /// Builds the resolution future. It owns clones of what it needs so the
    /// shared future never keeps the client alive.
    fn start_resolution(&self) -> PendingResolution {
        let context = self.inner.context.clone();
        let versions = self.inner.versions.clone();
        let cancel = self.inner.manifest_cancel.clone();
        async move {
            let manifest = fetch_manifest(
                context.transports.http.as_ref(),
                &context.server,
                cancel.as_ref(),
            )
            .await?;
            let client = versions.instantiate(&manifest, &context)?;
            info!(server = %context.server, version = %client.version(), "bound bare client");
            Ok(Arc::new(Resolved { manifest, client }))
        }
        .boxed()
        .shared()
    }

    /// Returns the bound client, starting or joining a resolution if needed.
    async fn demand(&self) -> Result<Arc<Resolved>> {
        let pending = {
            let mut resolution = self.lock_resolution();
            match &*resolution {
                Resolution::Resolved(resolved) => return Ok(Arc::clone(resolved)),
                Resolution::Resolving(pending) => pending.clone(),
                Resolution::Unresolved => {
                    debug!(server = %self.inner.context.server, "resolving bare manifest");
                    let pending = self.start_resolution();
                    *resolution = Resolution::Resolving(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;

        let mut resolution = self.lock_resolution();
        let current = matches!(&*resolution, Resolution::Resolving(p) if p.ptr_eq(&pending));
        if current {
            *resolution = match &outcome {
                Ok(resolved) => Resolution::Resolved(Arc::clone(resolved)),
                Err(err) => {
                    warn!(error = %err, "manifest resolution failed; the next call retries");
                    Resolution::Unresolved
                }
            };
        }
        outcome
    }

    /// Tunnels one HTTP request, resolving the manifest first if needed.
    ///
    /// `cancel` aborts this call only; a resolution it was waiting on carries
    /// on for other callers.
    #[instrument(skip_all, fields(method = %request.method, host = %request.target.host))]
    pub async fn request(
        &self,
        request: TunneledRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<TunneledResponse> {
        let resolved = exchange::cancellable(cancel, self.demand()).await?;
        resolved.client.request(request, cancel).await
    }

    /// Opens a tunneled WebSocket. Requires a bound client.
    ///
    /// Fails with [`BareClientError::NotReady`] before resolution and with
    /// [`BareClientError::InvalidSubprotocol`] before any connection attempt.
    pub fn connect(
        &self,
        target: &RemoteTarget,
        headers: BareHeaders,
        protocols: &[&str],
    ) -> Result<TunnelSocket> {
        let resolved = self.resolved().ok_or(BareClientError::NotReady)?;
        let request = prepare_handshake(target, headers, protocols)?;
        debug!(remote = %target.host_header(), "opening tunneled websocket");
        resolved.client.connect(request)
    }

    /// Like [`BareClient::connect`], but resolves the manifest first if
    /// needed. Subprotocols are validated before waiting.
    pub async fn legacy_connect(
        &self,
        target: &RemoteTarget,
        headers: BareHeaders,
        protocols: &[&str],
    ) -> Result<TunnelSocket> {
        let request = prepare_handshake(target, headers, protocols)?;
        let resolved = self.demand().await?;
        debug!(remote = %target.host_header(), "opening tunneled websocket");
        resolved.client.connect(request)
    }
}

/// Fetches the manifest at `server` and returns an eagerly-bound client.
pub async fn create_bare_client(
    server: Url,
    transports: Transports,
    cancel: Option<&CancellationToken>,
) -> Result<BareClient> {
    let manifest = fetch_manifest(transports.http.as_ref(), &server, cancel).await?;
    BareClient::with_manifest(server, transports, manifest)
}
