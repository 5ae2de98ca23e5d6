//! Version negotiation.
//!
//! The client's preference order lives in a [`VersionTable`] so hosts and
//! tests can substitute their own. Negotiation itself is pure: given a
//! manifest and a preference list it picks the first version the server
//! advertises.

use std::fmt;
use std::sync::Arc;

use bare::{BareClientError, Manifest, Result, VersionId};
use tracing::{debug, warn};

use crate::protocol::{ClientContext, ProtocolClient};
use crate::{ClientV1, ClientV2, ClientV3};

/// Builds the protocol client for one version.
pub type ClientConstructor = fn(&ClientContext) -> Result<Arc<dyn ProtocolClient>>;

/// Returns the first entry of `preference` that `manifest` advertises.
///
/// Fails with [`BareClientError::UnsupportedVersion`] carrying the server's
/// list when nothing matches.
pub fn negotiate<'a, I>(manifest: &Manifest, preference: I) -> Result<&'a VersionId>
where
    I: IntoIterator<Item = &'a VersionId>,
{
    preference
        .into_iter()
        .find(|version| manifest.supports(version.as_str()))
        .ok_or_else(|| BareClientError::UnsupportedVersion {
            offered: manifest.versions.clone(),
        })
}

/// Version preference table, highest preference first.
#[derive(Clone)]
pub struct VersionTable {
    entries: Vec<(VersionId, ClientConstructor)>,
}

impl VersionTable {
    /// Creates an empty table. Nothing negotiates against it until entries
    /// are added.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends `version` at the lowest preference so far.
    pub fn with(mut self, version: VersionId, constructor: ClientConstructor) -> Self {
        self.entries.push((version, constructor));
        self
    }

    /// Versions in preference order.
    pub fn versions(&self) -> impl Iterator<Item = &VersionId> {
        self.entries.iter().map(|(version, _)| version)
    }

    /// Picks the preferred version `manifest` supports and builds its client.
    pub fn instantiate(
        &self,
        manifest: &Manifest,
        context: &ClientContext,
    ) -> Result<Arc<dyn ProtocolClient>> {
        let chosen = match negotiate(manifest, self.versions()) {
            Ok(version) => version,
            Err(err) => {
                warn!(offered = ?manifest.versions, "no mutually supported bare version");
                return Err(err);
            }
        };
        let (_, constructor) = self
            .entries
            .iter()
            .find(|(version, _)| version == chosen)
            .ok_or_else(|| BareClientError::UnsupportedVersion {
                offered: manifest.versions.clone(),
            })?;
        debug!(version = %chosen, "negotiated bare version");
        constructor(context)
    }
}

impl Default for VersionTable {
    /// `v3`, then `v2`, then `v1`.
    fn default() -> Self {
        Self::new()
            .with(VersionId::v3(), ClientV3::construct)
            .with(VersionId::v2(), ClientV2::construct)
            .with(VersionId::v1(), ClientV1::construct)
    }
}

impl fmt::Debug for VersionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.versions()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preference() -> Vec<VersionId> {
        VersionTable::default().versions().cloned().collect()
    }

    #[test]
    fn default_preference_is_newest_first() {
        assert_eq!(preference(), [VersionId::v3(), VersionId::v2(), VersionId::v1()]);
    }

    #[test]
    fn picks_highest_mutual_version() {
        let manifest = Manifest::with_versions(["v1", "v3"]);
        let preference = preference();
        assert_eq!(negotiate(&manifest, &preference).unwrap(), &VersionId::v3());
    }

    #[test]
    fn falls_back_to_older_versions() {
        let manifest = Manifest::with_versions(["v1"]);
        let preference = preference();
        assert_eq!(negotiate(&manifest, &preference).unwrap(), &VersionId::v1());
    }

    #[test]
    fn unknown_versions_only_is_unsupported() {
        let manifest = Manifest::with_versions(["v9"]);
        let preference = preference();
        assert_eq!(
            negotiate(&manifest, &preference).unwrap_err(),
            BareClientError::UnsupportedVersion {
                offered: vec!["v9".into()]
            }
        );
    }

    #[test]
    fn empty_table_supports_nothing() {
        let manifest = Manifest::with_versions(["v3"]);
        let table = VersionTable::new();
        assert!(matches!(
            negotiate(&manifest, table.versions()),
            Err(BareClientError::UnsupportedVersion { .. })
        ));
    }
}
