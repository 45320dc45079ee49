//! Asset list handling
//!
//! The asset list is an explicit configuration input: an ordered sequence of
//! resource identifiers resolved against the origin at install time.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::request::RequestKey;
use crate::{CoreError, Result};

/// Ordered list of resource identifiers to precache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetList(Vec<String>);

impl AssetList {
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(assets.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Resolve every identifier against `origin`.
    ///
    /// Order is preserved. Identifiers that resolve to the same request
    /// identity are collapsed onto their first occurrence. A blank or
    /// unparseable identifier fails the whole list.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.0.len());

        for asset in &self.0 {
            if asset.trim().is_empty() {
                return Err(CoreError::asset_failed(
                    "CACHE_POPULATE_INVALID_ASSET",
                    "Asset identifier is empty",
                    asset.clone(),
                    None,
                ));
            }

            let url = origin.join(asset).map_err(|e| {
                CoreError::asset_failed(
                    "CACHE_POPULATE_INVALID_ASSET",
                    format!("Asset identifier does not resolve to a URL: {}", e),
                    asset.clone(),
                    None,
                )
            })?;

            if seen.insert(RequestKey::get(&url)) {
                resolved.push(url);
            }
        }

        Ok(resolved)
    }
}

impl<S: Into<String>> FromIterator<S> for AssetList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
