use crate::common::naming::{self, NamingError};
use crate::common::profile::TranscodeProfile;
use crate::infrastructure::storage::{ObjectStore, StorageError};
use futures_util::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error(transparent)]
    InvalidName(#[from] NamingError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantHandle {
    pub profile: TranscodeProfile,
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessResult {
    pub asset_name: String,
    pub all_ready: bool,
    /// Empty unless `all_ready`; otherwise one entry per profile, in profile order.
    pub variants: Vec<VariantHandle>,
}

impl ReadinessResult {
    fn pending(asset: &str) -> Self {
        Self {
            asset_name: asset.to_string(),
            all_ready: false,
            variants: Vec::new(),
        }
    }
}

/// Answers "are all variants of this asset in the processed bucket yet".
///
/// Holds no state of its own: the presence of the variant objects is the
/// whole truth. An asset that was never uploaded looks exactly like one that
/// is still being transcoded.
pub struct ReadinessOracle {
    store: Arc<dyn ObjectStore>,
    link_ttl: Duration,
}

impl ReadinessOracle {
    pub fn new(store: Arc<dyn ObjectStore>, link_ttl: Duration) -> Self {
        Self { store, link_ttl }
    }

    pub async fn check(&self, asset: &str) -> Result<ReadinessResult, ReadinessError> {
        naming::validate_asset_name(asset)?;
        let expected = naming::variant_keys(asset);

        let present = try_join_all(expected.iter().map(|(_, key)| self.store.exists(key))).await?;

        if let Some(((profile, key), _)) = expected.iter().zip(&present).find(|(_, exists)| !**exists) {
            debug!(asset, profile = profile.name, key = %key, "Variant not present yet");
            return Ok(ReadinessResult::pending(asset));
        }

        let resolved = try_join_all(
            expected
                .iter()
                .map(|(profile, key)| self.resolve(asset, profile, key)),
        )
        .await;

        match resolved {
            Ok(variants) => Ok(ReadinessResult {
                asset_name: asset.to_string(),
                all_ready: true,
                variants,
            }),
            // Removed between the existence probe and the metadata read.
            Err(StorageError::NotFound(key)) => {
                debug!(asset, key = %key, "Variant vanished during lookup");
                Ok(ReadinessResult::pending(asset))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(
        &self,
        asset: &str,
        profile: &TranscodeProfile,
        key: &str,
    ) -> Result<VariantHandle, StorageError> {
        let disposition = format!(
            "attachment; filename=\"{}\"",
            naming::variant_file_name(asset, profile)
        );

        let (url, size_bytes) = tokio::try_join!(
            self.store.signed_url(key, self.link_ttl, &disposition),
            self.store.size(key),
        )?;

        Ok(VariantHandle {
            profile: *profile,
            url,
            size_bytes,
        })
    }
}
