//! Addressing between an uploaded asset and its variants.
//!
//! The variant for profile `P` of input `X.mp4` lives at `X/X-P.mp4` in the
//! processed bucket. Nothing else links an input to its outputs.

use crate::common::profile::{TranscodeProfile, PROFILES};
use thiserror::Error;

pub const VARIANT_EXTENSION: &str = "mp4";
pub const VARIANT_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("Asset name is empty")]
    Empty,

    #[error("Asset name '{0}' has nothing before its first '.'")]
    EmptyBase(String),

    #[error("Asset name '{0}' contains a path separator or control character")]
    IllegalCharacter(String),
}

/// Reject names that cannot be safely turned into variant keys.
pub fn validate_asset_name(asset: &str) -> Result<(), NamingError> {
    if asset.is_empty() {
        return Err(NamingError::Empty);
    }
    if asset.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(NamingError::IllegalCharacter(asset.to_string()));
    }
    if base_name(asset).is_empty() {
        return Err(NamingError::EmptyBase(asset.to_string()));
    }
    Ok(())
}

/// Everything before the first `.`.
///
/// `my.video.mp4` and `my.mp4` share the base `my`; see DESIGN.md.
pub fn base_name(asset: &str) -> &str {
    asset.split('.').next().unwrap_or(asset)
}

pub fn variant_file_name(asset: &str, profile: &TranscodeProfile) -> String {
    format!("{}-{}.{}", base_name(asset), profile.name, VARIANT_EXTENSION)
}

pub fn variant_key(asset: &str, profile: &TranscodeProfile) -> String {
    format!("{}/{}", base_name(asset), variant_file_name(asset, profile))
}

/// Expected variant keys for `asset`, in profile order.
pub fn variant_keys(asset: &str) -> Vec<(TranscodeProfile, String)> {
    PROFILES
        .iter()
        .map(|profile| (*profile, variant_key(asset, profile)))
        .collect()
}
