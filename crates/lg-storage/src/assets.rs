//! Image asset uploads for condition reports.

use lg_models::AssetRef;
use tracing::info;
use uuid::Uuid;

use crate::client::R2Client;
use crate::error::StorageResult;

/// Key prefix under which report stills are stored.
pub const ASSET_PREFIX: &str = "condition-reports/assets";

/// Content type of uploaded stills.
pub const ASSET_CONTENT_TYPE: &str = "image/jpeg";

/// Fresh object key for a still.
pub fn asset_key() -> String {
    format!("{}/{}.jpg", ASSET_PREFIX, Uuid::new_v4())
}

impl R2Client {
    /// Upload a JPEG still and return a reference to it.
    pub async fn upload_image_asset(&self, bytes: Vec<u8>) -> StorageResult<AssetRef> {
        let key = asset_key();
        let size = bytes.len();

        self.upload_bytes(bytes, &key, ASSET_CONTENT_TYPE).await?;

        info!(key = %key, bytes = size, "Uploaded image asset");
        Ok(AssetRef::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_key_shape() {
        let key = asset_key();
        assert!(key.starts_with("condition-reports/assets/"));
        assert!(key.ends_with(".jpg"));
        let id = key
            .trim_start_matches("condition-reports/assets/")
            .trim_end_matches(".jpg");
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_asset_keys_are_unique() {
        assert_ne!(asset_key(), asset_key());
    }
}
