//! Whole-file encryption on top of an [`ObjectStore`].

use crate::document::{BlobEnvelope, DocumentId};
use crate::encryption::{decode_fixed, EncryptionCodec, IV_LEN, TAG_LEN};
use crate::error::VaultResult;
use crate::key_derivation::TenantId;
use crate::object_store::ObjectStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Result of an encrypted upload: where the ciphertext lives and how to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUpload {
    /// Object store key
    pub locator: String,
    /// Base64 IV
    pub iv: String,
    /// Base64 authentication tag
    pub auth_tag: String,
    /// Key derivation epoch
    pub key_id: String,
}

impl BlobUpload {
    /// Envelope to persist on the document record.
    pub fn envelope(&self) -> BlobEnvelope {
        BlobEnvelope {
            iv: self.iv.clone(),
            auth_tag: self.auth_tag.clone(),
            key_id: self.key_id.clone(),
        }
    }
}

/// Encrypts files before they reach the object store and decrypts on the way back.
#[derive(Clone)]
pub struct BlobAdapter {
    store: Arc<dyn ObjectStore>,
    codec: EncryptionCodec,
}

impl BlobAdapter {
    /// Create an adapter over a store and codec.
    pub fn new(store: Arc<dyn ObjectStore>, codec: EncryptionCodec) -> Self {
        Self { store, codec }
    }

    /// Locator for a document's blob: `{tenant}/{workspace}/{document}`.
    pub fn locator_for(tenant: &TenantId, workspace_id: &str, document_id: DocumentId) -> String {
        format!("{}/{}/{}", tenant, workspace_id, document_id)
    }

    /// Encrypt `file` for `tenant` and store the ciphertext at `path`.
    #[instrument(skip(self, file), fields(bytes = file.len()))]
    pub async fn upload_encrypted(
        &self,
        file: &[u8],
        path: &str,
        tenant: &TenantId,
    ) -> VaultResult<BlobUpload> {
        let cipher = self.codec.derive_cipher(tenant).await?;
        let sealed = cipher.seal(file)?;
        self.store.put(path, Bytes::from(sealed.ciphertext)).await?;
        debug!(locator = path, "encrypted blob stored");
        Ok(BlobUpload {
            locator: path.to_string(),
            iv: BASE64.encode(sealed.iv),
            auth_tag: BASE64.encode(sealed.auth_tag),
            key_id: cipher.key_id().to_string(),
        })
    }

    /// Fetch and decrypt a blob. `NotFound` if the locator does not resolve,
    /// `Integrity` if the tag does not verify for `tenant`.
    #[instrument(skip(self, iv, auth_tag))]
    pub async fn download_and_decrypt(
        &self,
        locator: &str,
        iv: &str,
        auth_tag: &str,
        tenant: &TenantId,
    ) -> VaultResult<Vec<u8>> {
        let iv = decode_fixed::<IV_LEN>(iv)?;
        let tag = decode_fixed::<TAG_LEN>(auth_tag)?;
        let ciphertext = self.store.get(locator).await?;
        self.codec
            .derive_cipher(tenant)
            .await?
            .open(ciphertext.to_vec(), &iv, &tag)
    }

    /// Remove a blob. Best effort: failures are logged and reported as `false`.
    pub async fn delete(&self, locator: &str) -> bool {
        match self.store.delete(locator).await {
            Ok(()) => {
                debug!(locator, "blob deleted");
                true
            }
            Err(e) => {
                warn!(locator, error = %e, "blob delete failed, continuing");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterSecret;
    use crate::error::VaultError;
    use crate::key_derivation::{KdfConfig, Pbkdf2KeyDeriver};
    use crate::object_store::MemoryObjectStore;

    fn adapter() -> (BlobAdapter, Arc<MemoryObjectStore>) {
        let kdf = KdfConfig {
            iterations: 64,
            ..Default::default()
        };
        let deriver = Pbkdf2KeyDeriver::new(MasterSecret::new("blob-test"), &kdf).unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let codec = EncryptionCodec::new(Arc::new(deriver));
        (BlobAdapter::new(store.clone(), codec), store)
    }

    #[tokio::test]
    async fn upload_then_download() {
        let (blobs, store) = adapter();
        let tenant = TenantId::new("acme");
        let up = blobs
            .upload_encrypted(b"quarterly numbers", "acme/ws/1", &tenant)
            .await
            .unwrap();
        assert_eq!(up.locator, "acme/ws/1");
        assert_eq!(up.key_id, "pbkdf2-sha256-v1");

        let stored = store.get("acme/ws/1").await.unwrap();
        assert_ne!(stored.as_ref(), b"quarterly numbers");

        let plain = blobs
            .download_and_decrypt(&up.locator, &up.iv, &up.auth_tag, &tenant)
            .await
            .unwrap();
        assert_eq!(plain, b"quarterly numbers");
    }

    #[tokio::test]
    async fn other_tenant_cannot_decrypt() {
        let (blobs, _) = adapter();
        let up = blobs
            .upload_encrypted(b"secret", "a/ws/1", &TenantId::new("a"))
            .await
            .unwrap();
        let result = blobs
            .download_and_decrypt(&up.locator, &up.iv, &up.auth_tag, &TenantId::new("b"))
            .await;
        assert!(matches!(result, Err(VaultError::Integrity)));
    }

    #[tokio::test]
    async fn tampered_blob_fails_integrity() {
        let (blobs, store) = adapter();
        let tenant = TenantId::new("a");
        let up = blobs.upload_encrypted(b"payload", "k", &tenant).await.unwrap();
        let mut bytes = store.get("k").await.unwrap().to_vec();
        bytes[0] ^= 0x01;
        store.put("k", Bytes::from(bytes)).await.unwrap();
        let result = blobs
            .download_and_decrypt("k", &up.iv, &up.auth_tag, &tenant)
            .await;
        assert!(matches!(result, Err(VaultError::Integrity)));
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let (blobs, _) = adapter();
        let tenant = TenantId::new("a");
        let up = blobs.upload_encrypted(b"x", "k", &tenant).await.unwrap();
        let result = blobs
            .download_and_decrypt("other", &up.iv, &up.auth_tag, &tenant)
            .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_is_best_effort() {
        let (blobs, store) = adapter();
        blobs
            .upload_encrypted(b"x", "k", &TenantId::new("a"))
            .await
            .unwrap();
        assert!(blobs.delete("k").await);
        assert!(store.is_empty().await);
        assert!(!blobs.delete("k").await);
    }

    #[test]
    fn locator_layout() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            BlobAdapter::locator_for(&TenantId::new("t1"), "ws9", id),
            "t1/ws9/00000000-0000-0000-0000-000000000000"
        );
    }
}
