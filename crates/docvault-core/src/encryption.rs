//! AES-256-GCM envelopes keyed per tenant.
//!
//! Every payload gets a fresh random 16-byte IV. Ciphertext, IV and the detached
//! 16-byte tag are stored base64-encoded in an [`EncryptionEnvelope`].

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::key_derivation::{KeyDeriver, Pbkdf2KeyDeriver, TenantId};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// IV length in bytes.
pub const IV_LEN: usize = 16;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Ciphertext, IV and authentication tag, each base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionEnvelope {
    /// Encrypted payload
    pub ciphertext: String,
    /// Single-use initialization vector
    pub iv: String,
    /// GCM authentication tag
    pub auth_tag: String,
}

impl EncryptionEnvelope {
    /// Serialize as one JSON field (`{"ciphertext","iv","authTag"}`).
    pub fn to_json(&self) -> VaultResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a serialized envelope. A malformed field is an integrity failure.
    pub fn from_json(raw: &str) -> VaultResult<Self> {
        serde_json::from_str(raw).map_err(|_| VaultError::Integrity)
    }

    fn decode(&self) -> VaultResult<(Vec<u8>, [u8; IV_LEN], [u8; TAG_LEN])> {
        let ciphertext = BASE64
            .decode(&self.ciphertext)
            .map_err(|_| VaultError::Integrity)?;
        let iv = decode_fixed::<IV_LEN>(&self.iv)?;
        let tag = decode_fixed::<TAG_LEN>(&self.auth_tag)?;
        Ok((ciphertext, iv, tag))
    }
}

pub(crate) fn decode_fixed<const N: usize>(encoded: &str) -> VaultResult<[u8; N]> {
    let bytes = BASE64.decode(encoded).map_err(|_| VaultError::Integrity)?;
    bytes.try_into().map_err(|_| VaultError::Integrity)
}

/// Raw AES-GCM output, before base64 encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// Ciphertext, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// IV used for this payload
    pub iv: [u8; IV_LEN],
    /// Detached authentication tag
    pub auth_tag: [u8; TAG_LEN],
}

impl From<SealedPayload> for EncryptionEnvelope {
    fn from(sealed: SealedPayload) -> Self {
        EncryptionEnvelope {
            ciphertext: BASE64.encode(&sealed.ciphertext),
            iv: BASE64.encode(sealed.iv),
            auth_tag: BASE64.encode(sealed.auth_tag),
        }
    }
}

/// Generate a cryptographically random 16-byte IV
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// A cipher bound to one tenant's derived key.
///
/// Derive once per processing run, then seal any number of chunks with it.
pub struct TenantCipher {
    tenant: TenantId,
    key_id: String,
    cipher: Aes256Gcm16,
}

impl std::fmt::Debug for TenantCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCipher")
            .field("tenant", &self.tenant)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl TenantCipher {
    /// Tenant this cipher was derived for.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Derivation epoch tag.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypt under a fresh IV, returning raw bytes.
    pub fn seal(&self, plaintext: &[u8]) -> VaultResult<SealedPayload> {
        let iv = random_iv();
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;
        let mut auth_tag = [0u8; TAG_LEN];
        auth_tag.copy_from_slice(&tag);
        Ok(SealedPayload {
            ciphertext: buffer,
            iv,
            auth_tag,
        })
    }

    /// Verify and decrypt raw bytes. Returns [`VaultError::Integrity`] on any mismatch.
    pub fn open(
        &self,
        mut ciphertext: Vec<u8>,
        iv: &[u8; IV_LEN],
        auth_tag: &[u8; TAG_LEN],
    ) -> VaultResult<Vec<u8>> {
        self.cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(iv),
                b"",
                &mut ciphertext,
                Tag::from_slice(auth_tag),
            )
            .map_err(|_| VaultError::Integrity)?;
        Ok(ciphertext)
    }

    /// Encrypt under a fresh IV into a base64 envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<EncryptionEnvelope> {
        Ok(self.seal(plaintext)?.into())
    }

    /// Decrypt and verify an envelope.
    pub fn decrypt(&self, envelope: &EncryptionEnvelope) -> VaultResult<Vec<u8>> {
        let (ciphertext, iv, tag) = envelope.decode()?;
        self.open(ciphertext, &iv, &tag)
    }
}

/// Stateless tenant-keyed encryption; cheap to clone and share across tasks.
#[derive(Clone)]
pub struct EncryptionCodec {
    deriver: Arc<dyn KeyDeriver>,
}

impl std::fmt::Debug for EncryptionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionCodec")
            .field("key_id", &self.deriver.key_id())
            .finish()
    }
}

impl EncryptionCodec {
    /// Create a codec over any key derivation scheme.
    pub fn new(deriver: Arc<dyn KeyDeriver>) -> Self {
        Self { deriver }
    }

    /// Create a PBKDF2-backed codec from configuration.
    pub fn from_config(config: &VaultConfig) -> VaultResult<Self> {
        Ok(Self::new(Arc::new(Pbkdf2KeyDeriver::from_config(config)?)))
    }

    /// Tag of the key derivation epoch in use.
    pub fn key_id(&self) -> &str {
        self.deriver.key_id()
    }

    /// Derive the tenant key and build a reusable cipher.
    pub fn cipher_for(&self, tenant: &TenantId) -> VaultResult<TenantCipher> {
        let key = self.deriver.derive(tenant)?;
        let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;
        Ok(TenantCipher {
            tenant: tenant.clone(),
            key_id: self.deriver.key_id().to_string(),
            cipher,
        })
    }

    /// [`cipher_for`](Self::cipher_for) on the blocking pool, keeping the
    /// CPU-bound key derivation off the async workers.
    pub async fn derive_cipher(&self, tenant: &TenantId) -> VaultResult<TenantCipher> {
        let codec = self.clone();
        let tenant = tenant.clone();
        tokio::task::spawn_blocking(move || codec.cipher_for(&tenant))
            .await
            .map_err(|e| VaultError::Encryption(format!("key derivation task failed: {}", e)))?
    }

    /// Encrypt `plaintext` for `tenant`.
    pub fn encrypt(&self, plaintext: &[u8], tenant: &TenantId) -> VaultResult<EncryptionEnvelope> {
        self.cipher_for(tenant)?.encrypt(plaintext)
    }

    /// Decrypt base64 parts for `tenant`.
    pub fn decrypt(
        &self,
        ciphertext: &str,
        iv: &str,
        auth_tag: &str,
        tenant: &TenantId,
    ) -> VaultResult<Vec<u8>> {
        let envelope = EncryptionEnvelope {
            ciphertext: ciphertext.to_string(),
            iv: iv.to_string(),
            auth_tag: auth_tag.to_string(),
        };
        self.decrypt_envelope(&envelope, tenant)
    }

    /// Decrypt a whole envelope for `tenant`.
    pub fn decrypt_envelope(
        &self,
        envelope: &EncryptionEnvelope,
        tenant: &TenantId,
    ) -> VaultResult<Vec<u8>> {
        self.cipher_for(tenant)?.decrypt(envelope)
    }
}
