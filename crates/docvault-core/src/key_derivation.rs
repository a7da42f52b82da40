//! Per-tenant key derivation from the process master secret.
//!
//! Tenant keys are recomputed on demand and never persisted. The tenant id is
//! used directly as the PBKDF2 salt; [`KeyDeriver`] is the seam for swapping in
//! a scheme with a random per-tenant salt stored beside the tenant record.

use crate::config::{MasterSecret, VaultConfig};
use crate::error::{VaultError, VaultResult};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;
/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;
/// Key id recorded on every envelope produced by the default deriver.
pub const DEFAULT_KEY_ID: &str = "pbkdf2-sha256-v1";

/// Identifier of the tenant owning a document. Always supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Wrap a tenant identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// 256-bit symmetric key bound to one tenant. Not serializable.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TenantKey([u8; KEY_LEN]);

impl TenantKey {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TenantKey([REDACTED])")
    }
}

/// Key derivation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// PBKDF2 iteration count
    pub iterations: u32,
    /// Opaque tag naming the derivation epoch, stored with each blob
    pub key_id: String,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            key_id: DEFAULT_KEY_ID.to_string(),
        }
    }
}

impl KdfConfig {
    /// Reject a zero iteration count or an empty key id.
    pub fn validate(&self) -> VaultResult<()> {
        if self.iterations == 0 {
            return Err(VaultError::Configuration(
                "kdf.iterations must be greater than zero".into(),
            ));
        }
        if self.key_id.trim().is_empty() {
            return Err(VaultError::Configuration("kdf.key_id must not be empty".into()));
        }
        Ok(())
    }
}

/// Derives tenant keys. Implementations must be deterministic per tenant.
pub trait KeyDeriver: Send + Sync {
    /// Derive the key for `tenant`.
    fn derive(&self, tenant: &TenantId) -> VaultResult<TenantKey>;

    /// Tag identifying the derivation scheme and epoch.
    fn key_id(&self) -> &str;
}

/// PBKDF2-HMAC-SHA-256 over the master secret, salted with the tenant id.
pub struct Pbkdf2KeyDeriver {
    secret: MasterSecret,
    iterations: u32,
    key_id: String,
}

impl std::fmt::Debug for Pbkdf2KeyDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pbkdf2KeyDeriver")
            .field("iterations", &self.iterations)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl Pbkdf2KeyDeriver {
    /// Create a deriver from an explicit secret and parameters.
    pub fn new(secret: MasterSecret, kdf: &KdfConfig) -> VaultResult<Self> {
        if secret.is_blank() {
            return Err(VaultError::Configuration("master secret is empty".into()));
        }
        kdf.validate()?;
        Ok(Self {
            secret,
            iterations: kdf.iterations,
            key_id: kdf.key_id.clone(),
        })
    }

    /// Create a deriver from the process configuration.
    /// Fails with [`VaultError::Configuration`] if no master secret is set.
    pub fn from_config(config: &VaultConfig) -> VaultResult<Self> {
        let secret = config.require_master_secret()?.clone();
        Self::new(secret, &config.kdf)
    }
}

impl KeyDeriver for Pbkdf2KeyDeriver {
    fn derive(&self, tenant: &TenantId) -> VaultResult<TenantKey> {
        if tenant.as_str().is_empty() {
            return Err(VaultError::Encryption("tenant id must not be empty".into()));
        }
        let mut okm = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(
            self.secret.expose_bytes(),
            tenant.as_str().as_bytes(),
            self.iterations,
            &mut okm,
        );
        Ok(TenantKey(okm))
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_kdf() -> KdfConfig {
        KdfConfig {
            iterations: 1_000,
            ..Default::default()
        }
    }

    fn deriver(secret: &str) -> Pbkdf2KeyDeriver {
        Pbkdf2KeyDeriver::new(MasterSecret::new(secret), &fast_kdf()).unwrap()
    }

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn rfc7914_test_vector() {
        let kdf = KdfConfig {
            iterations: 1,
            ..Default::default()
        };
        let d = Pbkdf2KeyDeriver::new(MasterSecret::new("password"), &kdf).unwrap();
        let key = d.derive(&TenantId::new("salt")).unwrap();
        assert_eq!(
            to_hex(key.as_bytes()),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let d = deriver("master");
        let t = TenantId::new("tenant-a");
        assert_eq!(
            d.derive(&t).unwrap().as_bytes(),
            d.derive(&t).unwrap().as_bytes()
        );
    }

    #[test]
    fn different_tenants_get_different_keys() {
        let d = deriver("master");
        let k1 = d.derive(&TenantId::new("tenant-a")).unwrap();
        let k2 = d.derive(&TenantId::new("tenant-b")).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_secrets_get_different_keys() {
        let t = TenantId::new("tenant-a");
        let k1 = deriver("secret-one").derive(&t).unwrap();
        let k2 = deriver("secret-two").derive(&t).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn missing_secret_is_configuration_error() {
        let config = VaultConfig::default();
        assert!(matches!(
            Pbkdf2KeyDeriver::from_config(&config),
            Err(VaultError::Configuration(_))
        ));
        assert!(matches!(
            Pbkdf2KeyDeriver::new(MasterSecret::new(""), &fast_kdf()),
            Err(VaultError::Configuration(_))
        ));
    }

    #[test]
    fn empty_tenant_rejected() {
        assert!(deriver("master").derive(&TenantId::new("")).is_err());
    }

    #[test]
    fn key_is_redacted_in_debug() {
        let key = deriver("master").derive(&TenantId::new("t")).unwrap();
        assert_eq!(format!("{:?}", key), "TenantKey([REDACTED])");
        let d = deriver("super-secret");
        assert!(!format!("{:?}", d).contains("super-secret"));
    }

    #[test]
    fn key_id_comes_from_config() {
        let kdf = KdfConfig {
            iterations: 10,
            key_id: "epoch-7".into(),
        };
        let d = Pbkdf2KeyDeriver::new(MasterSecret::new("m"), &kdf).unwrap();
        assert_eq!(d.key_id(), "epoch-7");
    }
}
