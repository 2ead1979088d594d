//! CredentialVault: envelope encryption for TOTP secrets, bcrypt
//! hashing for passwords and runner API keys, and high-entropy token
//! generation for sessions, CSRF, and enrollment.
//!
//! Encrypted TOTP secrets are stored in the format:
//! `ENC[AES256-GCM,data:<b64>,iv:<b64>,tag:<b64>]`
//!
//! The master key backing that encryption lives in a file with owner-only
//! permissions, generated on first use if absent. The [`MasterKey`]
//! wrapper zeroizes key material on drop.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use aes_gcm::aead::{Aead, KeyInit, OsRng as AeadOsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64_URL;
use rand::RngCore;
use rand::rngs::OsRng;
use regex::Regex;
use thiserror::Error;
use totp_rs::{Algorithm, TOTP};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use secrecy::{ExposeSecret, Secret, SecretString};

/// Compiled regex for parsing `ENC[AES256-GCM,data:<b64>,iv:<b64>,tag:<b64>]`.
static ENC_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^ENC\[AES256-GCM,data:([A-Za-z0-9+/=]+),iv:([A-Za-z0-9+/=]+),tag:([A-Za-z0-9+/=]+)\]$",
        )
        .expect("ENC regex is valid")
});

/// A bcrypt hash of a password nobody can ever enter, used as the comparison
/// target on the "user does not exist" path so login timing does not leak
/// account existence.
static DUMMY_PASSWORD_HASH: LazyLock<String> = LazyLock::new(|| {
        bcrypt::hash("rfctl-dummy-comparison-target", bcrypt::DEFAULT_COST)
        .expect("dummy hash computes")
});

/// A 32-byte AES-256 master key that is zeroized when dropped.
///
/// The [`Debug`] implementation is redacted to avoid accidental logging. Raw
/// bytes are not accessible outside this crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Load the master key from `path`, generating and atomically writing a
    /// fresh one if the file doesn't exist yet.
    ///
    /// The file is created with `0600` permissions on unix; on other
    /// platforms the filesystem's default ACLs apply, since std has no
    /// portable equivalent.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes)
                .map_err(|e| CryptoError::InvalidKey(format!("key file is not UTF-8: {e}")))?;
                parse_master_key(&text)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let mut raw = [0u8; 32];
                OsRng.fill_bytes(&mut raw);
                let key = MasterKey(raw);
                key.write_atomically(path)?;
                Ok(key)
            }
            Err(e) => Err(CryptoError::Io(e)),
        }
    }

    fn write_atomically(&self, path: &Path) -> Result<(), CryptoError> {
        let tmp_path = path.with_extension("tmp");
        let hex_key = hex::encode(self.0);
        fs::write(&tmp_path, &hex_key).map_err(CryptoError::Io)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))
            .map_err(CryptoError::Io)?;
        }
        fs::rename(&tmp_path, path).map_err(CryptoError::Io)?;
        Ok(())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Errors that can occur during credential-vault operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid master key: {0}")]
    InvalidKey(String),

    #[error("invalid encrypted value: {0}")]
    InvalidFormat(String),

    #[error("decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("key file i/o failed: {0}")]
    Io(#[source] io::Error),

    #[error("password hashing failed: {0}")]
    Hash(#[source] bcrypt::BcryptError),
}

/// Parse a 32-byte master key from hex or base64.
pub fn parse_master_key(raw: &str) -> Result<MasterKey, CryptoError> {
    let trimmed = raw.trim();
    if trimmed.len() == 64
    && let Ok(bytes) = hex::decode(trimmed)
    && bytes.len() == 32
    {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        return Ok(MasterKey(key));
    }
    if let Ok(bytes) = B64.decode(trimmed)
    && bytes.len() == 32
    {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        return Ok(MasterKey(key));
    }
    Err(CryptoError::InvalidKey(
            "must be 32 bytes encoded as 64 hex chars or base64".to_owned(),
    ))
}

/// Returns `true` if `value` looks like an `ENC[AES256-GCM,...]` envelope.
#[must_use]
pub fn is_encrypted(value: &str) -> bool {
    ENC_RE.is_match(value.trim())
}

fn decrypt_value(value: &str, master_key: &MasterKey) -> Result<SecretString, CryptoError> {
    let trimmed = value.trim();

    let Some(caps) = ENC_RE.captures(trimmed) else {
        return Ok(SecretString::new(value.to_owned()));
    };

    let data = B64
    .decode(&caps[1])
    .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64 in data: {e}")))?;
    let iv = B64
    .decode(&caps[2])
    .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64 in iv: {e}")))?;
    let tag = B64
    .decode(&caps[3])
    .map_err(|e| CryptoError::InvalidFormat(format!("invalid base64 in tag: {e}")))?;

    if iv.len() != 12 {
        return Err(CryptoError::InvalidFormat(format!(
                    "IV must be 12 bytes, got {}",
                    iv.len())));
    }
    if tag.len() != 16 {
        return Err(CryptoError::InvalidFormat(format!(
                    "tag must be 16 bytes, got {}",
                    tag.len())));
    }

    let mut ciphertext = data;
    ciphertext.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new_from_slice(master_key.as_bytes())
    .map_err(|e| CryptoError::InvalidKey(format!("invalid AES key: {e}")))?;
    let nonce = Nonce::from_slice(&iv);

    let plaintext = cipher
    .decrypt(nonce, ciphertext.as_ref())
    .map_err(|_| CryptoError::DecryptionFailed)?;

    let s = String::from_utf8(plaintext)
    .map_err(|e| CryptoError::InvalidFormat(format!("decrypted value is not UTF-8: {e}")))?;

    Ok(SecretString::new(s))
}

fn encrypt_value(plaintext: &str, master_key: &MasterKey) -> Result<String, CryptoError> {
    use aes_gcm::AeadCore;

    let cipher = Aes256Gcm::new_from_slice(master_key.as_bytes())
    .map_err(|e| CryptoError::InvalidKey(format!("invalid AES key: {e}")))?;
    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
    .encrypt(&nonce, plaintext.as_bytes())
    .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let (data, tag) = ciphertext.split_at(ciphertext.len() - 16);

    Ok(format!(
            "ENC[AES256-GCM,data:{},iv:{},tag:{}]",
            B64.encode(data),
            B64.encode(nonce.as_slice()),
            B64.encode(tag),
    ))
}

/// Encrypts and decrypts TOTP secrets at rest.
///
/// Decryption failure (corrupt envelope, wrong key) returns `None` rather
/// than an error: callers treat an unreadable secret the same as "no TOTP
/// configured" rather than surfacing a 500. Legacy unencrypted rows are
/// handled by [`migrate_legacy_totp_secret`], not by a decrypt fallback.
pub struct CredentialVault {
    key: MasterKey,
}

impl CredentialVault {
    #[must_use]
    pub fn new(key: MasterKey) -> Self {
        Self { key }
    }

    /// Encrypt a raw base32 TOTP secret into its `ENC[...]` envelope.
    pub fn encrypt_totp(&self, secret: &str) -> Result<String, CryptoError> {
        encrypt_value(secret, &self.key)
    }

    /// Decrypt a stored TOTP envelope back to the raw secret, or `None` if
    /// the envelope is corrupt or was encrypted under a different key.
    #[must_use]
    pub fn decrypt_totp(&self, stored: &str) -> Option<SecretString> {
        if !is_encrypted(stored) {
            return None;
        }
        decrypt_value(stored, &self.key).ok()
    }

    /// One-shot migration of a legacy unencrypted TOTP secret: rows whose
    /// stored value is not already an `ENC[...]` envelope are re-encrypted
    /// in place. Returns `None` if `stored` is already encrypted (no-op).
    #[must_use]
    pub fn migrate_legacy_totp_secret(&self, stored: &str) -> Option<String> {
        if is_encrypted(stored) || stored.trim().is_empty() {
            return None;
        }
        self.encrypt_totp(stored).ok()
    }

    /// Checks a 6-digit TOTP code against a (decrypted) base32 secret,
    /// tolerating ±1 step (30s) of clock skew.
    pub fn check_totp_code(secret: &str, code: &str, unix_time: u64) -> Result<bool, CryptoError> {
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret.as_bytes().to_vec(),
        )
        .map_err(|e| CryptoError::InvalidFormat(format!("invalid TOTP secret: {e}")))?;
        Ok(totp.check(code, unix_time))
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialVault([REDACTED])")
    }
}

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(CryptoError::Hash)
}

/// Verify a password against its bcrypt hash. `bcrypt::verify` already runs
/// in time independent of where the mismatch occurs; callers on the
/// "user does not exist" path should still call this against
/// [`dummy_password_hash`] so overall login timing doesn't leak account
/// existence.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// A fixed bcrypt hash nobody's password will ever match, for the
/// non-existent-user comparison path.
#[must_use]
pub fn dummy_password_hash() -> &'static str {
    &DUMMY_PASSWORD_HASH
}

/// Hash a runner API key with the same function used for passwords.
pub fn hash_api_key(key: &str) -> Result<String, CryptoError> {
    hash_password(key)
}

/// Verify a runner API key against its stored hash.
#[must_use]
pub fn verify_api_key(key: &str, hash: &str) -> bool {
    verify_password(key, hash)
}

fn random_token_hex(byte_len: usize) -> String {
    let mut buf = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

fn random_token_urlsafe(byte_len: usize) -> String {
    let mut buf = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut buf);
    B64_URL.encode(buf)
}

/// Generate a fresh runner API key: 32 bytes (256 bits) of CSPRNG output,
/// hex-encoded so it's safe to paste into a runner config file.
#[must_use]
pub fn generate_api_key() -> String {
    format!("rfctl_{}", random_token_hex(32))
}

/// Generate a fresh opaque session token: 32 bytes, URL-safe
/// base64, suitable for a cookie value.
#[must_use]
pub fn generate_session_token() -> String {
    random_token_urlsafe(32)
}

/// Generate a fresh CSRF token.
#[must_use]
pub fn generate_csrf_token() -> String {
    random_token_urlsafe(32)
}

/// Generate a fresh enrollment token.
#[must_use]
pub fn generate_enrollment_token() -> String {
    random_token_urlsafe(32)
}

/// Generate a fresh base32 TOTP secret suitable for a provisioning URI.
#[must_use]
pub fn generate_totp_secret() -> String {
    totp_rs::Secret::generate_secret().to_encoded().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_key() -> MasterKey {
        parse_master_key(&"42".repeat(32)).unwrap()
    }

    #[test]
    fn roundtrip_encrypt_decrypt() {
        let key = test_key();
        let plaintext = "my-totp-secret";
        let encrypted = encrypt_value(plaintext, &key).unwrap();
        assert!(encrypted.starts_with("ENC[AES256-GCM,"));
        let decrypted = decrypt_value(&encrypted, &key).unwrap();
        assert_eq!(decrypted.expose_secret(), plaintext);
    }

    #[test]
    fn parse_hex_key() {
        let hex_key = "aa".repeat(32);
        let key = parse_master_key(&hex_key).unwrap();
        assert_eq!(key.as_bytes(), &[0xaa; 32]);
    }

    #[test]
    fn parse_base64_key() {
        let raw = [0xbbu8; 32];
        let b64 = B64.encode(raw);
        let key = parse_master_key(&b64).unwrap();
        assert_eq!(key.as_bytes(), &[0xbb; 32]);
    }

    #[test]
    fn master_key_debug_is_redacted() {
        let key = test_key();
        let debug = format!("{key:?}");
        assert_eq!(debug, "MasterKey([REDACTED])");
        assert!(!debug.contains("42"));
    }

    #[test]
    fn load_or_generate_creates_file_with_owner_only_perms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");
        assert!(!path.exists());
        let key = MasterKey::load_or_generate(&path).unwrap();
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }

        let reloaded = MasterKey::load_or_generate(&path).unwrap();
        assert_eq!(key.as_bytes(), reloaded.as_bytes());
    }

    #[test]
    fn credential_vault_totp_roundtrip() {
        let vault = CredentialVault::new(test_key());
        let secret = "JBSWY3DPEHPK3PXP";
        let envelope = vault.encrypt_totp(secret).unwrap();
        assert!(is_encrypted(&envelope));
        let decrypted = vault.decrypt_totp(&envelope).unwrap();
        assert_eq!(decrypted.expose_secret(), secret);
    }

    #[test]
    fn credential_vault_decrypt_rejects_plain_value() {
        let vault = CredentialVault::new(test_key());
        assert!(vault.decrypt_totp("not-an-envelope").is_none());
    }

    #[test]
    fn credential_vault_decrypt_wrong_key_returns_none() {
        let vault_a = CredentialVault::new(test_key());
        let other_key = parse_master_key(&"7f".repeat(32)).unwrap();
        let vault_b = CredentialVault::new(other_key);
        let envelope = vault_a.encrypt_totp("JBSWY3DPEHPK3PXP").unwrap();
        assert!(vault_b.decrypt_totp(&envelope).is_none());
    }

    #[test]
    fn migrate_legacy_totp_secret_encrypts_plain_rows() {
        let vault = CredentialVault::new(test_key());
        let migrated = vault
        .migrate_legacy_totp_secret("JBSWY3DPEHPK3PXP")
        .unwrap();
        assert!(is_encrypted(&migrated));
    }

    #[test]
    fn migrate_legacy_totp_secret_is_noop_on_already_encrypted() {
        let vault = CredentialVault::new(test_key());
        let envelope = vault.encrypt_totp("JBSWY3DPEHPK3PXP").unwrap();
        assert!(vault.migrate_legacy_totp_secret(&envelope).is_none());
    }

    #[test]
    fn totp_code_accepts_adjacent_step_within_skew() {
        let secret = "JBSWY3DPEHPK3PXP";
        let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, secret.as_bytes().to_vec()).unwrap();
        let now = 1_700_000_000u64;
        let code = totp.generate(now);
        assert!(CredentialVault::check_totp_code(secret, &code, now).unwrap());
        let code_prev_step = totp.generate(now - 30);
        assert!(CredentialVault::check_totp_code(secret, &code_prev_step, now).unwrap());
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn dummy_hash_never_verifies_against_real_passwords() {
        assert!(!verify_password("anything at all", dummy_password_hash()));
    }

    #[test]
    fn generated_tokens_are_high_entropy_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
        assert!(a.len() >= 32);
    }

    #[test]
    fn generated_api_key_has_prefix() {
        assert!(generate_api_key().starts_with("rfctl_"));
    }
}
