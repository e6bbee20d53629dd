//! Optional end-to-end payload transform.
//!
//! When a requester enables sealing it publishes an X25519 [`RecipientKey`]
//! in the request; the source encrypts its success payload to that key and
//! answers with a [`SealedPayload`]. The requester opens it after relay
//! delivery, so the picker and the return page only ever see ciphertext.
//!
//! Construction: ephemeral X25519 agreement, HKDF-SHA256 over the shared
//! secret (salt = ephemeral key ‖ recipient key), ChaCha20-Poly1305.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::envelope::SuccessPayload;
use crate::error::SealError;
use crate::shared::serde_util::base64url;

const KDF_INFO: &[u8] = b"smart-checkin sealed payload v1";
const NONCE_LEN: usize = 12;

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Requester's public key, carried in the request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientKey([u8; 32]);

impl RecipientKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_base64url(s: &str) -> Result<Self, SealError> {
        let raw = URL_SAFE_NO_PAD
            .decode(s.as_bytes())
            .map_err(|e| SealError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| SealError::InvalidKey(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }
}

impl Serialize for RecipientKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for RecipientKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RecipientKey::from_base64url(&s).map_err(serde::de::Error::custom)
    }
}

/// Requester's private key. Lives only in the requesting context.
#[derive(Clone)]
pub struct SecretKey(StaticSecret);

impl SecretKey {
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn public_key(&self) -> RecipientKey {
        RecipientKey(PublicKey::from(&self.0).to_bytes())
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("public", &self.public_key().to_base64url())
            .finish_non_exhaustive()
    }
}

// ─── Sealed payload ──────────────────────────────────────────────────────────

/// Ciphertext envelope for a [`SuccessPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    /// Sender's ephemeral X25519 public key.
    #[serde(with = "base64url")]
    pub epk: Vec<u8>,
    #[serde(with = "base64url")]
    pub nonce: Vec<u8>,
    #[serde(rename = "ct", with = "base64url")]
    pub ciphertext: Vec<u8>,
}

// ─── Transform ───────────────────────────────────────────────────────────────

/// Pluggable payload transform. The orchestrator only calls [`open`]; the
/// source side calls [`seal`].
///
/// [`open`]: PayloadTransform::open
/// [`seal`]: PayloadTransform::seal
pub trait PayloadTransform {
    fn seal(
        &self,
        payload: &SuccessPayload,
        recipient: &RecipientKey,
    ) -> Result<SealedPayload, SealError>;

    fn open(&self, sealed: &SealedPayload, secret: &SecretKey)
        -> Result<SuccessPayload, SealError>;
}

/// The default X25519 + HKDF-SHA256 + ChaCha20-Poly1305 transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519ChaCha;

impl PayloadTransform for X25519ChaCha {
    fn seal(
        &self,
        payload: &SuccessPayload,
        recipient: &RecipientKey,
    ) -> Result<SealedPayload, SealError> {
        let plaintext = serde_json::to_vec(payload)?;

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let epk = PublicKey::from(&ephemeral).to_bytes();
        let shared = ephemeral.diffie_hellman(&PublicKey::from(recipient.0));
        let cipher = derive_cipher(shared.as_bytes(), &epk, &recipient.0)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| SealError::EncryptionFailed)?;

        Ok(SealedPayload {
            epk: epk.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    fn open(
        &self,
        sealed: &SealedPayload,
        secret: &SecretKey,
    ) -> Result<SuccessPayload, SealError> {
        let epk: [u8; 32] = sealed
            .epk
            .as_slice()
            .try_into()
            .map_err(|_| SealError::InvalidKey("ephemeral key must be 32 bytes".into()))?;
        if sealed.nonce.len() != NONCE_LEN {
            return Err(SealError::DecryptionFailed);
        }

        let shared = secret.0.diffie_hellman(&PublicKey::from(epk));
        let cipher = derive_cipher(shared.as_bytes(), &epk, secret.public_key().as_bytes())?;

        let plaintext = cipher
            .decrypt(
                chacha20poly1305::Nonce::from_slice(&sealed.nonce),
                sealed.ciphertext.as_slice(),
            )
            .map_err(|_| SealError::DecryptionFailed)?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Seal with the default transform.
pub fn seal(payload: &SuccessPayload, recipient: &RecipientKey) -> Result<SealedPayload, SealError> {
    X25519ChaCha.seal(payload, recipient)
}

/// Open with the default transform.
pub fn open(sealed: &SealedPayload, secret: &SecretKey) -> Result<SuccessPayload, SealError> {
    X25519ChaCha.open(sealed, secret)
}

fn derive_cipher(
    shared: &[u8; 32],
    epk: &[u8; 32],
    recipient: &[u8; 32],
) -> Result<ChaCha20Poly1305, SealError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(epk);
    salt[32..].copy_from_slice(recipient);

    let mut key = [0u8; 32];
    Hkdf::<Sha256>::new(Some(&salt[..]), shared)
        .expand(KDF_INFO, &mut key)
        .map_err(|_| SealError::EncryptionFailed)?;

    ChaCha20Poly1305::new_from_slice(&key).map_err(|_| SealError::EncryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Artifact, ArtifactRef, ArtifactType};
    use crate::shared::ItemId;
    use serde_json::json;

    fn payload() -> SuccessPayload {
        let mut p = SuccessPayload::default();
        p.artifacts.push(Artifact::new(
            ArtifactType::FhirResource,
            json!({"resourceType": "Coverage", "id": "c1"}),
        ));
        p.answers
            .insert(ItemId::new("coverage-1"), vec![ArtifactRef::from(0)]);
        p
    }

    #[test]
    fn test_seal_then_open() {
        let secret = SecretKey::generate();
        let sealed = seal(&payload(), &secret.public_key()).unwrap();
        assert_eq!(open(&sealed, &secret).unwrap(), payload());
    }

    #[test]
    fn test_wrong_key_fails() {
        let secret = SecretKey::generate();
        let other = SecretKey::generate();
        let sealed = seal(&payload(), &secret.public_key()).unwrap();
        assert!(matches!(open(&sealed, &other), Err(SealError::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let secret = SecretKey::generate();
        let mut sealed = seal(&payload(), &secret.public_key()).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(open(&sealed, &secret), Err(SealError::DecryptionFailed)));
    }

    #[test]
    fn test_recipient_key_base64url() {
        let key = SecretKey::generate().public_key();
        let parsed = RecipientKey::from_base64url(&key.to_base64url()).unwrap();
        assert_eq!(parsed, key);
        assert!(RecipientKey::from_base64url("AAAA").is_err());
    }

    #[test]
    fn test_secret_key_debug_hides_secret() {
        let secret = SecretKey::from_bytes([7u8; 32]);
        let shown = format!("{:?}", secret);
        assert!(shown.contains("public"));
        assert!(!shown.contains("[7, 7"));
    }
}
