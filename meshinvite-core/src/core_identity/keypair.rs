//! Keypair module
//!
//! Ed25519 keys identify nodes and invitations; X25519 keys are the
//! legacy encryption keys and the form the secure channel consumes.
//!
//! Secret keys are zeroized on drop.

use crate::error::{InviteError, InviteResult};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Key type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// Ed25519 for signatures
    Ed25519,
    /// X25519 for Diffie-Hellman key exchange
    X25519,
}

/// Public and secret key bytes (32 each)
#[derive(Clone, Serialize, Deserialize)]
pub struct Keypair {
    pub key_type: KeyType,
    pub public: Vec<u8>,
    secret: Vec<u8>,
}

impl Keypair {
    /// Generate a new keypair of the specified type
    pub fn generate(key_type: KeyType) -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);

        let kp = match key_type {
            KeyType::Ed25519 => {
                let signing_key = SigningKey::from_bytes(&seed);
                Keypair {
                    key_type,
                    public: signing_key.verifying_key().to_bytes().to_vec(),
                    secret: signing_key.to_bytes().to_vec(),
                }
            }
            KeyType::X25519 => {
                let secret = StaticSecret::from(seed);
                Keypair {
                    key_type,
                    public: X25519PublicKey::from(&secret).to_bytes().to_vec(),
                    secret: secret.to_bytes().to_vec(),
                }
            }
        };

        seed.zeroize();
        kp
    }

    /// X25519 keypair for the same Ed25519 identity.
    ///
    /// The scalar is the clamped lower half of SHA-512(seed), so the
    /// resulting public key equals [`ed25519_public_to_x25519`] of ours.
    pub fn to_x25519(&self) -> InviteResult<Keypair> {
        if self.key_type != KeyType::Ed25519 {
            return Err(InviteError::Key("only Ed25519 keys can be converted".to_string()));
        }

        let mut hash = Sha512::digest(&self.secret);
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&hash[..32]);
        hash.as_mut_slice().zeroize();

        scalar[0] &= 248;
        scalar[31] &= 127;
        scalar[31] |= 64;

        let secret = StaticSecret::from(scalar);
        scalar.zeroize();

        Ok(Keypair {
            key_type: KeyType::X25519,
            public: X25519PublicKey::from(&secret).to_bytes().to_vec(),
            secret: secret.to_bytes().to_vec(),
        })
    }

    /// Serialize to bytes for a key file
    pub fn serialize(&self) -> InviteResult<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| InviteError::Key(format!("Failed to serialize keypair: {}", e)))
    }

    /// Deserialize and check that the public half matches the secret half
    pub fn deserialize(bytes: &[u8]) -> InviteResult<Self> {
        let kp: Keypair = bincode::deserialize(bytes)
            .map_err(|e| InviteError::Key(format!("Failed to deserialize: {}", e)))?;

        let secret: [u8; 32] = kp
            .secret
            .as_slice()
            .try_into()
            .map_err(|_| InviteError::Key("secret key must be 32 bytes".to_string()))?;

        let derived = match kp.key_type {
            KeyType::Ed25519 => SigningKey::from_bytes(&secret).verifying_key().to_bytes(),
            KeyType::X25519 => X25519PublicKey::from(&StaticSecret::from(secret)).to_bytes(),
        };

        if derived.as_slice() != kp.public.as_slice() {
            return Err(InviteError::Key("public key does not match secret key".to_string()));
        }

        Ok(kp)
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Get reference to secret key (use carefully!)
    pub fn secret_key(&self) -> &[u8] {
        &self.secret
    }

    /// Text form used in greetings, host files and fingerprints
    pub fn public_base64(&self) -> String {
        STANDARD_NO_PAD.encode(&self.public)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("key_type", &self.key_type)
            .field("public", &hex::encode(&self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Parse the base64 text form of an Ed25519 public key
pub fn decode_public_key(text: &str) -> InviteResult<[u8; 32]> {
    let bytes = STANDARD_NO_PAD
        .decode(text.trim())
        .map_err(|e| InviteError::Input(format!("public key is not valid base64: {}", e)))?;

    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| InviteError::Input(format!("public key has {} bytes", bytes.len())))?;

    VerifyingKey::from_bytes(&key)
        .map_err(|e| InviteError::Input(format!("invalid Ed25519 public key: {}", e)))?;

    Ok(key)
}

/// Birational map of an Ed25519 public key onto Curve25519
pub fn ed25519_public_to_x25519(public: &[u8; 32]) -> InviteResult<[u8; 32]> {
    CompressedEdwardsY(*public)
        .decompress()
        .map(|point| point.to_montgomery().to_bytes())
        .ok_or_else(|| InviteError::Input("public key is not a curve point".to_string()))
}
