//! Key fingerprint digests and the 18-byte tokens carried in invitation URLs.

use crate::error::{InviteError, InviteResult};
use crate::logging::TRUST_TARGET;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use tracing::error;

/// Raw length of the key hash and of the cookie.
pub const TOKEN_LEN: usize = 18;

/// SHA-256 over the fingerprint text, truncated to [`TOKEN_LEN`] bytes
pub fn key_digest(fingerprint: &str) -> [u8; TOKEN_LEN] {
    let full = Sha256::digest(fingerprint.as_bytes());
    let mut out = [0u8; TOKEN_LEN];
    out.copy_from_slice(&full[..TOKEN_LEN]);
    out
}

/// 24 URL-safe base64 characters
pub fn encode_token(token: &[u8; TOKEN_LEN]) -> String {
    URL_SAFE_NO_PAD.encode(token)
}

pub fn decode_token(text: &str) -> InviteResult<[u8; TOKEN_LEN]> {
    let bytes = URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| InviteError::Input(format!("'{}' is not valid base64: {}", text, e)))?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| InviteError::Input(format!("token decodes to {} bytes", bytes.len())))
}

/// Compare the digest of the presented fingerprint with the pinned hash
pub fn verify_pinned_fingerprint(fingerprint: &str, pinned: &[u8; TOKEN_LEN]) -> InviteResult<()> {
    if key_digest(fingerprint) != *pinned {
        error!(target: TRUST_TARGET, fingerprint, "Peer presented a key that does not match the invitation");
        return Err(InviteError::Trust("peer has an invalid key".to_string()));
    }
    Ok(())
}
