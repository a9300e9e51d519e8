//! Wire-level constants and the plaintext greeting exchanged before the
//! secure channel starts.

mod fingerprint;
mod greeting;

pub use fingerprint::{decode_token, encode_token, key_digest, verify_pinned_fingerprint, TOKEN_LEN};
pub use greeting::{ack_line, parse_ack, InviterGreeting, JoinerGreeting, LineReader};

/// Protocol major version; peers must agree exactly.
pub const PROT_MAJOR: u32 = 17;
/// Minor version advertised by the inviter side.
pub const PROT_MINOR: u32 = 7;
/// Minor version advertised by a joiner.
pub const JOIN_MINOR: u32 = 1;

/// Request id of greeting lines.
pub const ID_REQUEST: u32 = 0;
/// Status code of the acknowledgement line.
pub const ACK: u32 = 4;

pub const DEFAULT_PORT: u16 = 655;

/// Upper bound for greeting lines.
pub const MAX_GREETING_LINE: usize = 4096;
/// Upper bound for lines of the configuration stream.
pub const MAX_CONFIG_LINE: usize = 1024;
/// Upper bound on the configuration stream a joiner accepts.
pub const MAX_CONFIG_STREAM: usize = 1024 * 1024;

/// Separates the joiner's own chunk from the inviter's host config.
pub const CHUNK_SEPARATOR: &str =
    "#---------------------------------------------------------------#";

/// Prologue binding the secure channel to invitation use.
pub const CHANNEL_LABEL: &[u8] = b"mesh invitation";

/// Cookie (joiner → inviter) and configuration fragments (inviter → joiner).
pub const RECORD_DATA: u8 = 0;
/// End of configuration (inviter → joiner), new public key (joiner → inviter).
pub const RECORD_FINISH: u8 = 1;
