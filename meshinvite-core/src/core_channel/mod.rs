//! Encrypted record channel used once the greeting has pinned the peer's key.

mod secure_channel;

pub use secure_channel::{
    ChannelError, ChannelResult, Record, Role, SecureChannel, MAX_RECORD_PAYLOAD, NOISE_PARAMS,
    RECORD_HANDSHAKE,
};
