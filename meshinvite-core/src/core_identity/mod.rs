//! Identity management module
//!
//! Key material and the rules node names must follow.

mod key_file;
mod keypair;
mod names;

pub use key_file::{read_private_key, remove_private_key, write_private_key};
pub use keypair::{decode_public_key, ed25519_public_to_x25519, KeyType, Keypair};
pub use names::{check_id, check_netname};
