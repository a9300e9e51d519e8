//! Joiner-side record handling.
//!
//! ```text
//! AwaitHandshake --handshake--> AwaitConfig --complete()--> Complete
//! ```
//!
//! The cookie is sent as soon as the handshake completes. Type 0 records
//! are appended to the configuration stream; an empty type 1 record ends it.

use crate::core_channel::{ChannelError, Record, SecureChannel};
use crate::core_proto::{MAX_CONFIG_STREAM, RECORD_DATA, RECORD_FINISH, TOKEN_LEN};
use crate::error::{InviteError, InviteResult};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitHandshake,
    AwaitConfig,
    Complete,
}

pub struct Session {
    state: SessionState,
    channel: SecureChannel,
    cookie: [u8; TOKEN_LEN],
    config: Vec<u8>,
    config_done: bool,
    max_config: usize,
}

impl Session {
    pub fn new(channel: SecureChannel, cookie: [u8; TOKEN_LEN]) -> Self {
        Self {
            state: SessionState::AwaitHandshake,
            channel,
            cookie,
            config: Vec::new(),
            config_done: false,
            max_config: MAX_CONFIG_STREAM,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Feed socket bytes. Returns `true` when they completed the
    /// configuration stream.
    pub fn receive(&mut self, data: &[u8]) -> InviteResult<bool> {
        let mut finished = false;

        for record in self.channel.receive_data(data)? {
            match (self.state, record) {
                (SessionState::AwaitHandshake, Record::Handshake) => {
                    debug!("Secure channel established, sending cookie");
                    self.channel.send_record(RECORD_DATA, &self.cookie)?;
                    self.state = SessionState::AwaitConfig;
                }
                (SessionState::AwaitConfig, Record::Application { kind, payload }) if !self.config_done => {
                    match kind {
                        RECORD_DATA => {
                            if self.config.len() + payload.len() > self.max_config {
                                return Err(ChannelError::Protocol(format!(
                                    "configuration stream exceeds {} bytes",
                                    self.max_config
                                ))
                                .into());
                            }
                            self.config.extend_from_slice(&payload);
                        }
                        RECORD_FINISH => {
                            self.config_done = true;
                            finished = true;
                        }
                        _ => {
                            return Err(ChannelError::Protocol(format!("unexpected record type {}", kind)).into())
                        }
                    }
                }
                (state, record) => {
                    return Err(InviteError::Channel(ChannelError::Protocol(format!(
                        "unexpected {:?} while in {:?}",
                        record_kind(&record),
                        state
                    ))));
                }
            }
        }

        Ok(finished)
    }

    /// The configuration stream received so far
    pub fn config(&self) -> &[u8] {
        &self.config
    }

    /// Send our new public key and mark the session done
    pub fn complete(&mut self, public_key: &str) -> InviteResult<()> {
        if !self.config_done {
            return Err(ChannelError::Protocol("configuration stream is not complete".into()).into());
        }
        self.channel.send_record(RECORD_FINISH, public_key.as_bytes())?;
        self.state = SessionState::Complete;
        Ok(())
    }

    pub fn take_outbound(&mut self) -> Vec<u8> {
        self.channel.take_outbound()
    }

    pub fn close(&mut self) {
        self.channel.stop();
    }
}

fn record_kind(record: &Record) -> Option<u8> {
    match record {
        Record::Handshake => None,
        Record::Application { kind, .. } => Some(*kind),
    }
}
