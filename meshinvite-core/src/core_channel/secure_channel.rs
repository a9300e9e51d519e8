/*
  SecureChannel

  Record-oriented encrypted channel on top of a byte stream, built on Noise.

  Workflow:
  1. start(): both sides already know each other's static key (the joiner's
     throw-away key arrives in the greeting, the inviter's key is pinned by
     the URL), so the KK pattern is used. The initiator queues message 1.
  2. receive_data(): raw socket bytes in any fragmentation. Complete frames
     are fed to the handshake, then to the transport state.
  3. Once the handshake finishes a Record::Handshake is emitted, always
     before any application record.
  4. send_record(): encrypts `[type][payload]` and queues the frame.

  Outputs are pulled by the owner with take_outbound(); nothing is written
  to the socket from in here.

  Frame: [len: u16 BE][noise message]
*/

use crate::core_identity::{ed25519_public_to_x25519, Keypair};
use snow::params::NoiseParams;
use snow::{Builder, HandshakeState, TransportState};
use thiserror::Error;

/// Noise protocol name
pub const NOISE_PARAMS: &str = "Noise_KK_25519_ChaChaPoly_BLAKE2s";

/// Record type reported when the handshake completes
pub const RECORD_HANDSHAKE: u8 = 128;

const MAX_FRAME: usize = u16::MAX as usize;
const TAG_LEN: usize = 16;

/// Largest payload of one application record
pub const MAX_RECORD_PAYLOAD: usize = MAX_FRAME - TAG_LEN - 1;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Noise failure: {0}")]
    Noise(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Channel is not established")]
    NotEstablished,

    #[error("Record of {0} bytes exceeds the maximum")]
    RecordTooLarge(usize),

    #[error("Channel is stopped")]
    Stopped,
}

impl From<snow::Error> for ChannelError {
    fn from(e: snow::Error) -> Self {
        ChannelError::Noise(e.to_string())
    }
}

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// A decrypted inbound record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// The handshake completed ([`RECORD_HANDSHAKE`])
    Handshake,
    Application { kind: u8, payload: Vec<u8> },
}

enum Stage {
    Handshake(Box<HandshakeState>),
    Transport(Box<TransportState>),
    Stopped,
}

pub struct SecureChannel {
    stage: Stage,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
}

impl SecureChannel {
    /// Start a session.
    ///
    /// `local` is our Ed25519 key, `remote_public` the peer's Ed25519
    /// public key. Both are mapped to X25519 for the DH operations.
    pub fn start(
        role: Role,
        local: &Keypair,
        remote_public: &[u8; 32],
        label: &[u8],
    ) -> ChannelResult<Self> {
        let local_dh = local.to_x25519().map_err(|e| ChannelError::Noise(e.to_string()))?;
        let remote_dh =
            ed25519_public_to_x25519(remote_public).map_err(|e| ChannelError::Noise(e.to_string()))?;

        let params: NoiseParams = NOISE_PARAMS.parse()?;
        let builder = Builder::new(params)
            .local_private_key(local_dh.secret_key())
            .remote_public_key(&remote_dh)
            .prologue(label);

        let handshake = match role {
            Role::Initiator => builder.build_initiator()?,
            Role::Responder => builder.build_responder()?,
        };

        let mut channel = SecureChannel {
            stage: Stage::Handshake(Box::new(handshake)),
            inbound: Vec::new(),
            outbound: Vec::new(),
        };

        if role == Role::Initiator {
            channel.write_handshake()?;
        }

        Ok(channel)
    }

    pub fn is_established(&self) -> bool {
        matches!(self.stage, Stage::Transport(_))
    }

    /// Feed raw bytes from the peer; returns the records they completed
    pub fn receive_data(&mut self, data: &[u8]) -> ChannelResult<Vec<Record>> {
        if matches!(self.stage, Stage::Stopped) {
            return Err(ChannelError::Stopped);
        }

        self.inbound.extend_from_slice(data);
        let mut records = Vec::new();

        while let Some(frame) = self.next_frame() {
            if let Some(record) = self.process_frame(&frame)? {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Encrypt and queue one application record
    pub fn send_record(&mut self, kind: u8, payload: &[u8]) -> ChannelResult<()> {
        if kind >= RECORD_HANDSHAKE {
            return Err(ChannelError::Protocol(format!("record type {} is reserved", kind)));
        }
        if payload.len() > MAX_RECORD_PAYLOAD {
            return Err(ChannelError::RecordTooLarge(payload.len()));
        }

        let transport = match &mut self.stage {
            Stage::Transport(t) => t,
            Stage::Handshake(_) => return Err(ChannelError::NotEstablished),
            Stage::Stopped => return Err(ChannelError::Stopped),
        };

        let mut plain = Vec::with_capacity(payload.len() + 1);
        plain.push(kind);
        plain.extend_from_slice(payload);

        let mut frame = vec![0u8; plain.len() + TAG_LEN];
        let len = transport.write_message(&plain, &mut frame)?;
        push_frame(&mut self.outbound, &frame[..len]);
        Ok(())
    }

    /// Bytes that must be written to the socket, in order
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    /// Drop key material; further use fails with [`ChannelError::Stopped`]
    pub fn stop(&mut self) {
        self.stage = Stage::Stopped;
        self.inbound.clear();
    }

    fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.inbound.len() < 2 {
            return None;
        }
        let len = u16::from_be_bytes([self.inbound[0], self.inbound[1]]) as usize;
        if self.inbound.len() < 2 + len {
            return None;
        }
        let frame = self.inbound[2..2 + len].to_vec();
        self.inbound.drain(..2 + len);
        Some(frame)
    }

    fn process_frame(&mut self, frame: &[u8]) -> ChannelResult<Option<Record>> {
        let mut plain = vec![0u8; frame.len()];

        match &mut self.stage {
            Stage::Handshake(handshake) => {
                let n = handshake.read_message(frame, &mut plain)?;
                if n != 0 {
                    return Err(ChannelError::Protocol("unexpected handshake payload".into()));
                }
                if !handshake.is_handshake_finished() {
                    self.write_handshake()?;
                }
                self.finish_handshake()
            }
            Stage::Transport(transport) => {
                let n = transport.read_message(frame, &mut plain)?;
                let (&kind, payload) = plain[..n]
                    .split_first()
                    .ok_or_else(|| ChannelError::Protocol("empty record".into()))?;
                if kind >= RECORD_HANDSHAKE {
                    return Err(ChannelError::Protocol(format!("record type {} is reserved", kind)));
                }
                Ok(Some(Record::Application { kind, payload: payload.to_vec() }))
            }
            Stage::Stopped => Err(ChannelError::Stopped),
        }
    }

    fn write_handshake(&mut self) -> ChannelResult<()> {
        if let Stage::Handshake(handshake) = &mut self.stage {
            let mut buf = vec![0u8; MAX_FRAME];
            let len = handshake.write_message(&[], &mut buf)?;
            push_frame(&mut self.outbound, &buf[..len]);
        }
        Ok(())
    }

    /// Switch to transport mode once both messages have been exchanged
    fn finish_handshake(&mut self) -> ChannelResult<Option<Record>> {
        let finished = matches!(&self.stage, Stage::Handshake(h) if h.is_handshake_finished());
        if !finished {
            return Ok(None);
        }

        match std::mem::replace(&mut self.stage, Stage::Stopped) {
            Stage::Handshake(handshake) => {
                let transport = handshake.into_transport_mode()?;
                self.stage = Stage::Transport(Box::new(transport));
                Ok(Some(Record::Handshake))
            }
            other => {
                self.stage = other;
                Ok(None)
            }
        }
    }
}

fn push_frame(out: &mut Vec<u8>, message: &[u8]) {
    out.extend_from_slice(&(message.len() as u16).to_be_bytes());
    out.extend_from_slice(message);
}
