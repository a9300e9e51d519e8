//! Plaintext greeting lines and a bounded line reader for the socket.
//!
//! ```text
//! joiner  -> inviter   0 ?<base64 throw-away key> 17.1
//! inviter -> joiner    0 <inviter name> 17.7
//! inviter -> joiner    4 <base64 invitation key>
//! ```

use super::{ACK, ID_REQUEST, JOIN_MINOR, PROT_MAJOR};
use crate::core_identity::check_id;
use crate::error::{InviteError, InviteResult, IoContext};
use crate::logging::TRUST_TARGET;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::error;

/// First line sent by a joiner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinerGreeting {
    pub public_key: String,
    pub major: u32,
    pub minor: u32,
}

impl JoinerGreeting {
    pub fn new(public_key: String) -> Self {
        Self { public_key, major: PROT_MAJOR, minor: JOIN_MINOR }
    }

    pub fn to_line(&self) -> String {
        format!("{} ?{} {}.{}\n", ID_REQUEST, self.public_key, self.major, self.minor)
    }

    pub fn parse(line: &str) -> InviteResult<Self> {
        let mut fields = line.split_whitespace();
        let (code, key, version) = match (fields.next(), fields.next(), fields.next()) {
            (Some(code), Some(key), Some(version)) => (code, key, version),
            _ => return Err(InviteError::Input(format!("malformed greeting '{}'", line))),
        };

        if code.parse::<u32>().ok() != Some(ID_REQUEST) {
            return Err(InviteError::Input(format!("unexpected request '{}'", code)));
        }

        let public_key = key
            .strip_prefix('?')
            .filter(|k| !k.is_empty())
            .ok_or_else(|| InviteError::Input("greeting does not carry an invitation key".into()))?;

        let (major, minor) = parse_version(version)?;
        check_major(major)?;

        Ok(Self { public_key: public_key.to_string(), major, minor })
    }
}

/// First line sent back by the inviter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviterGreeting {
    pub name: String,
    pub major: u32,
    pub minor: u32,
}

impl InviterGreeting {
    pub fn to_line(&self) -> String {
        format!("{} {} {}.{}\n", ID_REQUEST, self.name, self.major, self.minor)
    }

    pub fn parse(line: &str) -> InviteResult<Self> {
        let mut fields = line.split_whitespace();
        let (code, name, version) = match (fields.next(), fields.next(), fields.next()) {
            (Some(code), Some(name), Some(version)) => (code, name, version),
            _ => return Err(InviteError::Input(format!("cannot read greeting from peer: '{}'", line))),
        };

        if code.parse::<u32>().ok() != Some(ID_REQUEST) {
            return Err(InviteError::Input(format!("unexpected request '{}'", code)));
        }

        if !check_id(name) {
            return Err(InviteError::Input(format!("peer sent invalid name '{}'", name)));
        }

        let (major, minor) = parse_version(version)?;
        check_major(major)?;

        Ok(Self { name: name.to_string(), major, minor })
    }
}

/// `4 <fingerprint>`
pub fn ack_line(fingerprint: &str) -> String {
    format!("{} {}\n", ACK, fingerprint)
}

/// Extract the fingerprint text from an acknowledgement line
pub fn parse_ack(line: &str) -> InviteResult<String> {
    let line = line.trim_end();
    let (code, rest) = line.split_once(' ').unwrap_or((line, ""));

    if code.parse::<u32>().ok() != Some(ACK) {
        error!(target: TRUST_TARGET, line, "Peer did not acknowledge the invitation");
        return Err(InviteError::Trust(format!("expected ACK, got '{}'", code)));
    }

    let fingerprint = rest.trim();
    if fingerprint.is_empty() {
        return Err(InviteError::Input("ACK does not carry a fingerprint".to_string()));
    }

    Ok(fingerprint.to_string())
}

/// Accepts `major` or `major.minor`; a missing minor is 0.
fn parse_version(text: &str) -> InviteResult<(u32, u32)> {
    let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
    match (major.parse(), minor.parse()) {
        (Ok(major), Ok(minor)) => Ok((major, minor)),
        _ => Err(InviteError::Input(format!("invalid protocol version '{}'", text))),
    }
}

fn check_major(major: u32) -> InviteResult<()> {
    if major != PROT_MAJOR {
        error!(target: TRUST_TARGET, major, expected = PROT_MAJOR, "Protocol version mismatch");
        return Err(InviteError::Trust(format!(
            "peer speaks protocol {} but we need {}",
            major, PROT_MAJOR
        )));
    }
    Ok(())
}

/// Reads `\n`-terminated lines and keeps whatever arrived after them.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_line: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_line: usize) -> Self {
        Self { inner, buf: Vec::new(), max_line }
    }

    /// Next line without its terminator (`\r\n` tolerated).
    ///
    /// End of stream before a full line is [`InviteError::Cancelled`].
    pub async fn read_line(&mut self) -> InviteResult<String> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                if pos > self.max_line {
                    return Err(InviteError::Input("maximum line length exceeded".to_string()));
                }
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return String::from_utf8(line)
                    .map_err(|_| InviteError::Input("line is not valid UTF-8".to_string()));
            }

            if self.buf.len() > self.max_line {
                return Err(InviteError::Input("maximum line length exceeded".to_string()));
            }

            let mut chunk = [0u8; 1024];
            let n = match self.inner.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(|| "reading greeting from peer"),
            };
            if n == 0 {
                return Err(InviteError::Cancelled("connection closed during greeting".into()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// The reader and any bytes buffered past the last line
    pub fn into_parts(self) -> (R, Vec<u8>) {
        (self.inner, self.buf)
    }
}
