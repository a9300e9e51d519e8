/*
  InvitationResponder

  Inviter side of the join protocol, one task per connection.

  1. Read "0 ?<joiner key> 17.x", answer "0 <name> 17.7" and
     "4 <invitation key>".
  2. Run the secure channel as responder with the current invitation key.
  3. The first record carries the 18-byte cookie. The matching record is
     claimed and deleted, then streamed back as type 0 records followed by
     an empty type 1 record.
  4. A type 1 record from the joiner carries its new public key, which
     becomes hosts/<joiner>.
*/

use super::store::InvitationStore;
use crate::config::{Config, ConfigPaths};
use crate::core_channel::{ChannelError, Record, Role, SecureChannel};
use crate::core_identity::{check_id, decode_public_key};
use crate::core_proto::{
    ack_line, InviterGreeting, JoinerGreeting, LineReader, CHANNEL_LABEL, MAX_GREETING_LINE,
    PROT_MAJOR, PROT_MINOR, RECORD_DATA, RECORD_FINISH, TOKEN_LEN,
};
use crate::core_provision::first_value;
use crate::error::{timed, InviteError, InviteResult, IoContext};
use crate::logging::TRUST_TARGET;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Size of the configuration fragments sent to a joiner
const FRAGMENT_SIZE: usize = 1024;

enum Phase {
    AwaitCookie,
    AwaitKey { joiner: String },
    Done { joiner: String },
}

pub struct InvitationResponder {
    name: String,
    paths: ConfigPaths,
    store: InvitationStore,
    io_timeout: Duration,
}

impl InvitationResponder {
    pub fn new(config: &Config) -> InviteResult<Self> {
        let paths = config.config_paths();
        let name = super::own_name(&paths)?;
        let store = InvitationStore::new(&paths, config.invitation.ttl);
        Ok(Self { name, paths, store, io_timeout: config.network.io_timeout })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accept joiners until the listener fails
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> InviteResult<()> {
        info!(name = %self.name, addr = ?listener.local_addr().ok(), "Serving invitations");

        loop {
            let (socket, peer) = listener.accept().await.context(|| "accepting connection")?;
            let responder = Arc::clone(&self);

            tokio::spawn(async move {
                debug!(%peer, "Invitation connection");
                match responder.serve_connection(socket).await {
                    Ok(joiner) => info!(%peer, %joiner, "Invitation redeemed"),
                    Err(e) if e.is_trust_failure() => {
                        error!(target: TRUST_TARGET, %peer, error = %e, "Rejected invitation attempt")
                    }
                    Err(e) => warn!(%peer, error = %e, "Invitation connection failed"),
                }
            });
        }
    }

    /// Run one join conversation; returns the name of the node that joined.
    pub async fn serve_connection<S>(&self, stream: S) -> InviteResult<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = LineReader::new(reader, MAX_GREETING_LINE);

        let line = timed(self.io_timeout, "reading greeting", lines.read_line()).await?;
        let greeting = JoinerGreeting::parse(&line)?;
        let joiner_key = decode_public_key(&greeting.public_key)?;

        let key = self
            .store
            .load_key()?
            .ok_or_else(|| InviteError::Input("no outstanding invitations".to_string()))?;

        let reply = InviterGreeting { name: self.name.clone(), major: PROT_MAJOR, minor: PROT_MINOR };
        let mut out = reply.to_line();
        out.push_str(&ack_line(&key.public_base64()));
        writer.write_all(out.as_bytes()).await.context(|| "sending greeting")?;

        let mut channel = SecureChannel::start(Role::Responder, &key, &joiner_key, CHANNEL_LABEL)?;
        let (mut reader, pending) = lines.into_parts();

        let mut phase = Phase::AwaitCookie;
        let mut inbound = pending;
        let mut buf = vec![0u8; 4096];

        loop {
            if !inbound.is_empty() {
                for record in channel.receive_data(&inbound)? {
                    phase = self.handle_record(&mut channel, phase, record)?;
                }
                inbound.clear();
            }

            let outbound = channel.take_outbound();
            if !outbound.is_empty() {
                writer.write_all(&outbound).await.context(|| "sending to joiner")?;
            }

            if let Phase::Done { joiner } = phase {
                channel.stop();
                let _ = writer.shutdown().await;
                return Ok(joiner);
            }

            let n = timed(self.io_timeout, "waiting for joiner", async {
                reader.read(&mut buf).await.context(|| "reading from joiner")
            })
            .await?;
            if n == 0 {
                return Err(InviteError::Cancelled("joiner closed the connection".to_string()));
            }
            inbound.extend_from_slice(&buf[..n]);
        }
    }

    fn handle_record(&self, channel: &mut SecureChannel, phase: Phase, record: Record) -> InviteResult<Phase> {
        let (kind, payload) = match record {
            Record::Handshake => return Ok(phase),
            Record::Application { kind, payload } => (kind, payload),
        };

        match (phase, kind) {
            (Phase::AwaitCookie, RECORD_DATA) => {
                let cookie: [u8; TOKEN_LEN] = payload.as_slice().try_into().map_err(|_| {
                    ChannelError::Protocol(format!("cookie of {} bytes", payload.len()))
                })?;

                let contents = self.store.redeem(&cookie)?;
                let joiner = first_value(&contents, "Name")
                    .filter(|name| check_id(name))
                    .ok_or_else(|| InviteError::Input("invitation record has no valid Name".to_string()))?
                    .to_string();

                for fragment in contents.as_bytes().chunks(FRAGMENT_SIZE) {
                    channel.send_record(RECORD_DATA, fragment)?;
                }
                channel.send_record(RECORD_FINISH, &[])?;

                info!(%joiner, "Sent invitation data");
                Ok(Phase::AwaitKey { joiner })
            }
            (Phase::AwaitKey { joiner }, RECORD_FINISH) => {
                let text = std::str::from_utf8(&payload)
                    .map_err(|_| InviteError::Input("public key is not text".to_string()))?;
                decode_public_key(text)?;
                self.store_joiner_key(&joiner, text.trim())?;
                Ok(Phase::Done { joiner })
            }
            (_, kind) => Err(ChannelError::Protocol(format!("unexpected record type {}", kind)).into()),
        }
    }

    fn store_joiner_key(&self, joiner: &str, key: &str) -> InviteResult<()> {
        let path = self.paths.host_file(joiner);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    InviteError::Policy(format!("host config file for {} already exists", joiner))
                }
                _ => InviteError::io(format!("creating {}", path.display()), e),
            })?;
        writeln!(file, "Ed25519PublicKey = {}", key).context(|| format!("writing {}", path.display()))?;
        info!(%joiner, path = %path.display(), "Stored key of new node");
        Ok(())
    }
}
