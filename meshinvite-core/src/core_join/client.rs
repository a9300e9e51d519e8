//! Redeeming an invitation URL.

use super::session::Session;
use crate::config::Config;
use crate::core_channel::{Role, SecureChannel};
use crate::core_identity::{decode_public_key, KeyType, Keypair};
use crate::core_invite::InvitationUrl;
use crate::core_proto::{
    parse_ack, verify_pinned_fingerprint, InviterGreeting, JoinerGreeting, LineReader, CHANNEL_LABEL,
    MAX_GREETING_LINE,
};
use crate::core_provision::{Provisioned, Provisioner};
use crate::error::{timed, InviteError, InviteResult, IoContext};
use crate::prompt::Prompter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Connect to the inviter named in `url` and provision a configuration root.
pub async fn join(url: &InvitationUrl, config: &Config, prompter: &mut dyn Prompter) -> InviteResult<Provisioned> {
    let (host, port) = url.connect_target(config.invitation.default_port);
    info!(%host, port, "Connecting to inviter");

    let stream = timed(config.network.connect_timeout, "connecting to inviter", async {
        TcpStream::connect((host.as_str(), port))
            .await
            .context(|| format!("connecting to {} port {}", host, port))
    })
    .await?;

    join_stream(stream, url, config, prompter).await
}

/// [`join`] over an already connected stream
pub async fn join_stream<S>(
    stream: S,
    url: &InvitationUrl,
    config: &Config,
    prompter: &mut dyn Prompter,
) -> InviteResult<Provisioned>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_timeout = config.network.io_timeout;
    let (reader, mut writer) = tokio::io::split(stream);

    // Only used to authenticate this one connection.
    let throwaway = Keypair::generate(KeyType::Ed25519);
    let greeting = JoinerGreeting::new(throwaway.public_base64());
    writer.write_all(greeting.to_line().as_bytes()).await.context(|| "sending greeting")?;

    let mut lines = LineReader::new(reader, MAX_GREETING_LINE);
    let line = timed(io_timeout, "reading greeting", lines.read_line()).await?;
    let inviter = InviterGreeting::parse(&line)?;
    let line = timed(io_timeout, "reading acknowledgement", lines.read_line()).await?;
    let fingerprint = parse_ack(&line)?;

    verify_pinned_fingerprint(&fingerprint, &url.hash)?;
    let inviter_key = decode_public_key(&fingerprint)?;
    debug!(inviter = %inviter.name, version = %format!("{}.{}", inviter.major, inviter.minor), "Inviter key verified");

    let channel = SecureChannel::start(Role::Initiator, &throwaway, &inviter_key, CHANNEL_LABEL)?;
    let mut session = Session::new(channel, url.cookie);
    let (mut reader, mut pending) = lines.into_parts();
    let mut buf = vec![0u8; 4096];

    loop {
        if !pending.is_empty() && session.receive(&pending)? {
            let provisioned = Provisioner::new(config, &mut *prompter).finalize(session.config()).await?;
            session.complete(&provisioned.public_key)?;
            flush(&mut writer, &mut session).await?;

            session.close();
            let _ = writer.shutdown().await;
            // Let the inviter store our key before we go.
            let _ = timed(io_timeout, "waiting for inviter to close", async {
                while reader.read(&mut buf).await.context(|| "draining connection")? > 0 {}
                Ok(())
            })
            .await;

            info!(name = %provisioned.name, "Invitation successfully accepted");
            return Ok(provisioned);
        }
        pending.clear();

        flush(&mut writer, &mut session).await?;

        let n = timed(io_timeout, "waiting for inviter", async {
            reader.read(&mut buf).await.context(|| "reading from inviter")
        })
        .await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);
    }

    session.close();
    Err(InviteError::Cancelled("connection closed before the invitation was complete".to_string()))
}

async fn flush<W: AsyncWrite + Unpin>(writer: &mut W, session: &mut Session) -> InviteResult<()> {
    let outbound = session.take_outbound();
    if !outbound.is_empty() {
        writer.write_all(&outbound).await.context(|| "sending to inviter")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_proto::{ack_line, key_digest, TOKEN_LEN};
    use crate::prompt::NonInteractive;
    use tempfile::TempDir;

    fn url_for(key: &Keypair) -> InvitationUrl {
        InvitationUrl::from_parts("127.0.0.1", key_digest(&key.public_base64()), [1; TOKEN_LEN]).unwrap()
    }

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.confdir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_is_trust_failure() {
        let dir = TempDir::new().unwrap();
        let pinned = Keypair::generate(KeyType::Ed25519);
        let presented = Keypair::generate(KeyType::Ed25519);
        let (client, mut server) = tokio::io::duplex(8192);

        let peer = tokio::spawn(async move {
            let mut greeting = vec![0u8; 128];
            let _ = server.read(&mut greeting).await.unwrap();
            let reply = format!("0 node1 17.7\n{}", ack_line(&presented.public_base64()));
            server.write_all(reply.as_bytes()).await.unwrap();
            server
        });

        let err = join_stream(client, &url_for(&pinned), &config_in(&dir), &mut NonInteractive)
            .await
            .unwrap_err();
        assert!(err.is_trust_failure());
        drop(peer.await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_protocol_mismatch_is_trust_failure() {
        let dir = TempDir::new().unwrap();
        let key = Keypair::generate(KeyType::Ed25519);
        let (client, mut server) = tokio::io::duplex(8192);
        let fingerprint = key.public_base64();

        tokio::spawn(async move {
            let mut greeting = vec![0u8; 128];
            let _ = server.read(&mut greeting).await.unwrap();
            let reply = format!("0 node1 18.0\n{}", ack_line(&fingerprint));
            server.write_all(reply.as_bytes()).await.unwrap();
            let _ = server.read(&mut greeting).await;
        });

        let err = join_stream(client, &url_for(&key), &config_in(&dir), &mut NonInteractive)
            .await
            .unwrap_err();
        assert!(err.is_trust_failure());
    }

    #[tokio::test]
    async fn test_close_before_completion_is_cancelled() {
        let dir = TempDir::new().unwrap();
        let key = Keypair::generate(KeyType::Ed25519);
        let (client, mut server) = tokio::io::duplex(8192);
        let fingerprint = key.public_base64();

        tokio::spawn(async move {
            let mut greeting = vec![0u8; 128];
            let _ = server.read(&mut greeting).await.unwrap();
            let reply = format!("0 node1 17.7\n{}", ack_line(&fingerprint));
            server.write_all(reply.as_bytes()).await.unwrap();
            // Swallow the first handshake message, then hang up.
            let _ = server.read(&mut greeting).await;
        });

        let err = join_stream(client, &url_for(&key), &config_in(&dir), &mut NonInteractive)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::Cancelled(_)), "got {:?}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let dir = TempDir::new().unwrap();
        let key = Keypair::generate(KeyType::Ed25519);
        let (client, _server) = tokio::io::duplex(8192);

        let err = join_stream(client, &url_for(&key), &config_in(&dir), &mut NonInteractive)
            .await
            .unwrap_err();
        assert!(matches!(err, InviteError::Timeout(_)));
    }
}
