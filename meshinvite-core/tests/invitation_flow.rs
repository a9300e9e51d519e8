/*
    Invitation flow over loopback TCP

    An inviter root with a running InvitationResponder, and joiners that
    redeem URLs into their own empty directories:
    - the happy path writes mesh.conf, hosts/<inviter> and hosts/<joiner>
    - a URL whose hash does not match the inviter key is a trust failure
    - cookies are single-use
    - records carrying unsafe directives or a self-overwrite are handled
*/

use meshinvite_core::config::{Config, ConfigPaths};
use meshinvite_core::core_invite::{InvitationIssuer, InvitationResponder, InvitationStore, InvitationUrl, NoDaemon};
use meshinvite_core::core_proto::{encode_token, key_digest, CHUNK_SEPARATOR, TOKEN_LEN};
use meshinvite_core::prompt::NonInteractive;
use meshinvite_core::{join, InviteError};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct Inviter {
    dir: TempDir,
    config: Config,
    host_config: String,
}

impl Inviter {
    /// Inviter `node1` listening on an ephemeral loopback port
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let host_config = format!("Address = 127.0.0.1 {}\nSubnet = 10.1.0.0/16\n", port);
        fs::create_dir_all(dir.path().join("hosts")).unwrap();
        fs::write(dir.path().join("mesh.conf"), "Name = node1\n").unwrap();
        fs::write(dir.path().join("hosts").join("node1"), &host_config).unwrap();

        let mut config = Config::default();
        config.paths.confbase = Some(dir.path().to_path_buf());
        config.invitation.discovery_endpoint = None;
        config.network.io_timeout = Duration::from_secs(10);

        let responder = Arc::new(InvitationResponder::new(&config).unwrap());
        tokio::spawn(responder.run(listener));

        Self { dir, config, host_config }
    }

    async fn invite(&self, name: &str) -> InvitationUrl {
        let mut prompter = NonInteractive;
        InvitationIssuer::new(&self.config, &NoDaemon, &mut prompter)
            .invite(name)
            .await
            .unwrap()
            .url
    }

    fn store(&self) -> InvitationStore {
        InvitationStore::new(&ConfigPaths::new(self.dir.path()), self.config.invitation.ttl)
    }

    /// Store a hand-written record and return a URL for it
    async fn custom_invitation(&self, record: &str, cookie: [u8; TOKEN_LEN]) -> InvitationUrl {
        let base = self.invite("placeholder").await;
        let key = self.store().load_key().unwrap().unwrap();
        assert_eq!(key_digest(&key.public_base64()), base.hash);

        self.store().create_record(&cookie, record).unwrap();
        InvitationUrl { cookie, ..base }
    }

    fn path(&self, relative: &str) -> std::path::PathBuf {
        self.dir.path().join(relative)
    }
}

fn joiner_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.confdir = dir.path().to_path_buf();
    config.network.connect_timeout = Duration::from_secs(5);
    config.network.io_timeout = Duration::from_secs(10);
    config
}

#[tokio::test]
async fn test_invite_then_join() {
    let inviter = Inviter::start().await;
    let url = inviter.invite("node2").await;
    let cookie_file = inviter.path("invitations").join(encode_token(&url.cookie));
    assert!(cookie_file.exists());

    let joiner = TempDir::new().unwrap();
    let done = join(&url, &joiner_config(&joiner), &mut NonInteractive).await.unwrap();

    assert_eq!(done.name, "node2");
    assert_eq!(done.paths.confbase(), joiner.path());

    let conf = fs::read_to_string(joiner.path().join("mesh.conf")).unwrap();
    assert_eq!(conf, "Name = node2\nConnectTo = node1\n");

    let node1 = fs::read_to_string(joiner.path().join("hosts").join("node1")).unwrap();
    assert_eq!(node1, inviter.host_config);

    let node2 = fs::read_to_string(joiner.path().join("hosts").join("node2")).unwrap();
    assert!(node2.contains(&format!("Ed25519PublicKey = {}\n", done.public_key)));
    assert!(joiner.path().join("ed25519_key.priv").exists());
    assert!(joiner.path().join("x25519_key.priv").exists());

    // The inviter learned the new key and forgot the invitation.
    let learned = fs::read_to_string(inviter.path("hosts/node2")).unwrap();
    assert_eq!(learned, format!("Ed25519PublicKey = {}\n", done.public_key));
    assert!(!cookie_file.exists());
}

#[tokio::test]
async fn test_tampered_hash_is_trust_failure() {
    let inviter = Inviter::start().await;
    let mut url = inviter.invite("node2").await;
    url.hash[0] ^= 0x01;

    let joiner = TempDir::new().unwrap();
    let err = join(&url, &joiner_config(&joiner), &mut NonInteractive).await.unwrap_err();

    assert!(err.is_trust_failure(), "got {:?}", err);
    assert!(!joiner.path().join("mesh.conf").exists());
}

#[tokio::test]
async fn test_cookie_is_single_use() {
    let inviter = Inviter::start().await;
    let url = inviter.invite("node2").await;

    let first = TempDir::new().unwrap();
    join(&url, &joiner_config(&first), &mut NonInteractive).await.unwrap();

    let second = TempDir::new().unwrap();
    let err = join(&url, &joiner_config(&second), &mut NonInteractive).await.unwrap_err();
    assert!(matches!(err, InviteError::Cancelled(_)), "got {:?}", err);
    assert!(!second.path().join("mesh.conf").exists());
}

#[tokio::test]
async fn test_unknown_cookie_is_refused() {
    let inviter = Inviter::start().await;
    let mut url = inviter.invite("node2").await;
    url.cookie = [0x5a; TOKEN_LEN];

    let joiner = TempDir::new().unwrap();
    let err = join(&url, &joiner_config(&joiner), &mut NonInteractive).await.unwrap_err();
    assert!(matches!(err, InviteError::Cancelled(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_unsafe_directives_are_dropped() {
    let inviter = Inviter::start().await;
    let record = format!(
        "Name = node3\nConnectTo = node1\nDevice = /dev/net/tun\nScriptsInterpreter = /bin/sh\n\
         Frobnicate = yes\nSubnet = 10.1.3.0/24\n{}\nName = node1\n{}",
        CHUNK_SEPARATOR, inviter.host_config
    );
    let url = inviter.custom_invitation(&record, [0x33; TOKEN_LEN]).await;

    let joiner = TempDir::new().unwrap();
    join(&url, &joiner_config(&joiner), &mut NonInteractive).await.unwrap();

    let conf = fs::read_to_string(joiner.path().join("mesh.conf")).unwrap();
    assert_eq!(conf, "Name = node3\nConnectTo = node1\n");

    let node3 = fs::read_to_string(joiner.path().join("hosts").join("node3")).unwrap();
    assert!(node3.starts_with("Subnet = 10.1.3.0/24\n"));
    assert!(!node3.contains("Device"));
}

#[tokio::test]
async fn test_secondary_chunk_cannot_overwrite_own_host() {
    let inviter = Inviter::start().await;
    let record = format!(
        "Name = node4\nConnectTo = node1\n{}\nName = node1\n{}Name = node4\nSubnet = 0.0.0.0/0\n",
        CHUNK_SEPARATOR, inviter.host_config
    );
    let url = inviter.custom_invitation(&record, [0x44; TOKEN_LEN]).await;

    let joiner = TempDir::new().unwrap();
    let err = join(&url, &joiner_config(&joiner), &mut NonInteractive).await.unwrap_err();

    assert!(matches!(err, InviteError::Policy(_)), "got {:?}", err);
    assert!(!joiner.path().join("hosts").join("node4").exists());
}

#[tokio::test]
async fn test_nothing_listening_fails_before_greeting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = InvitationUrl::from_parts(&format!("127.0.0.1:{}", port), [1; TOKEN_LEN], [2; TOKEN_LEN]).unwrap();
    let joiner = TempDir::new().unwrap();
    let err = join(&url, &joiner_config(&joiner), &mut NonInteractive).await.unwrap_err();

    assert!(matches!(err, InviteError::Io { .. }), "got {:?}", err);
}
