//! On-disk set of outstanding invitations and the key they share.

use crate::config::ConfigPaths;
use crate::core_identity::{read_private_key, remove_private_key, write_private_key, KeyType, Keypair};
use crate::core_proto::{encode_token, TOKEN_LEN};
use crate::error::{InviteError, InviteResult, IoContext};
use crate::logging::TRUST_TARGET;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Invitation files are named by their 24-character cookie
const RECORD_NAME_LEN: usize = 24;

pub struct InvitationStore {
    dir: PathBuf,
    key_path: PathBuf,
    ttl: Duration,
}

impl InvitationStore {
    pub fn new(paths: &ConfigPaths, ttl: Duration) -> Self {
        Self { dir: paths.invitations_dir(), key_path: paths.invitation_key(), ttl }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, cookie: &[u8; TOKEN_LEN]) -> PathBuf {
        self.dir.join(encode_token(cookie))
    }

    /// Create the invitation directory, owner-only
    pub fn ensure_dir(&self) -> InviteResult<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.dir).context(|| format!("creating directory {}", self.dir.display()))
    }

    pub fn garbage_collect(&self) -> InviteResult<usize> {
        self.garbage_collect_at(SystemTime::now())
    }

    /// Delete records not modified after `now - ttl`; returns how many remain.
    ///
    /// Entries that cannot be inspected are skipped; failing to list the
    /// directory at all is an error.
    pub fn garbage_collect_at(&self, now: SystemTime) -> InviteResult<usize> {
        let deadline = now.checked_sub(self.ttl);
        let entries =
            fs::read_dir(&self.dir).context(|| format!("reading directory {}", self.dir.display()))?;

        let mut count = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_name().len() != RECORD_NAME_LEN {
                continue;
            }

            let path = entry.path();
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not stat invitation");
                    continue;
                }
            };

            match deadline {
                Some(deadline) if modified <= deadline => {
                    debug!(path = %path.display(), "Removing expired invitation");
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Could not remove expired invitation");
                    }
                }
                _ => count += 1,
            }
        }

        Ok(count)
    }

    /// The key shared by all outstanding invitations.
    ///
    /// With `outstanding == 0` any old key is discarded first, so a fresh key
    /// is generated. A key file that exists but does not parse is an error.
    pub fn ephemeral_key(&self, outstanding: usize) -> InviteResult<Keypair> {
        if outstanding == 0 {
            remove_private_key(&self.key_path)?;
        }

        if let Some(key) = read_private_key(&self.key_path)? {
            return Ok(key);
        }

        let key = Keypair::generate(KeyType::Ed25519);
        write_private_key(&self.key_path, &key)?;
        info!(path = %self.key_path.display(), "Generated new invitation key");
        Ok(key)
    }

    /// Current invitation key, if any invitation was ever issued
    pub fn load_key(&self) -> InviteResult<Option<Keypair>> {
        read_private_key(&self.key_path)
    }

    /// Write a new record without ever replacing an existing one.
    ///
    /// The contents go to a temp file first and are hard-linked into place,
    /// so the record appears complete or not at all.
    pub fn create_record(&self, cookie: &[u8; TOKEN_LEN], contents: &str) -> InviteResult<PathBuf> {
        let path = self.record_path(cookie);
        let temp_path = self.dir.join(format!(".{}.tmp", encode_token(cookie)));

        let _ = fs::remove_file(&temp_path);
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let written = options
            .open(&temp_path)
            .and_then(|mut file| {
                file.write_all(contents.as_bytes())?;
                file.sync_all()
            })
            .and_then(|_| fs::hard_link(&temp_path, &path));
        let _ = fs::remove_file(&temp_path);

        written.context(|| format!("creating invitation file {}", path.display()))?;
        Ok(path)
    }

    /// Claim and consume the record for `cookie`.
    ///
    /// The record is renamed before it is read, so two connections can
    /// never redeem the same invitation.
    pub fn redeem(&self, cookie: &[u8; TOKEN_LEN]) -> InviteResult<String> {
        self.redeem_at(cookie, SystemTime::now())
    }

    pub fn redeem_at(&self, cookie: &[u8; TOKEN_LEN], now: SystemTime) -> InviteResult<String> {
        let path = self.record_path(cookie);
        let claimed = self.dir.join(format!(".{}.used", encode_token(cookie)));

        match fs::rename(&path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!(target: TRUST_TARGET, "Peer presented an unknown invitation cookie");
                return Err(InviteError::Trust("non-existing invitation".to_string()));
            }
            Err(e) => return Err(e).context(|| format!("claiming {}", path.display())),
        }

        let result = self.read_claimed(&claimed, now);
        if let Err(e) = fs::remove_file(&claimed) {
            warn!(path = %claimed.display(), error = %e, "Could not remove redeemed invitation");
        }
        result
    }

    fn read_claimed(&self, claimed: &Path, now: SystemTime) -> InviteResult<String> {
        let modified = fs::metadata(claimed)
            .and_then(|m| m.modified())
            .context(|| format!("inspecting {}", claimed.display()))?;

        if now.checked_sub(self.ttl).is_some_and(|deadline| modified <= deadline) {
            return Err(InviteError::Input("invitation has expired".to_string()));
        }

        fs::read_to_string(claimed).context(|| format!("reading {}", claimed.display()))
    }
}
