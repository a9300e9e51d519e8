//! Private key files, readable by the owner only.

use super::keypair::Keypair;
use crate::error::{InviteResult, IoContext};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

/// Write `kp` to `path`, replacing any previous key.
///
/// The key is written to a sibling temp file with mode 0600 and renamed
/// into place, so a reader never sees a half-written key.
pub fn write_private_key(path: &Path, kp: &Keypair) -> InviteResult<()> {
    let bytes = kp.serialize()?;
    let temp_path = path.with_extension("tmp");

    let _ = fs::remove_file(&temp_path);
    let mut file = owner_only(OpenOptions::new().write(true).create_new(true))
        .open(&temp_path)
        .context(|| format!("creating {}", temp_path.display()))?;
    file.write_all(&bytes)
        .and_then(|_| file.sync_all())
        .context(|| format!("writing {}", temp_path.display()))?;
    drop(file);

    fs::rename(&temp_path, path).context(|| format!("installing {}", path.display()))
}

/// Load a key file; `Ok(None)` when it does not exist.
///
/// A file that exists but cannot be parsed is an error, never a
/// reason to generate a replacement.
pub fn read_private_key(path: &Path) -> InviteResult<Option<Keypair>> {
    match fs::read(path) {
        Ok(bytes) => Keypair::deserialize(&bytes).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context(|| format!("reading {}", path.display())),
    }
}

/// Remove a key file if present
pub fn remove_private_key(path: &Path) -> InviteResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(|| format!("removing {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_identity::KeyType;
    use crate::error::InviteError;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ed25519_key.priv");
        let kp = Keypair::generate(KeyType::Ed25519);

        write_private_key(&path, &kp).unwrap();
        let loaded = read_private_key(&path).unwrap().unwrap();
        assert_eq!(loaded.public_key(), kp.public_key());
        assert!(!path.with_extension("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x25519_key.priv");
        write_private_key(&path, &Keypair::generate(KeyType::X25519)).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_and_corrupt_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.priv");
        assert!(read_private_key(&path).unwrap().is_none());

        fs::write(&path, b"not a key").unwrap();
        assert!(matches!(read_private_key(&path), Err(InviteError::Key(_))));

        remove_private_key(&path).unwrap();
        remove_private_key(&path).unwrap();
        assert!(!path.exists());
    }
}
