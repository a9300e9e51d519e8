//! Issuing invitations.
//!
//! An invitation record looks like this:
//!
//! ```text
//! Name = node2
//! NetName = office
//! ConnectTo = node1
//! #---------------------------------------------------------------#
//! Name = node1
//! <contents of hosts/node1>
//! ```

use super::address::resolve_address;
use super::registry::NodeRegistry;
use super::store::InvitationStore;
use super::url::InvitationUrl;
use crate::config::{Config, ConfigPaths};
use crate::core_identity::check_id;
use crate::core_proto::{key_digest, CHUNK_SEPARATOR, TOKEN_LEN};
use crate::core_provision::{find_value, LineScanner};
use crate::error::{InviteError, InviteResult, IoContext};
use crate::prompt::Prompter;
use rand::RngCore;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// A freshly issued invitation
#[derive(Debug, Clone)]
pub struct Invitation {
    pub url: InvitationUrl,
    pub record: PathBuf,
}

pub struct InvitationIssuer<'a> {
    config: &'a Config,
    paths: ConfigPaths,
    store: InvitationStore,
    registry: &'a dyn NodeRegistry,
    prompter: &'a mut dyn Prompter,
}

impl<'a> InvitationIssuer<'a> {
    pub fn new(config: &'a Config, registry: &'a dyn NodeRegistry, prompter: &'a mut dyn Prompter) -> Self {
        let paths = config.config_paths();
        let store = InvitationStore::new(&paths, config.invitation.ttl);
        Self { config, paths, store, registry, prompter }
    }

    /// Create an invitation for the node `target`.
    pub async fn invite(&mut self, target: &str) -> InviteResult<Invitation> {
        if !check_id(target) {
            return Err(InviteError::Input(format!("invalid name for node: '{}'", target)));
        }

        let my_name = own_name(&self.paths)?;

        if self.paths.host_file(target).exists() {
            return Err(InviteError::Input(format!("a host config file for {} already exists", target)));
        }

        match self.registry.known_nodes().await {
            Ok(nodes) if nodes.iter().any(|n| n == target) => {
                return Err(InviteError::Input(format!("a node with name {} is already known", target)));
            }
            Ok(_) => {}
            Err(reason) => debug!(%reason, "Not checking running daemon for name collisions"),
        }

        self.store.ensure_dir()?;
        let outstanding = self.store.garbage_collect()?;
        let key = self.store.ephemeral_key(outstanding)?;
        let hash = key_digest(&key.public_base64());

        let mut cookie = [0u8; TOKEN_LEN];
        rand::rng().fill_bytes(&mut cookie);

        // Resolved first so a newly learned Address is part of the copied host file.
        let own_host = self.paths.host_file(&my_name);
        let address = resolve_address(
            &own_host,
            &self.config.invitation,
            self.config.network.connect_timeout,
            &mut *self.prompter,
        )
        .await?;
        let url = InvitationUrl::from_parts(&address, hash, cookie)?;

        let host_config =
            fs::read_to_string(&own_host).context(|| format!("reading {}", own_host.display()))?;
        // The joiner scans the copy line by line and would refuse it.
        if let Some(Err(e)) = LineScanner::new(&host_config).find(Result::is_err) {
            return Err(InviteError::Input(format!("{} cannot be sent: {}", own_host.display(), e)));
        }

        let mut record = format!("Name = {}\n", target);
        if let Some(netname) = &self.config.paths.netname {
            record.push_str(&format!("NetName = {}\n", netname));
        }
        record.push_str(&format!("ConnectTo = {}\n", my_name));
        record.push_str(CHUNK_SEPARATOR);
        record.push('\n');
        record.push_str(&format!("Name = {}\n", my_name));
        record.push_str(&host_config);

        let path = self.store.create_record(&cookie, &record)?;
        info!(node = target, outstanding = outstanding + 1, "Invitation created");

        Ok(Invitation { url, record: path })
    }
}

/// Our node name from the first `Name` in `mesh.conf`
pub fn own_name(paths: &ConfigPaths) -> InviteResult<String> {
    let conf_file = paths.conf_file();
    let conf = fs::read_to_string(&conf_file).context(|| format!("reading {}", conf_file.display()))?;

    let name = find_value(&conf, "Name")
        .ok_or_else(|| InviteError::Input(format!("no Name in {}", conf_file.display())))?;
    if !check_id(name) {
        return Err(InviteError::Input(format!("invalid Name '{}' in {}", name, conf_file.display())));
    }
    Ok(name.to_string())
}
