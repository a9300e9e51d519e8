//! Turns a received configuration stream into a local configuration root.
//!
//! The stream is split into a [`ProvisionPlan`] before anything touches
//! the disk, so a stream that breaks the rules is rejected without leaving
//! files behind. I/O failures while applying the plan are not rolled back.

use super::scanner::{first_value, Directive, LineScanner};
use super::variables::{classify, VariablePolicy};
use crate::config::{Config, ConfigPaths};
use crate::core_identity::{check_id, check_netname, write_private_key, KeyType, Keypair};
use crate::core_proto::CHUNK_SEPARATOR;
use crate::error::{InviteError, InviteResult, IoContext};
use crate::prompt::{Prompter, MAX_PROMPT_ATTEMPTS};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Verbatim configuration of another node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostChunk {
    pub name: String,
    pub contents: String,
}

/// What a configuration stream asks us to write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionPlan {
    /// Our assigned node name
    pub name: String,
    pub netname: Option<String>,
    /// Safe global directives for `mesh.conf`, already formatted
    pub conf_lines: Vec<String>,
    /// Safe host directives for our own host file
    pub host_lines: Vec<String>,
    pub hosts: Vec<HostChunk>,
    /// Directives that were not allowed through
    pub dropped: Vec<String>,
}

impl ProvisionPlan {
    pub fn from_stream(data: &str) -> InviteResult<Self> {
        let name = first_value(data, "Name")
            .ok_or_else(|| InviteError::Input("no Name found in invitation".to_string()))?;
        if !check_id(name) {
            return Err(InviteError::Input(format!("invalid Name '{}' found in invitation", name)));
        }

        let mut plan = ProvisionPlan { name: name.to_string(), ..Default::default() };
        let mut lines = LineScanner::new(data);
        let mut next_chunk = None;

        // First chunk: filtered through the variable table.
        for line in lines.by_ref() {
            let line = line?;
            if line.starts_with('#') {
                continue;
            }

            let directive = Directive::parse(line);
            if directive.key.is_empty() {
                continue;
            }

            if directive.is("Name") {
                if directive.value == plan.name {
                    continue;
                }
                next_chunk = Some(directive.value.to_string());
                break;
            }

            if directive.is("NetName") {
                if plan.netname.is_none() {
                    plan.netname = Some(directive.value.to_string());
                }
                continue;
            }

            match classify(directive.key) {
                VariablePolicy::Unknown => {
                    warn!(variable = directive.key, "Ignoring unknown variable in invitation");
                    plan.dropped.push(directive.key.to_string());
                }
                VariablePolicy::Unsafe(_) => {
                    warn!(variable = directive.key, "Ignoring unsafe variable in invitation");
                    plan.dropped.push(directive.key.to_string());
                }
                VariablePolicy::SafeGlobal(var) => {
                    plan.conf_lines.push(format!("{} = {}", var.name, directive.value));
                }
                VariablePolicy::SafeHost(var) => {
                    plan.host_lines.push(format!("{} = {}", var.name, directive.value));
                }
            }
        }

        // Every further chunk is another node's host file, copied as is.
        while let Some(chunk_name) = next_chunk.take() {
            if !check_id(&chunk_name) {
                return Err(InviteError::Input(format!(
                    "invalid Name '{}' found in invitation",
                    chunk_name
                )));
            }
            if chunk_name == plan.name {
                return Err(InviteError::Policy(
                    "secondary chunk would overwrite our own host config file".to_string(),
                ));
            }

            let mut contents = String::new();
            while let Some(line) = lines.next() {
                let line = line?;
                if line == CHUNK_SEPARATOR {
                    continue;
                }
                let directive = Directive::parse(line);
                if directive.is("Name") {
                    next_chunk = Some(directive.value.to_string());
                    break;
                }
                contents.push_str(line);
                if lines.terminated() {
                    contents.push('\n');
                }
            }

            plan.hosts.push(HostChunk { name: chunk_name, contents });
        }

        Ok(plan)
    }
}

/// Result of a successful provisioning
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub name: String,
    pub paths: ConfigPaths,
    /// Base64 Ed25519 public key, to be sent back to the inviter
    pub public_key: String,
}

/// Writes a [`ProvisionPlan`] below the configuration root.
pub struct Provisioner<'a> {
    confdir: PathBuf,
    netname: Option<String>,
    confbase: Option<PathBuf>,
    prompter: &'a mut dyn Prompter,
}

impl<'a> Provisioner<'a> {
    pub fn new(config: &Config, prompter: &'a mut dyn Prompter) -> Self {
        Self {
            confdir: config.paths.confdir.clone(),
            netname: config.paths.netname.clone(),
            confbase: config.paths.confbase.clone(),
            prompter,
        }
    }

    /// Split `blob`, pick a free configuration root and write everything.
    pub async fn finalize(&mut self, blob: &[u8]) -> InviteResult<Provisioned> {
        let data = std::str::from_utf8(blob)
            .map_err(|_| InviteError::Input("invitation data is not valid UTF-8".to_string()))?;
        let plan = ProvisionPlan::from_stream(data)?;

        if let Some(net) = plan.netname.as_deref() {
            if self.netname.is_none() && !check_netname(net) {
                return Err(InviteError::Input(format!("invalid NetName '{}' in invitation", net)));
            }
        }

        let paths = self.resolve_root(plan.netname.clone()).await?;
        info!(name = %plan.name, confbase = %paths.confbase().display(), "Provisioning configuration");

        create_dir(paths.confbase())?;
        create_dir(&paths.hosts_dir())?;

        let mut conf = format!("Name = {}\n", plan.name);
        for line in &plan.conf_lines {
            conf.push_str(line);
            conf.push('\n');
        }
        write_file(&paths.conf_file(), &conf)?;

        let own_host = paths.host_file(&plan.name);
        let mut host = String::new();
        for line in &plan.host_lines {
            host.push_str(line);
            host.push('\n');
        }
        write_file(&own_host, &host)?;

        for chunk in &plan.hosts {
            debug!(host = %chunk.name, "Writing host file from invitation");
            write_file(&paths.host_file(&chunk.name), &chunk.contents)?;
        }

        let signing = Keypair::generate(KeyType::Ed25519);
        write_private_key(&paths.signing_key(), &signing)?;
        let public_key = signing.public_base64();
        append_line(&own_host, &format!("Ed25519PublicKey = {}", public_key))?;

        let encryption = Keypair::generate(KeyType::X25519);
        write_private_key(&paths.encryption_key(), &encryption)?;
        append_line(&own_host, &format!("X25519PublicKey = {}", encryption.public_base64()))?;

        Ok(Provisioned { name: plan.name, paths, public_key })
    }

    /// First root without an existing `mesh.conf`.
    ///
    /// An explicit confbase, or a batch run, fails on collision. Otherwise
    /// the user is asked for another netname.
    async fn resolve_root(&mut self, from_stream: Option<String>) -> InviteResult<ConfigPaths> {
        let mut netname = self.netname.clone().or(from_stream);
        let mut attempts = 0;

        loop {
            let paths = match &self.confbase {
                Some(base) => ConfigPaths::new(base.clone()),
                None => ConfigPaths::resolve(&self.confdir, netname.as_deref()),
            };

            let conf_file = paths.conf_file();
            if !conf_file.exists() {
                return Ok(paths);
            }

            warn!(path = %conf_file.display(), "Configuration file already exists");
            if !self.prompter.is_interactive() || self.confbase.is_some() {
                return Err(InviteError::Input(format!(
                    "configuration file {} already exists",
                    conf_file.display()
                )));
            }

            netname = loop {
                attempts += 1;
                if attempts > MAX_PROMPT_ATTEMPTS {
                    return Err(InviteError::Cancelled("no usable netname given".to_string()));
                }

                let answer = self
                    .prompter
                    .prompt("Enter a new netname: ")
                    .await?
                    .ok_or_else(|| InviteError::Cancelled("no netname given".to_string()))?;
                let answer = answer.trim();

                if answer.is_empty() {
                    continue;
                }
                if !check_netname(answer) {
                    warn!(netname = answer, "Invalid netname");
                    continue;
                }
                break Some(answer.to_string());
            };
        }
    }
}

fn create_dir(path: &Path) -> InviteResult<()> {
    fs::create_dir_all(path).context(|| format!("creating directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> InviteResult<()> {
    fs::write(path, contents).context(|| format!("writing {}", path.display()))
}

fn append_line(path: &Path, line: &str) -> InviteResult<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{}", line).context(|| format!("appending to {}", path.display()))
}
