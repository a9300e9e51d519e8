//! Working out the address joiners should connect to.

use crate::config::InvitationConfig;
use crate::core_provision::Directive;
use crate::error::{timed, InviteError, InviteResult, IoContext};
use crate::prompt::{Prompter, MAX_PROMPT_ATTEMPTS};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

const MAX_DISCOVERY_RESPONSE: u64 = 4096;

/// First `Address = host [port]` of a host file, as `host` or `host:port`
pub fn address_from_host_file(contents: &str) -> Option<String> {
    let value = contents
        .lines()
        .map(Directive::parse)
        .find(|d| d.is("Address"))?
        .value;

    let mut fields = value.split_whitespace();
    let host = fields.next()?;
    Some(match fields.next() {
        Some(port) if host.contains(':') => format!("[{}]:{}", host, port),
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Hostnames we accept from discovery or the user
pub fn is_valid_hostname(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Ask `endpoint` (`host:port`) for our externally visible hostname.
///
/// The answer is the last line of the HTTP response.
pub async fn discover_hostname(endpoint: &str, limit: Duration) -> InviteResult<String> {
    timed(limit, "discovering external hostname", async {
        let mut stream = TcpStream::connect(endpoint)
            .await
            .context(|| format!("connecting to {}", endpoint))?;
        stream
            .write_all(b"GET /host HTTP/1.0\r\n\r\n")
            .await
            .context(|| format!("querying {}", endpoint))?;

        let mut response = Vec::new();
        stream
            .take(MAX_DISCOVERY_RESPONSE)
            .read_to_end(&mut response)
            .await
            .context(|| format!("reading from {}", endpoint))?;

        let text = String::from_utf8_lossy(&response);
        let hostname = text.trim_end_matches(['\r', '\n']).rsplit('\n').next().unwrap_or("").trim();

        if is_valid_hostname(hostname) {
            Ok(hostname.to_string())
        } else {
            Err(InviteError::Input(format!("{} returned an unusable hostname", endpoint)))
        }
    })
    .await
}

/// Address to put in an invitation URL.
///
/// Taken from our own host file when it names one. Otherwise it is
/// discovered and/or asked for, then recorded in the host file.
pub async fn resolve_address(
    host_file: &Path,
    invitation: &InvitationConfig,
    limit: Duration,
    prompter: &mut dyn Prompter,
) -> InviteResult<String> {
    match fs::read_to_string(host_file) {
        Ok(contents) => {
            if let Some(address) = address_from_host_file(&contents) {
                return Ok(address);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context(|| format!("reading {}", host_file.display())),
    }

    let mut discovered = None;
    if let Some(endpoint) = invitation.discovery_endpoint.as_deref() {
        info!(endpoint, "Trying to discover externally visible hostname");
        match discover_hostname(endpoint, limit).await {
            Ok(hostname) => discovered = Some(hostname),
            Err(e) => warn!(error = %e, "Hostname discovery failed"),
        }
    }

    let hostname = if prompter.is_interactive() {
        ask_hostname(prompter, discovered).await?
    } else {
        discovered.ok_or_else(|| {
            InviteError::Input(format!(
                "could not determine the external address; add an Address line to {}",
                host_file.display()
            ))
        })?
    };

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(host_file)
        .context(|| format!("opening {}", host_file.display()))?;
    write!(file, "\nAddress = {}\n", hostname)
        .context(|| format!("appending Address to {}", host_file.display()))?;

    Ok(hostname)
}

async fn ask_hostname(prompter: &mut dyn Prompter, suggestion: Option<String>) -> InviteResult<String> {
    let message = match &suggestion {
        Some(hostname) => format!("Please enter your host's external address or hostname [{}]: ", hostname),
        None => "Please enter your host's external address or hostname: ".to_string(),
    };

    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let answer = prompter
            .prompt(&message)
            .await?
            .ok_or_else(|| InviteError::Cancelled("no address given".to_string()))?;
        let answer = answer.trim();

        if answer.is_empty() {
            if let Some(hostname) = &suggestion {
                return Ok(hostname.clone());
            }
            continue;
        }

        if is_valid_hostname(answer) {
            return Ok(answer.to_string());
        }
        warn!(answer, "Invalid address or hostname");
    }

    Err(InviteError::Cancelled("no usable address given".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{NonInteractive, ScriptedPrompter};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn no_discovery() -> InvitationConfig {
        InvitationConfig { discovery_endpoint: None, ..Default::default() }
    }

    #[test]
    fn test_address_from_host_file() {
        assert_eq!(address_from_host_file("Address = vpn.example.com\n").as_deref(), Some("vpn.example.com"));
        assert_eq!(address_from_host_file("Subnet = x\naddress=192.0.2.1 700\n").as_deref(), Some("192.0.2.1:700"));
        assert_eq!(address_from_host_file("Address = 2001:db8::1 700").as_deref(), Some("[2001:db8::1]:700"));
        assert_eq!(address_from_host_file("Subnet = 10.0.0.0/8\n"), None);
        assert_eq!(address_from_host_file("Address =\n"), None);
    }

    #[test]
    fn test_hostname_validation() {
        assert!(is_valid_hostname("node-1.example.com"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("<html>"));
        assert!(!is_valid_hostname("a b"));
    }

    #[tokio::test]
    async fn test_discovery_takes_last_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 64];
            let _ = socket.read(&mut request).await.unwrap();
            socket.write_all(b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nhost.example.net\n").await.unwrap();
        });

        let hostname = discover_hostname(&endpoint, Duration::from_secs(5)).await.unwrap();
        assert_eq!(hostname, "host.example.net");
    }

    #[tokio::test]
    async fn test_resolve_prefers_host_file() {
        let dir = TempDir::new().unwrap();
        let host_file = dir.path().join("node1");
        fs::write(&host_file, "Address = 192.0.2.1\n").unwrap();

        let address = resolve_address(&host_file, &no_discovery(), Duration::from_secs(1), &mut NonInteractive)
            .await
            .unwrap();
        assert_eq!(address, "192.0.2.1");
        assert_eq!(fs::read_to_string(&host_file).unwrap(), "Address = 192.0.2.1\n");
    }

    #[tokio::test]
    async fn test_resolve_prompts_and_records_address() {
        let dir = TempDir::new().unwrap();
        let host_file = dir.path().join("node1");
        fs::write(&host_file, "Ed25519PublicKey = AAAA\n").unwrap();

        let mut prompter = ScriptedPrompter::new(["", "bad host!", "vpn.example.org"]);
        let address = resolve_address(&host_file, &no_discovery(), Duration::from_secs(1), &mut prompter)
            .await
            .unwrap();

        assert_eq!(address, "vpn.example.org");
        assert_eq!(prompter.asked.len(), 3);
        assert_eq!(
            fs::read_to_string(&host_file).unwrap(),
            "Ed25519PublicKey = AAAA\n\nAddress = vpn.example.org\n"
        );
    }

    #[tokio::test]
    async fn test_resolve_without_address_fails_in_batch_mode() {
        let dir = TempDir::new().unwrap();
        let host_file = dir.path().join("node1");
        fs::write(&host_file, "").unwrap();

        let result = resolve_address(&host_file, &no_discovery(), Duration::from_secs(1), &mut NonInteractive).await;
        assert!(matches!(result, Err(InviteError::Input(_))));
    }
}
