//! `host[:port]/<hash><cookie>` invitation URLs

use crate::core_proto::{decode_token, encode_token, TOKEN_LEN};
use crate::error::{InviteError, InviteResult};
use std::fmt;
use std::str::FromStr;

/// Length of the encoded `hash || cookie` segment
pub const URL_TOKEN_CHARS: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationUrl {
    /// Hostname or IP literal, without brackets
    pub host: String,
    pub port: Option<u16>,
    /// Digest of the inviter's invitation key
    pub hash: [u8; TOKEN_LEN],
    pub cookie: [u8; TOKEN_LEN],
}

impl InvitationUrl {
    /// Build from an address in `host`, `host:port` or `[v6]:port` form
    pub fn from_parts(
        address: &str,
        hash: [u8; TOKEN_LEN],
        cookie: [u8; TOKEN_LEN],
    ) -> InviteResult<Self> {
        let (host, port) = parse_address(address)?;
        Ok(Self { host, port, hash, cookie })
    }

    pub fn parse(text: &str) -> InviteResult<Self> {
        let text = text.trim();
        let (address, tokens) = text
            .split_once('/')
            .ok_or_else(|| InviteError::Input(format!("invalid invitation URL '{}'", text)))?;

        if tokens.len() != URL_TOKEN_CHARS || !tokens.is_ascii() {
            return Err(InviteError::Input(format!("invalid invitation URL '{}'", text)));
        }

        let hash = decode_token(&tokens[..URL_TOKEN_CHARS / 2])?;
        let cookie = decode_token(&tokens[URL_TOKEN_CHARS / 2..])?;

        Self::from_parts(address, hash, cookie)
    }

    pub fn port_or(&self, default_port: u16) -> u16 {
        self.port.unwrap_or(default_port)
    }

    /// Target for `TcpStream::connect`
    pub fn connect_target(&self, default_port: u16) -> (String, u16) {
        (self.host.clone(), self.port_or(default_port))
    }
}

impl FromStr for InvitationUrl {
    type Err = InviteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for InvitationUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}{}", encode_token(&self.hash), encode_token(&self.cookie))
    }
}

/// Split an address into host and optional port.
///
/// A bare address with more than one colon is an IPv6 literal without a
/// port.
fn parse_address(address: &str) -> InviteResult<(String, Option<u16>)> {
    let invalid = || InviteError::Input(format!("invalid address '{}'", address));

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        match after {
            "" => (host, None),
            _ => (host, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match address.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, Some(port)),
            _ => (address, None),
        }
    };

    if host.is_empty() || host.contains(['/', ' ', '\t']) {
        return Err(invalid());
    }

    // "host:" means the default port.
    let port = port
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u16>().map_err(|_| invalid()))
        .transpose()?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENS: &str = "AAECAwQFBgcICQoLDA0ODxARAAECAwQFBgcICQoLDA0ODxAR";

    fn sample() -> [u8; TOKEN_LEN] {
        let mut bytes = [0u8; TOKEN_LEN];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        bytes
    }

    #[test]
    fn test_parse_host_and_port() {
        let url = InvitationUrl::parse(&format!("vpn.example.com:1655/{}", TOKENS)).unwrap();
        assert_eq!(url.host, "vpn.example.com");
        assert_eq!(url.port, Some(1655));
        assert_eq!(url.hash, sample());
        assert_eq!(url.cookie, sample());
        assert_eq!(url.connect_target(655), ("vpn.example.com".to_string(), 1655));
    }

    #[test]
    fn test_default_port() {
        let url: InvitationUrl = format!("192.0.2.1/{}", TOKENS).parse().unwrap();
        assert_eq!(url.port, None);
        assert_eq!(url.port_or(655), 655);

        let url = InvitationUrl::parse(&format!("192.0.2.1:/{}", TOKENS)).unwrap();
        assert_eq!((url.host.as_str(), url.port), ("192.0.2.1", None));

        let url = InvitationUrl::parse(&format!("[::1]:/{}", TOKENS)).unwrap();
        assert_eq!((url.host.as_str(), url.port), ("::1", None));
    }

    #[test]
    fn test_ipv6_forms() {
        let url = InvitationUrl::parse(&format!("[2001:db8::1]:700/{}", TOKENS)).unwrap();
        assert_eq!(url.host, "2001:db8::1");
        assert_eq!(url.port, Some(700));
        assert_eq!(url.to_string(), format!("[2001:db8::1]:700/{}", TOKENS));

        let url = InvitationUrl::parse(&format!("[::1]/{}", TOKENS)).unwrap();
        assert_eq!((url.host.as_str(), url.port), ("::1", None));

        let url = InvitationUrl::parse(&format!("2001:db8::1/{}", TOKENS)).unwrap();
        assert_eq!((url.host.as_str(), url.port), ("2001:db8::1", None));
    }

    #[test]
    fn test_display_round_trip() {
        let text = format!("node1.example:655/{}", TOKENS);
        assert_eq!(InvitationUrl::parse(&text).unwrap().to_string(), text);
    }

    #[test]
    fn test_rejects_malformed_urls() {
        let cases = [
            TOKENS.to_string(),
            format!("host/{}", &TOKENS[1..]),
            format!("host/{}A", TOKENS),
            format!("host/{}", TOKENS.replace('A', "!")),
            format!("host:notaport/{}", TOKENS),
            format!("host:70000/{}", TOKENS),
            format!("[::1/{}", TOKENS),
            format!("[::1]x/{}", TOKENS),
            format!("/{}", TOKENS),
            format!("host/{}é", &TOKENS[2..]),
        ];
        for case in cases {
            assert!(
                matches!(InvitationUrl::parse(&case), Err(InviteError::Input(_))),
                "accepted {}",
                case
            );
        }
    }
}
