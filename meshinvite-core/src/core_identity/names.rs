//! Validation of node names and network namespaces.
//!
//! Both end up as path components, so anything received from a peer
//! has to pass through here before touching the filesystem.

/// Node names: ASCII alphanumerics and `_`, non-empty
pub fn check_id(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Network namespaces: ASCII alphanumerics, `_`, `-` and `.`, not starting with `.`
pub fn check_netname(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_id() {
        assert!(check_id("node1"));
        assert!(check_id("Office_GW"));
        assert!(!check_id(""));
        assert!(!check_id("node-1"));
        assert!(!check_id("../etc"));
        assert!(!check_id("a b"));
        assert!(!check_id("nöde"));
    }

    #[test]
    fn test_check_netname() {
        assert!(check_netname("office"));
        assert!(check_netname("vpn-2.lab"));
        assert!(!check_netname(""));
        assert!(!check_netname(".hidden"));
        assert!(!check_netname(".."));
        assert!(!check_netname("a/b"));
        assert!(!check_netname("a\\b"));
    }
}
