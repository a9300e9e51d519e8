//! Which configuration directives a remote peer may hand us.

pub const VAR_SERVER: u8 = 1;
pub const VAR_HOST: u8 = 2;
pub const VAR_MULTIPLE: u8 = 4;
pub const VAR_OBSOLETE: u8 = 8;
pub const VAR_SAFE: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigVariable {
    pub name: &'static str,
    pub flags: u8,
}

impl ConfigVariable {
    pub fn is_safe(&self) -> bool {
        self.flags & VAR_SAFE != 0
    }

    /// Belongs in a host file rather than the primary config
    pub fn is_host_scoped(&self) -> bool {
        self.flags & VAR_HOST != 0
    }
}

/// Where an incoming directive may go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariablePolicy {
    Unknown,
    Unsafe(&'static ConfigVariable),
    SafeGlobal(&'static ConfigVariable),
    SafeHost(&'static ConfigVariable),
}

const fn var(name: &'static str, flags: u8) -> ConfigVariable {
    ConfigVariable { name, flags }
}

pub static VARIABLES: &[ConfigVariable] = &[
    // Server configuration
    var("AddressFamily", VAR_SERVER),
    var("AutoConnect", VAR_SERVER | VAR_SAFE),
    var("BindToAddress", VAR_SERVER | VAR_MULTIPLE),
    var("BindToInterface", VAR_SERVER),
    var("Broadcast", VAR_SERVER | VAR_SAFE),
    var("ConnectTo", VAR_SERVER | VAR_MULTIPLE | VAR_SAFE),
    var("DecrementTTL", VAR_SERVER),
    var("Device", VAR_SERVER),
    var("DeviceType", VAR_SERVER),
    var("DirectOnly", VAR_SERVER),
    var("Ed25519PrivateKeyFile", VAR_SERVER),
    var("Forwarding", VAR_SERVER),
    var("Hostnames", VAR_SERVER),
    var("Interface", VAR_SERVER),
    var("KeyExpire", VAR_SERVER),
    var("ListenAddress", VAR_SERVER | VAR_MULTIPLE),
    var("LocalDiscovery", VAR_SERVER),
    var("MACExpire", VAR_SERVER),
    var("MaxConnectionBurst", VAR_SERVER),
    var("MaxOutputBufferSize", VAR_SERVER),
    var("MaxTimeout", VAR_SERVER),
    var("Mode", VAR_SERVER | VAR_SAFE),
    var("Name", VAR_SERVER),
    var("PingInterval", VAR_SERVER),
    var("PingTimeout", VAR_SERVER),
    var("PrivateKey", VAR_SERVER | VAR_OBSOLETE),
    var("PrivateKeyFile", VAR_SERVER),
    var("ProcessPriority", VAR_SERVER),
    var("Proxy", VAR_SERVER),
    var("ReplayWindow", VAR_SERVER),
    var("ScriptsExtension", VAR_SERVER),
    var("ScriptsInterpreter", VAR_SERVER),
    var("StrictSubnets", VAR_SERVER),
    var("TunnelServer", VAR_SERVER),
    var("UDPRcvBuf", VAR_SERVER),
    var("UDPSndBuf", VAR_SERVER),
    // Host configuration
    var("Address", VAR_HOST | VAR_MULTIPLE),
    var("Cipher", VAR_SERVER | VAR_HOST),
    var("ClampMSS", VAR_SERVER | VAR_HOST),
    var("Compression", VAR_SERVER | VAR_HOST),
    var("Digest", VAR_SERVER | VAR_HOST),
    var("Ed25519PublicKey", VAR_HOST),
    var("Ed25519PublicKeyFile", VAR_SERVER | VAR_HOST),
    var("IndirectData", VAR_SERVER | VAR_HOST),
    var("MACLength", VAR_SERVER | VAR_HOST),
    var("PMTU", VAR_SERVER | VAR_HOST),
    var("PMTUDiscovery", VAR_SERVER | VAR_HOST),
    var("Port", VAR_HOST),
    var("PublicKey", VAR_HOST | VAR_OBSOLETE),
    var("PublicKeyFile", VAR_SERVER | VAR_HOST | VAR_OBSOLETE),
    var("Subnet", VAR_HOST | VAR_MULTIPLE | VAR_SAFE),
    var("TCPOnly", VAR_SERVER | VAR_HOST),
    var("Weight", VAR_HOST | VAR_SAFE),
    var("X25519PublicKey", VAR_HOST),
];

/// Case-insensitive lookup
pub fn lookup(name: &str) -> Option<&'static ConfigVariable> {
    VARIABLES.iter().find(|v| v.name.eq_ignore_ascii_case(name))
}

pub fn classify(name: &str) -> VariablePolicy {
    match lookup(name) {
        None => VariablePolicy::Unknown,
        Some(v) if !v.is_safe() => VariablePolicy::Unsafe(v),
        Some(v) if v.is_host_scoped() => VariablePolicy::SafeHost(v),
        Some(v) => VariablePolicy::SafeGlobal(v),
    }
}
