//! Inviter side: issuing invitations and serving joiners

pub mod address;
pub mod issuer;
pub mod registry;
pub mod responder;
pub mod store;
pub mod url;

pub use address::{address_from_host_file, discover_hostname, resolve_address};
pub use issuer::{own_name, Invitation, InvitationIssuer};
pub use registry::{NoDaemon, NodeRegistry};
pub use responder::InvitationResponder;
pub use store::InvitationStore;
pub use url::InvitationUrl;
