pub mod config;
pub mod core_channel;
pub mod core_identity;
pub mod core_invite;
pub mod core_join;
pub mod core_proto;
pub mod core_provision;
pub mod error;
pub mod logging;
pub mod prompt;

pub use config::Config;
pub use core_invite::{InvitationIssuer, InvitationResponder, InvitationUrl, NoDaemon, NodeRegistry};
pub use core_join::join;
pub use core_provision::Provisioned;
pub use error::{InviteError, InviteResult};
pub use logging::{init_logging, LogLevel};
pub use prompt::{NonInteractive, Prompter, StdinPrompter};
