//! Applying a received configuration stream to the local configuration root

pub mod provisioner;
pub mod scanner;
pub mod variables;

pub use provisioner::{HostChunk, ProvisionPlan, Provisioned, Provisioner};
pub use scanner::{find_value, first_value, Directive, LineScanner};
pub use variables::{classify, lookup, ConfigVariable, VariablePolicy};
