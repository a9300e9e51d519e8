//! Joiner side: redeeming an invitation

pub mod client;
pub mod session;

pub use client::{join, join_stream};
pub use session::{Session, SessionState};
