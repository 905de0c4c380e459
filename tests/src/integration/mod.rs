//! Cross-crate integration flows.

pub mod federation;
pub mod flows;
pub mod shutdown_flow;
pub mod supervision;
