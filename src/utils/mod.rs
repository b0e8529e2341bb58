/// Shared helpers for network math and external commands
pub mod cidr;
pub mod command;

pub use cidr::Cidr;
pub use command::CommandBuilder;
