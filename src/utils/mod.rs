//! Command execution, SSH transport and string helpers

pub mod exec;
pub mod ssh;
pub mod string;
