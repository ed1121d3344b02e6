pub mod bitboards;
pub mod common;
