pub mod cli;
pub mod network;
