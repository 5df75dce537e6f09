//! ticketctl - command-line client for ticketd

pub mod cli;
pub mod output;
pub mod rpc_client;
