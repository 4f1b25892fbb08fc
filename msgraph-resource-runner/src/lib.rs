//! Run Microsoft Graph resources from the command line, without a
//! configuration language in between.

pub mod graph_client;
pub mod inputs;
pub mod operations;
pub mod state;
