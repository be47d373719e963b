//! Command handlers for the storechat CLI.

pub mod ask;
pub mod corpus;

pub use ask::AskCommand;
