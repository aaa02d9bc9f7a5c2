//! Command implementations for the batchline CLI

pub mod receive;
pub mod run;
