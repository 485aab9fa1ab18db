//! `th-cli`: the `toolhost` binary's commands and composition root.

pub mod bootstrap;
pub mod cli;
