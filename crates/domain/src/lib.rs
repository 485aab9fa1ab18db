//! `th-domain`: configuration types shared by every Toolhost crate.
//!
//! The supervisor, the MCP client and the CLI all read their settings from
//! the structs in [`config`]; keeping them here lets the CLI deserialize the
//! whole TOML file without pulling in the runtime crates.

pub mod config;
