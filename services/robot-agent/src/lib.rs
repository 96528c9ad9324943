//! Robot Agent Service Library
//!
//! Configuration and the interactive front-ends of the `robot-agent` binary.
//! The binary itself only parses arguments and wires these together.

pub mod chat;
pub mod config;
pub mod display;
pub mod voice;
