//! Core types for kgweave.

mod document;
mod graph;
mod message;

pub use document::*;
pub use graph::*;
pub use message::*;
