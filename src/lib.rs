pub mod config;
pub mod diagnostics;
pub mod ephemeral;
pub mod resource;
pub mod revision;
pub mod state;
pub mod store;
pub mod tree;
