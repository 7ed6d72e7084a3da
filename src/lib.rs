//! Terminal dialog that collects a PIN or passphrase, or asks a yes/no
//! question, on behalf of a credential daemon.
//!
//! The secret lives only in buffers obtained from a [`secmem::SecureAllocator`]
//! and is wiped on every exit path.

pub mod app;
pub mod config;
pub mod dialog;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod governor;
pub mod input;
pub mod locale;
pub mod nav;
pub mod quality;
pub mod render;
pub mod secmem;
pub mod terminal;
pub mod touch;
pub mod validator;
pub mod wrap;

pub use config::DialogRequest;
pub use dialog::{Dialog, Outcome, Reply, Secret};
pub use error::{DialogError, ErrorCode, Result};
