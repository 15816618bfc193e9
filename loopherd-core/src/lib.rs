#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod keys;
pub mod model;

pub mod store {
    pub mod memory;
    pub mod redis;

    mod traits;
    pub use traits::{KeyEvent, Store, StoreValue, text_fields};

    pub mod events;
}

pub mod fingerprint;

pub mod colormap {
    pub mod artifact;
    pub mod builder;
    pub mod extract;
    pub mod quantize;
}

pub mod player {
    pub mod ipc;
    pub mod proc;
    pub mod supervisor;
}

pub mod events;
pub mod ingest;
pub mod reconcile;
pub mod scan;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports: stable API surface
pub use config::Config;
pub use error::{HerdError, Result};
pub use model::{LoopRecord, LoopStatus};
