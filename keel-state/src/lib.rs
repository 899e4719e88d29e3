//! Keel State Management
//!
//! Persists the resources Keel manages between runs.
//!
//! - **StateFile**: every managed resource with its provider identifier and
//!   last-read attributes
//! - **StateBackend**: storage for a state file (currently a local JSON file)
//!
//! # Example
//!
//! ```ignore
//! use keel_state::{LocalBackend, StateBackend, StateFile};
//!
//! let backend = LocalBackend::new();
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... apply changes ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use state::{ResourceState, StateFile, json_to_value, value_to_json};
