pub mod error;
pub mod identity;
pub mod store;

pub use error::CommonError;
pub use identity::{AuthError, IdentityProvider, TokenIdentity, User};
pub use store::{
    MemoryStore, ProjectSummary, ScriptRecord, ScriptStore, ScriptSummary, StoreError, StoreResult,
};
