// Authentication module
// Credential state, its persistence and the auth wire types

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteCredentialStore;
pub use store::{CredentialStore, MemoryCredentialStore};
pub use types::{
    expiration_from_lifetime, AuthResponse, CredentialSnapshot, RegisterRequest, RegisterUser,
    UploadResponse, UserCredentials, DEFAULT_TOKEN_LIFETIME_SECS,
};
