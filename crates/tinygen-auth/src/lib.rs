mod error;
mod password;
mod store;
mod token;

pub use self::{
    error::AuthError,
    password::{hash_password, validate_password, verify_password},
    store::{authenticate, register, Credential, CredentialStore, MemoryCredentialStore},
    token::{authorize, issue_token, verify_token, TokenConfig},
};
