//! Credential storage and the register/authenticate operations.
//!
//! The store is an injectable mapping abstraction so persistence can be swapped
//! in without touching the auth logic. The in-memory implementation lives for
//! the process lifetime and starts pre-seeded with one bootstrap account.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{event, Level};

use crate::error::AuthError;
use crate::password::{hash_password, validate_password, verify_password};

/// One stored account record. Created at registration, never deleted.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// Mapping from username to credential record.
pub trait CredentialStore: Send + Sync {
    /// Insert a new record, failing if the username is already taken.
    fn insert(&self, credential: Credential) -> Result<(), AuthError>;

    /// Look up a record by username.
    fn find(&self, username: &str) -> Option<Credential>;
}

/// Create a new account after enforcing the password policy.
pub fn register(
    store: &dyn CredentialStore,
    username: &str,
    password: &str,
) -> Result<Credential, AuthError> {
    validate_password(password)?;
    let password_hash = hash_password(password)?;

    let credential = Credential {
        username: username.to_string(),
        password_hash,
        is_active: true,
    };
    store.insert(credential.clone())?;

    event!(Level::INFO, username, "new user registered");

    Ok(credential)
}

/// Check a username/password pair against the store.
///
/// Returns `None` both for an unknown username and for a wrong password, so
/// callers can't distinguish the two cases.
pub fn authenticate(
    store: &dyn CredentialStore,
    username: &str,
    password: &str,
) -> Option<Credential> {
    let credential = store.find(username)?;
    match verify_password(password, &credential.password_hash) {
        Ok(true) => Some(credential),
        _ => None,
    }
}

/// In-memory credential store.
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store pre-seeded with the `admin`/`admin` bootstrap account.
    ///
    /// The seed password is hashed directly, bypassing the registration policy.
    pub fn seeded() -> Result<Self, AuthError> {
        let store = Self::new();

        let credential = Credential {
            username: "admin".to_string(),
            password_hash: hash_password("admin")?,
            is_active: true,
        };
        store.insert(credential)?;

        Ok(store)
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn insert(&self, credential: Credential) -> Result<(), AuthError> {
        let mut records = self.records.write().expect("credential store poisoned");
        if records.contains_key(&credential.username) {
            return Err(AuthError::DuplicateUsername);
        }
        records.insert(credential.username.clone(), credential);
        Ok(())
    }

    fn find(&self, username: &str) -> Option<Credential> {
        let records = self.records.read().expect("credential store poisoned");
        records.get(username).cloned()
    }
}
