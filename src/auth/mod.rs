//! Auth strategies - flows, session state, token extraction and remembered credentials

pub mod credentials;
pub mod extract;
pub mod session;
pub mod strategy;

pub use credentials::{
    Credential, CredentialStore, CredentialStoreError, GuardedStore, KeyringStore, MemoryStore,
};
pub use extract::{extract, extract_token, ExtractionError};
pub use session::{AuthError, AuthSession, AuthState};
pub use strategy::{AuthContribution, AuthFlow, BasicCredentials, PromptField};
