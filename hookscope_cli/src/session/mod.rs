//! Session identity: registration, validation and the stored credential

mod client;
mod store;

pub use client::Session;
pub use store::{Credential, CredentialStore};
