//! Throwaway passwords for panel accounts
//!
//! The panel requires a password on create-user. Users sign in through
//! Discord, so the generated value is never shown to anyone.

use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

pub trait CredentialSource: Send + Sync {
    /// Produce an alphanumeric credential of exactly `length` characters
    fn generate(&self, length: usize) -> String;
}

pub type SharedCredentialSource = Arc<dyn CredentialSource>;

/// Thread-local CSPRNG over `[A-Za-z0-9]`
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCredentials;

impl CredentialSource for RandomCredentials {
    fn generate(&self, length: usize) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}
