//! Participant directory
//!
//! The engine asks the directory whether a participant is connected before it
//! lets funds move. [`ParticipantRegistry`] is the in-process implementation:
//! it holds every registered participant and also performs the credential
//! check the transport layer needs to turn an API key into a caller code.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

use crate::types::{ParticipantCode, TransferError};

/// Errors raised by a directory backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Participant directory unavailable: {0}")]
    Unavailable(String),
}

/// Connectivity lookup by participant code
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// Whether `code` is registered and currently accepting transfers
    ///
    /// Callers treat an error as "not connected".
    async fn is_connected(&self, code: &str) -> Result<bool, DirectoryError>;
}

/// A registered participant (bank)
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Participant {
    pub code: ParticipantCode,
    pub name: String,
    pub api_key: String,
    pub active: bool,
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("active", &self.active)
            .finish()
    }
}

/// In-memory participant registry
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: DashMap<ParticipantCode, Participant>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_participants(participants: impl IntoIterator<Item = Participant>) -> Self {
        let registry = Self::new();
        for participant in participants {
            registry.register(participant);
        }
        registry
    }

    /// Register or replace a participant
    pub fn register(&self, participant: Participant) {
        self.participants
            .insert(participant.code.clone(), participant);
    }

    pub fn get(&self, code: &str) -> Option<Participant> {
        self.participants.get(code).map(|p| p.clone())
    }

    /// Mark a participant connected or disconnected
    ///
    /// Returns `false` if the code is not registered.
    pub fn set_active(&self, code: &str, active: bool) -> bool {
        match self.participants.get_mut(code) {
            Some(mut participant) => {
                participant.active = active;
                true
            }
            None => false,
        }
    }

    /// Codes of every connected participant, sorted
    pub fn connected(&self) -> Vec<ParticipantCode> {
        let mut codes: Vec<ParticipantCode> = self
            .participants
            .iter()
            .filter(|p| p.active)
            .map(|p| p.code.clone())
            .collect();
        codes.sort();
        codes
    }

    /// Resolve an API key to the caller's participant code
    ///
    /// The code must be upper-case ASCII alphanumeric, registered and
    /// active, and the key must match the registered one.
    pub fn authenticate(&self, code: &str, api_key: &str) -> Result<ParticipantCode, TransferError> {
        let well_formed = !code.is_empty()
            && code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());

        let authenticated = well_formed
            && self
                .participants
                .get(code)
                .map(|p| p.active && keys_match(&p.api_key, api_key))
                .unwrap_or(false);

        if authenticated {
            Ok(code.to_string())
        } else {
            Err(TransferError::InvalidCredentials {
                participant: code.to_string(),
            })
        }
    }
}

#[async_trait]
impl ParticipantDirectory for ParticipantRegistry {
    async fn is_connected(&self, code: &str) -> Result<bool, DirectoryError> {
        Ok(self
            .participants
            .get(code)
            .map(|p| p.active)
            .unwrap_or(false))
    }
}

/// Compare without short-circuiting on the first differing byte
fn keys_match(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
