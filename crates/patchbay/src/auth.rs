// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identity-provider contract.
//!
//! The control plane is agnostic about how bearer tokens are minted. The
//! gateway needs a validator that yields the subject's email; the router
//! and metrics services need an audience-scoped accept/reject. An
//! OIDC/JWKS validator implements these traits in deployments; the
//! shared-secret implementation below serves development setups and
//! tests.

use crate::error::Error;
use async_trait::async_trait;

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub email: String,
}

/// Validates principal-bearing tokens, yielding the subject.
#[async_trait]
pub trait SubjectValidator: Send + Sync + 'static {
    async fn validate(&self, token: &str) -> Result<Subject, Error>;
}

/// Validates audience-scoped peer tokens.
#[async_trait]
pub trait PeerValidator: Send + Sync + 'static {
    async fn validate(&self, token: &str) -> Result<(), Error>;
}

/// Shared-secret token validation.
///
/// Peer tokens are the secret itself; subject tokens are
/// `<secret>:<email>`.
pub struct StaticTokenValidator {
    secret: String,
}

impl StaticTokenValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Build a subject token this validator accepts.
    pub fn subject_token(secret: &str, email: &str) -> String {
        format!("{}:{}", secret, email)
    }
}

#[async_trait]
impl SubjectValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<Subject, Error> {
        let email = token
            .strip_prefix(&self.secret)
            .and_then(|rest| rest.strip_prefix(':'))
            .filter(|email| !email.is_empty())
            .ok_or(Error::Unauthenticated)?;

        Ok(Subject {
            email: email.to_string(),
        })
    }
}

#[async_trait]
impl PeerValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<(), Error> {
        if token == self.secret {
            Ok(())
        } else {
            Err(Error::Unauthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subject_token() {
        let validator = StaticTokenValidator::new("hunter2");

        let token = StaticTokenValidator::subject_token("hunter2", "alice@example.com");
        let subject = SubjectValidator::validate(&validator, &token).await.unwrap();
        assert_eq!(subject.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_subject_token_rejected() {
        let validator = StaticTokenValidator::new("hunter2");

        for bad in ["", "hunter2", "hunter2:", "wrong:alice@example.com"] {
            let err = SubjectValidator::validate(&validator, bad).await.unwrap_err();
            assert!(matches!(err, Error::Unauthenticated));
        }
    }

    #[tokio::test]
    async fn test_peer_token() {
        let validator = StaticTokenValidator::new("hunter2");

        PeerValidator::validate(&validator, "hunter2").await.unwrap();
        assert!(PeerValidator::validate(&validator, "nope").await.is_err());
    }
}
