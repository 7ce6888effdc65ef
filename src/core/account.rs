use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::core::hash::{anonymous_reporter_id, sha256_hex};

/// Reporter account held by the portal collaborator. The pipeline only
/// consumes the resolved reporter id; credential and delivery mechanics
/// stay outside the triage core.
#[derive(Debug, Clone)]
pub struct Account {
    pub email: String,
    pub credential_hash: String,
    pub verified: bool,
    otp: Option<OtpChallenge>,
}

#[derive(Debug, Clone)]
struct OtpChallenge {
    code_hash: String,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum OtpError {
    #[error("no passcode has been issued")]
    NoChallenge,
    #[error("passcode expired")]
    Expired,
    #[error("passcode already used")]
    Consumed,
    #[error("passcode does not match")]
    Mismatch,
}

impl Account {
    pub fn new_unverified(email: impl Into<String>, credential_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            credential_hash: credential_hash.into(),
            verified: false,
            otp: None,
        }
    }

    /// Issue a one-time passcode; replaces any outstanding challenge.
    pub fn issue_otp(&mut self, code: &str, ttl: Duration, now: DateTime<Utc>) {
        self.otp = Some(OtpChallenge {
            code_hash: sha256_hex(code.as_bytes()),
            expires_at: now + ttl,
            consumed: false,
        });
    }

    /// Verify a passcode: must match, be unexpired, and unused. On success
    /// the challenge is consumed and the account becomes verified.
    pub fn verify_otp(&mut self, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let challenge = self.otp.as_mut().ok_or(OtpError::NoChallenge)?;
        if challenge.consumed {
            return Err(OtpError::Consumed);
        }
        if now > challenge.expires_at {
            return Err(OtpError::Expired);
        }
        if challenge.code_hash != sha256_hex(code.as_bytes()) {
            return Err(OtpError::Mismatch);
        }
        challenge.consumed = true;
        self.verified = true;
        Ok(())
    }
}

/// Reporter identity handed to the pipeline for attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReporter {
    pub id: String,
    pub verified: bool,
}

impl ResolvedReporter {
    pub fn anonymous(seed: &str) -> Self {
        Self {
            id: anonymous_reporter_id(seed),
            verified: false,
        }
    }
}

/// Token directory backed by the account collaborator. Unknown or
/// unverified tokens resolve to an opaque anonymous id instead of failing
/// the submission.
#[derive(Debug, Default)]
pub struct ReporterDirectory {
    tokens: HashMap<String, String>,
}

impl ReporterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token(&mut self, token: impl Into<String>, reporter_id: impl Into<String>) {
        self.tokens.insert(token.into(), reporter_id.into());
    }

    pub fn resolve_reporter(&self, token: Option<&str>) -> ResolvedReporter {
        match token {
            Some(token) => match self.tokens.get(token) {
                Some(id) => ResolvedReporter {
                    id: id.clone(),
                    verified: true,
                },
                None => ResolvedReporter::anonymous(token),
            },
            None => ResolvedReporter::anonymous("anonymous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn otp_verifies_once_then_is_consumed() {
        let mut account = Account::new_unverified("a@example.org", "hash");
        account.issue_otp("123456", Duration::minutes(10), now());
        assert_eq!(account.verify_otp("123456", now()), Ok(()));
        assert!(account.verified);
        assert_eq!(account.verify_otp("123456", now()), Err(OtpError::Consumed));
    }

    #[test]
    fn otp_rejects_expired_and_mismatched_codes() {
        let mut account = Account::new_unverified("a@example.org", "hash");
        account.issue_otp("123456", Duration::minutes(10), now());
        assert_eq!(
            account.verify_otp("654321", now()),
            Err(OtpError::Mismatch)
        );
        let late = now() + Duration::minutes(11);
        assert_eq!(account.verify_otp("123456", late), Err(OtpError::Expired));
        assert!(!account.verified);
    }

    #[test]
    fn unknown_token_resolves_to_anonymous() {
        let mut directory = ReporterDirectory::new();
        directory.register_token("tok-1", "reporter-7");
        let known = directory.resolve_reporter(Some("tok-1"));
        assert!(known.verified);
        assert_eq!(known.id, "reporter-7");

        let unknown = directory.resolve_reporter(Some("tok-2"));
        assert!(!unknown.verified);
        assert!(unknown.id.starts_with("anon_"));

        let missing = directory.resolve_reporter(None);
        assert!(!missing.verified);
        assert!(missing.id.starts_with("anon_"));
    }
}
