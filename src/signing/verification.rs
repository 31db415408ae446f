use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::SmsChallenge;
use crate::config::SmsSection;
use crate::errors::VerificationError;

/// Transport that delivers a verification code to a phone.
/// Real implementations: `LogSmsSender`, `HttpSmsSender`.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Deliver `code` to `phone_number`, returning the gateway's message reference.
    async fn send(&self, phone_number: &str, code: &str) -> Result<String>;
}

/// Writes codes to the log instead of sending them. Development only.
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, phone_number: &str, code: &str) -> Result<String> {
        let reference = Uuid::new_v4().to_string();
        info!(%phone_number, %code, %reference, "SMS verification code (log gateway)");
        Ok(reference)
    }
}

#[derive(Serialize)]
struct GatewayMessage<'a> {
    to: &'a str,
    body: String,
}

/// Sends codes through an HTTP SMS gateway that accepts `{to, body}` JSON.
pub struct HttpSmsSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSmsSender {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, phone_number: &str, code: &str) -> Result<String> {
        let message = GatewayMessage {
            to: phone_number,
            body: format!("Your signature verification code is {}", code),
        };
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request
            .send()
            .await
            .context("Failed to reach SMS gateway")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("SMS gateway returned {}: {}", status, body);
        }

        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        Ok(body
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_default())
    }
}

/// Tunables for [`VerificationService`].
#[derive(Debug, Clone)]
pub struct VerificationSettings {
    pub code_length: usize,
    pub code_ttl: Duration,
    pub dispatch_timeout: Duration,
    /// 0 disables the limit
    pub max_code_attempts: u32,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self::from(&SmsSection::default())
    }
}

impl From<&SmsSection> for VerificationSettings {
    fn from(section: &SmsSection) -> Self {
        Self {
            code_length: section.code_length.clamp(4, 10),
            code_ttl: section.code_ttl(),
            dispatch_timeout: section.dispatch_timeout(),
            max_code_attempts: section.max_code_attempts,
        }
    }
}

struct ActiveChallenge {
    attempt_key: String,
    code_digest: [u8; 32],
    expires_at: DateTime<Utc>,
    failed_attempts: u32,
}

/// Issued challenges by reference, plus the single active reference per attempt.
#[derive(Default)]
struct ChallengeBook {
    by_reference: HashMap<String, ActiveChallenge>,
    by_attempt: HashMap<String, String>,
}

impl ChallengeBook {
    fn invalidate_attempt(&mut self, attempt_key: &str) -> bool {
        match self.by_attempt.remove(attempt_key) {
            Some(reference) => self.by_reference.remove(&reference).is_some(),
            None => false,
        }
    }

    fn remove_reference(&mut self, reference: &str) {
        if let Some(challenge) = self.by_reference.remove(reference) {
            if self.by_attempt.get(&challenge.attempt_key).map(String::as_str) == Some(reference) {
                self.by_attempt.remove(&challenge.attempt_key);
            }
        }
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .by_reference
            .iter()
            .filter(|(_, c)| c.expires_at <= now)
            .map(|(r, _)| r.clone())
            .collect();
        for reference in expired {
            self.remove_reference(&reference);
        }
    }
}

/// Issues and confirms one-time SMS codes.
///
/// Codes never leave this service in plaintext except towards the
/// [`SmsSender`]; callers only ever hold the opaque reference. Each attempt
/// has at most one live challenge.
pub struct VerificationService {
    sender: Arc<dyn SmsSender>,
    settings: VerificationSettings,
    book: Mutex<ChallengeBook>,
    phone_pattern: Regex,
}

impl VerificationService {
    pub fn new(sender: Arc<dyn SmsSender>, settings: VerificationSettings) -> Result<Self> {
        let phone_pattern =
            Regex::new(r"^\+?[1-9][0-9]{7,14}$").context("Failed to compile phone pattern")?;
        Ok(Self {
            sender,
            settings,
            book: Mutex::new(ChallengeBook::default()),
            phone_pattern,
        })
    }

    /// Strip common separators and check the number looks dialable.
    pub fn normalize_phone(&self, phone_number: &str) -> Result<String, VerificationError> {
        let normalized: String = phone_number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();
        if self.phone_pattern.is_match(&normalized) {
            Ok(normalized)
        } else {
            Err(VerificationError::InvalidPhoneFormat {
                phone_number: phone_number.to_string(),
            })
        }
    }

    /// Send a fresh code to `phone_number` for the attempt identified by
    /// `attempt_key`. Any earlier challenge for the attempt stops being
    /// confirmable before dispatch starts, whether or not dispatch succeeds.
    pub async fn request_challenge(
        &self,
        attempt_key: &str,
        phone_number: &str,
    ) -> Result<SmsChallenge, VerificationError> {
        let phone_number = self.normalize_phone(phone_number)?;
        self.invalidate(attempt_key);

        let code = self.generate_code();
        let timeout_ms = self.settings.dispatch_timeout.as_millis() as u64;
        let delivery = tokio::time::timeout(
            self.settings.dispatch_timeout,
            self.sender.send(&phone_number, &code),
        )
        .await;
        let message_ref = match delivery {
            Ok(Ok(message_ref)) => message_ref,
            Ok(Err(e)) => {
                warn!(%attempt_key, error = %e, "SMS dispatch failed");
                return Err(VerificationError::DispatchFailed(e.to_string()));
            }
            Err(_) => {
                warn!(%attempt_key, timeout_ms, "SMS dispatch timed out");
                return Err(VerificationError::DispatchTimeout { timeout_ms });
            }
        };

        let code_reference = Uuid::new_v4().to_string();
        let ttl = chrono::Duration::from_std(self.settings.code_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let challenge = ActiveChallenge {
            attempt_key: attempt_key.to_string(),
            code_digest: digest_code(&code_reference, &code),
            expires_at,
            failed_attempts: 0,
        };

        let mut book = self.lock_book();
        book.purge_expired(Utc::now());
        // a concurrent request for the same attempt may have issued meanwhile
        book.invalidate_attempt(attempt_key);
        book.by_attempt
            .insert(attempt_key.to_string(), code_reference.clone());
        book.by_reference.insert(code_reference.clone(), challenge);
        drop(book);

        debug!(%attempt_key, %message_ref, "SMS challenge issued");
        Ok(SmsChallenge {
            phone_number,
            code_reference,
            expires_at,
        })
    }

    /// Check `submitted_code` against the challenge behind `code_reference`.
    /// A successful confirmation consumes the challenge.
    pub fn confirm_challenge(
        &self,
        code_reference: &str,
        submitted_code: &str,
    ) -> Result<(), VerificationError> {
        let mut book = self.lock_book();
        let now = Utc::now();
        let max_attempts = self.settings.max_code_attempts;

        let Some(challenge) = book.by_reference.get_mut(code_reference) else {
            return Err(VerificationError::ChallengeExpired);
        };
        if challenge.expires_at <= now {
            book.remove_reference(code_reference);
            return Err(VerificationError::ChallengeExpired);
        }

        let submitted = digest_code(code_reference, submitted_code.trim());
        if bool::from(submitted.ct_eq(&challenge.code_digest)) {
            book.remove_reference(code_reference);
            return Ok(());
        }

        challenge.failed_attempts += 1;
        let attempts = challenge.failed_attempts;
        if max_attempts > 0 && attempts >= max_attempts {
            book.remove_reference(code_reference);
            return Err(VerificationError::AttemptsExhausted { attempts });
        }
        Err(VerificationError::CodeMismatch)
    }

    /// Drop the attempt's live challenge, if any.
    pub fn invalidate(&self, attempt_key: &str) -> bool {
        self.lock_book().invalidate_attempt(attempt_key)
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.settings.code_length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, ChallengeBook> {
        // the book holds no invariants a panicking holder could break halfway
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn digest_code(code_reference: &str, code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(code_reference.as_bytes());
    hasher.update([0u8]);
    hasher.update(code.as_bytes());
    hasher.finalize().into()
}
