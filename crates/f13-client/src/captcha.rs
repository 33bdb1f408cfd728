//! CAPTCHA challenge/response flow.
//!
//! Sensitive actions (posting, commenting, voting, registering, logging in)
//! carry a solved challenge. A solved challenge is represented by
//! [`CaptchaSolution`] and travels inside the action's own payload as the
//! `captcha_token` / `captcha_question_id` pair, where the server verifies it
//! once more and consumes it.
//!
//! [`CaptchaFlow`] drives one form's challenge: fetch, verify, and on a
//! wrong answer discard the challenge and fetch a fresh one. A challenge id
//! is never submitted twice.

use std::collections::HashSet;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::error::{ClientError, Result};
use crate::request::ApiRequest;

pub const QUESTION_PATH: &str = "/captcha/question";
pub const VERIFY_PATH: &str = "/captcha/verify";
pub const CONFIG_PATH: &str = "/captcha/config";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Math,
    Logic,
    #[default]
    Text,
    #[serde(other)]
    Other,
}

/// A server-issued question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaChallenge {
    pub id: String,
    pub question: String,
    #[serde(rename = "type", default)]
    pub kind: ChallengeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaptchaConfig {
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Server verdict on an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Accepted,
    Rejected { message: String },
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// A verified (answer, challenge id) pair, ready to ride along with an
/// action payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaSolution {
    pub captcha_token: String,
    pub captcha_question_id: String,
}

impl CaptchaSolution {
    pub fn new(answer: &str, question_id: impl Into<String>) -> Self {
        Self {
            captcha_token: normalize_answer(answer),
            captcha_question_id: question_id.into(),
        }
    }

    /// Serialize `payload` with the captcha fields alongside its own.
    ///
    /// `payload` must serialize to a JSON object.
    pub fn attach<T: Serialize + ?Sized>(&self, payload: &T) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct WithCaptcha<'a, T: ?Sized> {
            #[serde(flatten)]
            payload: &'a T,
            #[serde(flatten)]
            captcha: &'a CaptchaSolution,
        }

        Ok(serde_json::to_value(WithCaptcha {
            payload,
            captcha: self,
        })?)
    }
}

/// Answers are compared trimmed and case-insensitively.
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

impl ApiClient {
    pub async fn fetch_challenge(&self) -> Result<CaptchaChallenge> {
        self.get_json(QUESTION_PATH).await
    }

    pub async fn captcha_config(&self) -> Result<CaptchaConfig> {
        self.get_json(CONFIG_PATH).await
    }

    /// Ask the server whether `answer` solves challenge `question_id`.
    ///
    /// A 400 from the verify endpoint is a rejection, not an error.
    pub async fn verify_challenge(&self, question_id: &str, answer: &str) -> Result<Verification> {
        let request = ApiRequest::post(VERIFY_PATH).json(&serde_json::json!({
            "question_id": question_id,
            "answer": answer.trim(),
        }))?;

        match self.execute_json::<VerifyResponse>(request).await {
            Ok(VerifyResponse { success: true, .. }) => Ok(Verification::Accepted),
            Ok(VerifyResponse { error, .. }) => Ok(Verification::Rejected {
                message: error.unwrap_or_else(|| "Incorrect answer".to_string()),
            }),
            Err(ClientError::Status {
                status: StatusCode::BAD_REQUEST,
                message,
            }) => Ok(Verification::Rejected { message }),
            Err(e) => Err(e),
        }
    }
}

/// Result of submitting an answer through [`CaptchaFlow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// The answer was accepted; attach the solution to the action.
    Solved(CaptchaSolution),
    /// The answer was rejected; `next` is the fresh challenge to show.
    Retry {
        message: String,
        next: CaptchaChallenge,
    },
}

/// One form's challenge lifecycle.
pub struct CaptchaFlow<'a> {
    client: &'a ApiClient,
    current: Option<CaptchaChallenge>,
    spent: HashSet<String>,
}

impl<'a> CaptchaFlow<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            current: None,
            spent: HashSet::new(),
        }
    }

    /// The challenge currently shown, if any.
    pub fn challenge(&self) -> Option<&CaptchaChallenge> {
        self.current.as_ref()
    }

    /// Whether `question_id` has already been submitted.
    pub fn is_spent(&self, question_id: &str) -> bool {
        self.spent.contains(question_id)
    }

    /// Fetch a fresh challenge, discarding the current one.
    pub async fn start(&mut self) -> Result<&CaptchaChallenge> {
        if let Some(stale) = self.current.take() {
            debug!(question_id = %stale.id, "Discarding current challenge");
            self.spent.insert(stale.id);
        }
        let challenge = self.client.fetch_challenge().await?;
        Ok(self.current.insert(challenge))
    }

    /// Verify `answer` against the current challenge.
    ///
    /// An empty answer is refused locally. A network failure leaves the
    /// current challenge in place so the same answer can be resent.
    pub async fn submit(&mut self, answer: &str) -> Result<CaptchaOutcome> {
        if answer.trim().is_empty() {
            return Err(ClientError::Captcha("answer is empty".to_string()));
        }

        let challenge = self
            .current
            .take()
            .ok_or_else(|| ClientError::Captcha("no active challenge".to_string()))?;

        if self.spent.contains(&challenge.id) {
            return Err(ClientError::Captcha(format!(
                "challenge {} was already submitted",
                challenge.id
            )));
        }

        let verdict = match self.client.verify_challenge(&challenge.id, answer).await {
            Ok(verdict) => verdict,
            Err(e) => {
                self.current = Some(challenge);
                return Err(e);
            }
        };
        self.spent.insert(challenge.id.clone());

        match verdict {
            Verification::Accepted => {
                info!(question_id = %challenge.id, "Captcha solved");
                Ok(CaptchaOutcome::Solved(CaptchaSolution::new(
                    answer,
                    challenge.id,
                )))
            }
            Verification::Rejected { message } => {
                debug!(question_id = %challenge.id, %message, "Captcha rejected; fetching a new one");
                let next = self.client.fetch_challenge().await?;
                self.current = Some(next.clone());
                Ok(CaptchaOutcome::Retry { message, next })
            }
        }
    }
}
