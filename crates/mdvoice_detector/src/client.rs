//! Detector Client (component A3): the `detect` stage's network
//! collaborator, against a pluggable trait so the orchestrator can be
//! driven by a fake implementation in tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::schema::CandidateItem;

const MAX_RESPONSE_CHARS: usize = 2000;
const SYSTEM_PROMPT: &str = "You proofread text-to-speech input. Return a strict JSON array of \
    objects with keys \"find\", \"replace\", \"reason\". Do not explain your answer.";

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("detector request timed out after {0:?}")]
    Timeout(Duration),
    #[error("detector response was not valid JSON: {0}")]
    MalformedJson(String),
    #[error("detector response exceeded {MAX_RESPONSE_CHARS} characters")]
    OversizeBody,
    #[error("detector response top-level JSON value was not an array")]
    NotAnArray,
}

impl DetectorError {
    /// The counter name recorded under `detect.rejections.<kind>`.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectorError::Network(_) => "network",
            DetectorError::Timeout(_) => "timeout",
            DetectorError::MalformedJson(_) => "malformed_json",
            DetectorError::OversizeBody => "oversize_body",
            DetectorError::NotAnArray => "not_an_array",
        }
    }
}

/// Parameters describing how to reach and prompt the external detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// The `detect` stage's network contract: given the raw text of one
/// chunk, returns whatever candidate items the external model proposed.
/// Implementations never panic; every failure mode becomes a typed
/// [`DetectorError`] that the orchestrator downgrades to an empty plan.
#[async_trait]
pub trait DetectorClient: Send + Sync {
    async fn detect(&self, chunk_text: &str) -> Result<Vec<CandidateItem>, DetectorError>;
}

pub struct ReqwestDetectorClient {
    http: reqwest::Client,
    config: DetectorConfig,
}

impl ReqwestDetectorClient {
    pub fn new(config: DetectorConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build detector HTTP client");
        Self { http, config }
    }
}

#[async_trait]
impl DetectorClient for ReqwestDetectorClient {
    async fn detect(&self, chunk_text: &str) -> Result<Vec<CandidateItem>, DetectorError> {
        let user_payload = format!("<TEXT_TO_CORRECT>{chunk_text}</TEXT_TO_CORRECT>");

        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": 0.2,
            "top_p": 0.9,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_payload},
            ],
        });

        let mut attempt = 0;
        loop {
            let result = self.send_once(&body).await;
            match result {
                Ok(text) => {
                    return parse_candidate_array(&text).map_err(|err| {
                        warn!(kind = err.kind(), "detector request failed");
                        err
                    });
                }
                Err(DetectorError::Network(e)) if attempt < self.config.max_retries => {
                    warn!(attempt, error = %e, "retrying detector request after network error");
                    attempt += 1;
                    continue;
                }
                Err(err) => {
                    warn!(kind = err.kind(), "detector request failed");
                    return Err(err);
                }
            }
        }
    }
}

impl ReqwestDetectorClient {
    async fn send_once(&self, body: &serde_json::Value) -> Result<String, DetectorError> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectorError::Timeout(self.config.timeout)
                } else {
                    DetectorError::Network(e)
                }
            })?;

        response.text().await.map_err(DetectorError::Network)
    }
}

/// Parses the detector's raw response text, tolerating any leading or
/// trailing prose around the first top-level JSON array.
fn parse_candidate_array(raw: &str) -> Result<Vec<CandidateItem>, DetectorError> {
    if raw.len() > MAX_RESPONSE_CHARS {
        return Err(DetectorError::OversizeBody);
    }

    let start = raw.find('[').ok_or_else(|| DetectorError::MalformedJson("no '[' found".to_string()))?;
    let end = raw.rfind(']').ok_or_else(|| DetectorError::MalformedJson("no ']' found".to_string()))?;
    if end < start {
        return Err(DetectorError::MalformedJson("unbalanced brackets".to_string()));
    }
    let slice = &raw[start..=end];

    let value: serde_json::Value = serde_json::from_str(slice).map_err(|e| DetectorError::MalformedJson(e.to_string()))?;
    match value {
        serde_json::Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| DetectorError::MalformedJson(e.to_string()))
        }
        _ => Err(DetectorError::NotAnArray),
    }
}

/// A scripted, network-free implementation for orchestrator tests: each
/// call returns the next canned response in sequence, or an empty plan
/// once exhausted.
pub struct FakeDetectorClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<Vec<CandidateItem>, DetectorError>>>,
}

impl FakeDetectorClient {
    pub fn new(responses: Vec<Result<Vec<CandidateItem>, DetectorError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl DetectorClient for FakeDetectorClient {
    async fn detect(&self, _chunk_text: &str) -> Result<Vec<CandidateItem>, DetectorError> {
        let mut responses = self.responses.lock().expect("fake detector mutex poisoned");
        responses.pop_front().unwrap_or(Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_array() {
        let raw = r#"[{"find":"a","replace":"b","reason":"SIMPLE_PUNCT"}]"#;
        let items = parse_candidate_array(raw).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].find, "a");
    }

    #[test]
    fn tolerates_leading_and_trailing_prose() {
        let raw = "Sure, here is the JSON:\n[{\"find\":\"a\",\"replace\":\"b\",\"reason\":\"SIMPLE_PUNCT\"}]\nHope that helps!";
        let items = parse_candidate_array(raw).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn rejects_non_array_top_level() {
        let raw = r#"{"find":"a"}"#;
        let err = parse_candidate_array(raw).unwrap_err();
        assert!(matches!(err, DetectorError::MalformedJson(_)) || matches!(err, DetectorError::NotAnArray));
    }

    #[test]
    fn rejects_oversize_body() {
        let raw = "[".to_string() + &"a".repeat(MAX_RESPONSE_CHARS + 10);
        let err = parse_candidate_array(&raw).unwrap_err();
        assert!(matches!(err, DetectorError::OversizeBody));
    }

    #[test]
    fn rejects_malformed_json() {
        let raw = "[{not json}]";
        let err = parse_candidate_array(raw).unwrap_err();
        assert!(matches!(err, DetectorError::MalformedJson(_)));
    }

    #[tokio::test]
    async fn fake_client_returns_scripted_responses_in_order() {
        let fake = FakeDetectorClient::new(vec![Ok(vec![]), Ok(vec![])]);
        let first = fake.detect("chunk").await.unwrap();
        assert!(first.is_empty());
    }
}
