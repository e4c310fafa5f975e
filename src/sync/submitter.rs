//! Result submission to the authoritative backend
//!
//! Transport failures and rejections are retried with exponential backoff.
//! Once the retry budget is spent the bundle is kept in a pending queue and
//! `SubmissionFailed` is returned; a finished battle is never dropped.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::battle::events::BattleEvent;
use crate::battle::result::BattleResult;
use crate::battle::state::{BattlePhase, BattleState};
use crate::core::config::SubmissionConfig;
use crate::core::error::{BattleError, Result};
use crate::core::types::BattleId;

/// Relative tolerance for float fields when comparing results
const DIVERGENCE_TOLERANCE: f64 = 1e-6;

/// Everything the backend needs to check a battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionBundle {
    pub battle_id: BattleId,
    pub seed: u64,
    pub final_state: BattleState,
    pub event_log: Vec<BattleEvent>,
    pub result: BattleResult,
}

impl SubmissionBundle {
    /// Package a completed battle
    pub fn from_state(state: &BattleState) -> Result<Self> {
        let result = match (&state.result, state.phase) {
            (Some(result), BattlePhase::Completed) => result.clone(),
            _ => {
                return Err(BattleError::WrongPhase {
                    expected: BattlePhase::Completed,
                    actual: state.phase,
                })
            }
        };
        Ok(Self {
            battle_id: state.battle_id,
            seed: state.seed,
            final_state: state.clone(),
            event_log: state.events.clone(),
            result,
        })
    }
}

/// Backend reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authoritative_result: Option<BattleResult>,
}

/// Fields where the backend disagrees with the local result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub battle_id: BattleId,
    pub fields: Vec<String>,
}

impl Divergence {
    pub fn to_error(&self) -> BattleError {
        BattleError::DivergenceDetected(format!(
            "battle {} differs in {}",
            self.battle_id,
            self.fields.join(", ")
        ))
    }
}

/// What a successful submission produced
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub attempts: u32,
    pub authoritative_result: Option<BattleResult>,
    pub divergence: Option<Divergence>,
}

fn close(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= DIVERGENCE_TOLERANCE * scale
}

/// Compare the local result with the backend's. Never modifies either.
pub fn detect_divergence(
    battle_id: BattleId,
    local: &BattleResult,
    authoritative: &BattleResult,
) -> Option<Divergence> {
    let mut fields = Vec::new();

    if local.winner != authoritative.winner {
        fields.push("winner".to_string());
    }
    if local.end_condition != authoritative.end_condition {
        fields.push("end_condition".to_string());
    }
    if local.attacker_casualties != authoritative.attacker_casualties {
        fields.push("attacker_casualties".to_string());
    }
    if local.defender_casualties != authoritative.defender_casualties {
        fields.push("defender_casualties".to_string());
    }
    if local.duration_ticks != authoritative.duration_ticks {
        fields.push("duration_ticks".to_string());
    }
    match (&local.mvp, &authoritative.mvp) {
        (None, None) => {}
        (Some(a), Some(b))
            if a.squad == b.squad
                && close(a.damage_dealt, b.damage_dealt)
                && close(a.damage_taken, b.damage_taken) => {}
        _ => fields.push("mvp".to_string()),
    }
    if local.rewards != authoritative.rewards {
        fields.push("rewards".to_string());
    }

    if fields.is_empty() {
        return None;
    }

    let divergence = Divergence { battle_id, fields };
    warn!(
        battle = %battle_id,
        fields = ?divergence.fields,
        "Authoritative result diverges from local result"
    );
    Some(divergence)
}

/// Delivers a bundle to the backend
pub trait ResultTransport: Send + Sync {
    fn submit(
        &self,
        bundle: &SubmissionBundle,
    ) -> impl Future<Output = Result<SubmissionResponse>> + Send;
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &SubmissionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BattleError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl ResultTransport for HttpTransport {
    async fn submit(&self, bundle: &SubmissionBundle) -> Result<SubmissionResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(bundle)
            .send()
            .await
            .map_err(|e| BattleError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BattleError::Transport(format!(
                "backend returned {}: {}",
                status, error_text
            )));
        }

        response
            .json::<SubmissionResponse>()
            .await
            .map_err(|e| BattleError::Transport(e.to_string()))
    }
}

/// Doubling delay with a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempts: u32,
    initial_ms: u64,
}

impl Backoff {
    pub fn new(initial_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            delay_ms: initial_ms,
            max_delay_ms,
            attempts: 0,
            initial_ms,
        }
    }

    pub fn reset(&mut self) {
        self.delay_ms = self.initial_ms;
        self.attempts = 0;
    }

    pub fn advance(&mut self) {
        self.attempts += 1;
        self.delay_ms = self.delay_ms.saturating_mul(2).min(self.max_delay_ms);
    }
}

/// Submits bundles with retries and keeps what could not be delivered
pub struct ResultSubmitter<T: ResultTransport> {
    transport: T,
    config: SubmissionConfig,
    pending: Mutex<Vec<SubmissionBundle>>,
}

impl<T: ResultTransport + 'static> ResultSubmitter<T> {
    pub fn new(transport: T, config: SubmissionConfig) -> Self {
        Self {
            transport,
            config,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn pending_queue(&self) -> MutexGuard<'_, Vec<SubmissionBundle>> {
        // A panic elsewhere must not lose queued battles
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bundles waiting for manual resubmission
    pub fn pending_bundles(&self) -> Vec<SubmissionBundle> {
        self.pending_queue().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_queue().len()
    }

    /// Submit one bundle, retrying until accepted or out of attempts
    pub async fn submit(&self, bundle: &SubmissionBundle) -> Result<SubmissionOutcome> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = Backoff::new(self.config.initial_backoff_ms, self.config.max_backoff_ms);

        loop {
            let attempt = backoff.attempts + 1;
            let reason = match self.transport.submit(bundle).await {
                Ok(response) if response.accepted => {
                    let divergence = response
                        .authoritative_result
                        .as_ref()
                        .and_then(|auth| detect_divergence(bundle.battle_id, &bundle.result, auth));
                    info!(battle = %bundle.battle_id, attempt, "Battle result accepted");
                    return Ok(SubmissionOutcome {
                        attempts: attempt,
                        authoritative_result: response.authoritative_result,
                        divergence,
                    });
                }
                Ok(_) => "rejected by backend".to_string(),
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                error!(
                    battle = %bundle.battle_id,
                    attempts = attempt,
                    reason = %reason,
                    "Submission failed; keeping bundle for resubmission"
                );
                self.pending_queue().push(bundle.clone());
                return Err(BattleError::SubmissionFailed {
                    attempts: attempt,
                    reason,
                });
            }

            warn!(
                battle = %bundle.battle_id,
                attempt,
                delay_ms = backoff.delay_ms,
                reason = %reason,
                "Submission attempt failed; retrying"
            );
            tokio::time::sleep(Duration::from_millis(backoff.delay_ms)).await;
            backoff.advance();
        }
    }

    /// Retry everything in the pending queue. Failures go back in the queue.
    pub async fn resubmit_pending(&self) -> Vec<Result<SubmissionOutcome>> {
        let queued: Vec<SubmissionBundle> = std::mem::take(&mut *self.pending_queue());
        let mut outcomes = Vec::with_capacity(queued.len());
        for bundle in &queued {
            outcomes.push(self.submit(bundle).await);
        }
        outcomes
    }

    /// Submit in the background; failures and divergences go to `errors`
    pub fn spawn_submit(
        self: &Arc<Self>,
        bundle: SubmissionBundle,
        errors: mpsc::Sender<BattleError>,
    ) -> JoinHandle<Option<SubmissionOutcome>> {
        let submitter = Arc::clone(self);
        tokio::spawn(async move {
            match submitter.submit(&bundle).await {
                Ok(outcome) => {
                    if let Some(divergence) = &outcome.divergence {
                        if errors.send(divergence.to_error()).await.is_err() {
                            warn!("Error channel closed; divergence only logged");
                        }
                    }
                    Some(outcome)
                }
                Err(e) => {
                    if let Err(send_error) = errors.send(e).await {
                        error!(error = %send_error.0, "Error channel closed; failure only logged");
                    }
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::result::{EndCondition, MvpRecord, RewardPayload, Winner};
    use crate::core::types::{Side, SquadId};

    fn result() -> BattleResult {
        BattleResult {
            winner: Winner::Attacker,
            end_condition: EndCondition::ForceEliminated {
                side: Side::Defender,
            },
            attacker_casualties: 120,
            defender_casualties: 400,
            surviving_attackers: 380,
            surviving_defenders: 0,
            duration_ticks: 87,
            mvp: Some(MvpRecord {
                squad: SquadId(1),
                side: Side::Attacker,
                damage_dealt: 40_000.0,
                damage_taken: 12_000.0,
            }),
            rewards: RewardPayload::default(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(250, 1000);
        backoff.advance();
        assert_eq!(backoff.delay_ms, 500);
        backoff.advance();
        assert_eq!(backoff.delay_ms, 1000);
        backoff.advance();
        assert_eq!(backoff.delay_ms, 1000);
        assert_eq!(backoff.attempts, 3);
        backoff.reset();
        assert_eq!(backoff.delay_ms, 250);
    }

    #[test]
    fn test_identical_results_do_not_diverge() {
        assert_eq!(detect_divergence(BattleId::new(), &result(), &result()), None);
    }

    #[test]
    fn test_tiny_float_noise_tolerated() {
        let mut other = result();
        if let Some(mvp) = other.mvp.as_mut() {
            mvp.damage_dealt += 1e-9;
        }
        assert_eq!(detect_divergence(BattleId::new(), &result(), &other), None);
    }

    #[test]
    fn test_divergent_fields_listed() {
        let mut other = result();
        other.winner = Winner::Draw;
        other.defender_casualties = 399;
        let divergence = detect_divergence(BattleId::new(), &result(), &other).unwrap();
        assert_eq!(divergence.fields, vec!["winner", "defender_casualties"]);
        assert!(matches!(
            divergence.to_error(),
            BattleError::DivergenceDetected(_)
        ));
    }

    #[test]
    fn test_response_shape() {
        let json = r#"{"accepted": true}"#;
        let response: SubmissionResponse = serde_json::from_str(json).unwrap();
        assert!(response.accepted);
        assert!(response.authoritative_result.is_none());
    }
}
