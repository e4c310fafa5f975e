//! Fixed-timestep simulation loop
//!
//! Each tick: snapshot -> intents -> apply -> end check. Once an end
//! condition holds, the loop moves through resolution, computes the result
//! and completes. Wall-clock time and the speed multiplier only decide how
//! many ticks run; they never touch the math inside one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::battle::ai::{AiController, IntentSource};
use crate::battle::events::BattleEvent;
use crate::battle::result::{finalize_battle, BattleResult, EndCondition};
use crate::battle::state::{BattlePhase, BattleSnapshot, BattleStore};
use crate::core::config::{MAX_SPEED, MIN_SPEED};
use crate::core::error::{BattleError, Result};

/// Upper bound on ticks caught up in a single `advance` call
const MAX_CATCH_UP_TICKS: u64 = 1_000;

/// Shared switches for a running loop
///
/// Clones share state, so a UI or signal task can pause, re-speed or cancel
/// a loop that is busy inside `run_realtime`. Changes take effect between
/// ticks.
#[derive(Debug, Clone, Default)]
pub struct LoopControls {
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    requested_speed: Arc<Mutex<Option<f64>>>,
}

impl LoopControls {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Ask for a new speed; the loop picks it up before its next tick
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(BattleError::InvalidSpeed(speed));
        }
        *self.speed_slot() = Some(speed);
        Ok(())
    }

    fn take_speed(&self) -> Option<f64> {
        self.speed_slot().take()
    }

    fn speed_slot(&self) -> std::sync::MutexGuard<'_, Option<f64>> {
        self.requested_speed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct SimulationLoop {
    store: BattleStore,
    source: Box<dyn IntentSource + Send>,
    controls: LoopControls,
    /// Fractional ticks carried between `advance` calls
    accumulator: f64,
}

impl SimulationLoop {
    /// Drive an initialized store with any intent source
    pub fn new(store: BattleStore, source: Box<dyn IntentSource + Send>) -> Result<Self> {
        if !store.is_initialized() {
            return Err(BattleError::NotInitialized);
        }
        Ok(Self {
            store,
            source,
            controls: LoopControls::default(),
            accumulator: 0.0,
        })
    }

    /// Drive a store with the default AI
    pub fn live(store: BattleStore) -> Result<Self> {
        Self::new(store, Box::new(AiController::default()))
    }

    pub fn store(&self) -> &BattleStore {
        &self.store
    }

    pub fn into_store(self) -> BattleStore {
        self.store
    }

    pub fn snapshot(&self) -> Result<BattleSnapshot> {
        self.store.snapshot()
    }

    pub fn phase(&self) -> Result<BattlePhase> {
        Ok(self.store.state()?.phase)
    }

    pub fn is_completed(&self) -> bool {
        self.store.state().map(|s| s.is_completed()).unwrap_or(false)
    }

    pub fn result(&self) -> Option<BattleResult> {
        self.store.state().ok().and_then(|s| s.result.clone())
    }

    // === Controls ===

    /// Handle for steering this loop from another task
    pub fn controls(&self) -> LoopControls {
        self.controls.clone()
    }

    pub fn pause(&self) {
        self.controls.pause();
    }

    pub fn resume(&self) {
        self.controls.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.controls.is_paused()
    }

    pub fn speed(&self) -> f64 {
        self.store.state().map(|s| s.speed).unwrap_or(1.0)
    }

    /// Change playback speed; only allowed within 0.5..=4.0
    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        self.store.set_speed(speed)?;
        // A direct change overrides any queued request
        self.controls.take_speed();
        debug!(speed, "Simulation speed changed");
        Ok(())
    }

    /// Flag another task can set to stop the loop between ticks
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.controls.cancelled)
    }

    pub fn cancel(&self) {
        self.controls.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.controls.is_cancelled()
    }

    fn apply_requested_speed(&mut self) -> Result<()> {
        if let Some(speed) = self.controls.take_speed() {
            self.store.set_speed(speed)?;
            debug!(speed, "Simulation speed changed");
        }
        Ok(())
    }

    // === Ticking ===

    /// Move from preparation into combat. No-op once combat has started.
    pub fn start(&mut self) -> Result<()> {
        if self.phase()? == BattlePhase::Preparation {
            self.store.advance_phase()?;
            info!(source = self.source.name(), "Combat started");
        }
        Ok(())
    }

    /// Run exactly one tick and return every event it produced
    ///
    /// A paused loop does nothing and returns no events.
    pub fn step(&mut self) -> Result<Vec<BattleEvent>> {
        if self.is_cancelled() {
            return Err(BattleError::Cancelled);
        }
        if self.is_paused() {
            return Ok(Vec::new());
        }
        self.apply_requested_speed()?;
        self.start()?;
        if self.phase()? != BattlePhase::Combat {
            return Ok(Vec::new());
        }

        let snapshot = self.store.snapshot()?;
        let intents = self.source.intents_for_tick(&snapshot);
        drop(snapshot);

        let mut events = self.store.apply_intents(&intents)?;

        if let Some(condition) = self.store.state()?.evaluate_end_condition() {
            events.extend(self.conclude(condition)?);
        }
        Ok(events)
    }

    /// Catch up on `real_elapsed` wall-clock time at the current speed
    pub fn advance(&mut self, real_elapsed: Duration) -> Result<Vec<BattleEvent>> {
        if self.is_paused() || self.is_completed() {
            return Ok(Vec::new());
        }
        self.apply_requested_speed()?;

        let (tick_rate, speed) = {
            let state = self.store.state()?;
            (state.rules.tick_rate_hz as f64, state.speed)
        };
        self.accumulator += real_elapsed.as_secs_f64() * tick_rate * speed;
        let whole = self.accumulator.floor();
        self.accumulator -= whole;

        let due = (whole as u64).min(MAX_CATCH_UP_TICKS);
        let mut events = Vec::new();
        for _ in 0..due {
            events.extend(self.step()?);
            if self.is_completed() {
                self.accumulator = 0.0;
                break;
            }
        }
        Ok(events)
    }

    /// Tick as fast as possible until the battle completes
    ///
    /// Refused with `Paused` while the loop is paused, rather than spinning.
    pub fn run_to_completion(&mut self) -> Result<BattleResult> {
        loop {
            if let Some(result) = self.completed_result()? {
                return Ok(result);
            }
            if self.is_cancelled() {
                return Err(BattleError::Cancelled);
            }
            if self.is_paused() {
                return Err(BattleError::Paused);
            }
            self.step()?;
        }
    }

    /// Tick against the wall clock until the battle completes
    ///
    /// Pause, resume and speed requests made through [`LoopControls`] are
    /// picked up between ticks. Time spent paused is not caught up
    /// afterwards. Returns `Cancelled` once the cancel flag is set.
    pub async fn run_realtime(&mut self) -> Result<BattleResult> {
        let tick_rate = self.store.state()?.rules.tick_rate_hz.max(1);
        let period = Duration::from_secs_f64(1.0 / tick_rate as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut last = tokio::time::Instant::now();
        loop {
            if let Some(result) = self.completed_result()? {
                return Ok(result);
            }
            if self.is_cancelled() {
                return Err(BattleError::Cancelled);
            }
            interval.tick().await;
            let now = tokio::time::Instant::now();
            if !self.is_paused() {
                self.advance(now - last)?;
            }
            last = now;
        }
    }

    /// End the battle now with `condition` (normally `Aborted`)
    pub fn finalize(&mut self, condition: EndCondition) -> Result<BattleResult> {
        match self.phase()? {
            BattlePhase::Completed => return Err(BattleError::ResultAlreadyFinalized),
            BattlePhase::Preparation => {
                self.store.advance_phase()?;
            }
            BattlePhase::Combat | BattlePhase::Resolution => {}
        }

        warn!(?condition, "Battle finalized early");
        self.conclude(condition)?;
        self.completed_result()?.ok_or(BattleError::NotInitialized)
    }

    fn completed_result(&self) -> Result<Option<BattleResult>> {
        let state = self.store.state()?;
        if state.is_completed() {
            Ok(state.result.clone())
        } else {
            Ok(None)
        }
    }

    /// combat -> resolution -> completed, with the result set in between
    fn conclude(&mut self, condition: EndCondition) -> Result<Vec<BattleEvent>> {
        let before = self.store.state()?.events.len();

        self.store.record_end_condition(condition)?;
        if self.phase()? == BattlePhase::Combat {
            self.store.advance_phase()?;
        }

        let state = self.store.state()?;
        let recorded = state.end_condition.unwrap_or(condition);
        let result = finalize_battle(state, recorded);
        info!(
            winner = ?result.winner,
            end_condition = ?result.end_condition,
            attacker_casualties = result.attacker_casualties,
            defender_casualties = result.defender_casualties,
            ticks = result.duration_ticks,
            "Battle resolved"
        );
        self.store.set_result(result)?;
        self.store.advance_phase()?;

        Ok(self.store.state()?.events[before..].to_vec())
    }
}
