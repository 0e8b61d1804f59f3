//! Evaluation bridge between the GA scheduler and the simulation drive loop.
//!
//! The scheduler submits a batch of walker/vehicle pairs and blocks until
//! every pair has a fitness vector. A drive loop claims pairs one at a time,
//! runs them in the world and reports fitness back. Only the scheduler
//! removes requests; consumers only mark them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::compute::evolution::Population;
use crate::schema::{BridgeConfig, FitnessVector};

/// Identity of one evaluation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    /// Bridge-wide submission counter.
    pub sequence: u64,
    /// Generation the pair was produced in.
    pub generation: usize,
    /// Position of the pair within its batch.
    pub index: usize,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} (g{} i{})", self.sequence, self.generation, self.index)
    }
}

/// One walker population and one vehicle population run together.
#[derive(Debug, Clone)]
pub struct ScenarioPair {
    pub id: RequestId,
    pub walkers: Population,
    pub vehicles: Population,
}

impl ScenarioPair {
    /// Total NPC count of the scenario.
    pub fn npc_count(&self) -> usize {
        self.walkers.len() + self.vehicles.len()
    }
}

/// A request handed to a consumer by [`EvaluationBridge::take_next_unevaluated`].
#[derive(Debug, Clone)]
pub struct ClaimedRequest {
    pub id: RequestId,
    pub pair: Arc<ScenarioPair>,
}

/// How a wait on a batch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    /// Every request was evaluated; fitness in the order of the ids.
    Completed(Vec<FitnessVector>),
    /// The cancel flag was raised first.
    Cancelled,
}

/// Bridge errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Unknown evaluation request {0}")]
    UnknownRequest(RequestId),
    #[error("Evaluation request {0} was already evaluated")]
    AlreadyEvaluated(RequestId),
    #[error("No evaluation request was claimed within {waited:?}; is the drive loop running?")]
    ClaimTimeout { waited: Duration },
}

#[derive(Debug)]
struct PendingEntry {
    id: RequestId,
    pair: Arc<ScenarioPair>,
    claimed: bool,
    fitness: Option<FitnessVector>,
}

/// Shared queue of pending evaluation requests.
#[derive(Debug)]
pub struct EvaluationBridge {
    pending: Mutex<Vec<PendingEntry>>,
    completed: Condvar,
    next_sequence: AtomicU64,
    poll_interval: Duration,
    claim_timeout: Duration,
}

impl EvaluationBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            completed: Condvar::new(),
            next_sequence: AtomicU64::new(0),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            claim_timeout: Duration::from_secs(config.claim_timeout_secs),
        }
    }

    /// Longest time a waiter goes without checking its cancel flag.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn claim_timeout(&self) -> Duration {
        self.claim_timeout
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------

    /// Queue a batch of index-paired populations for evaluation.
    pub fn submit(
        &self,
        generation: usize,
        pairs: impl IntoIterator<Item = (Population, Population)>,
    ) -> Vec<RequestId> {
        let mut entries = self.lock();
        let mut ids = Vec::new();

        for (index, (walkers, vehicles)) in pairs.into_iter().enumerate() {
            let id = RequestId {
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                generation,
                index,
            };
            entries.push(PendingEntry {
                id,
                pair: Arc::new(ScenarioPair {
                    id,
                    walkers,
                    vehicles,
                }),
                claimed: false,
                fitness: None,
            });
            ids.push(id);
        }

        log::debug!("Submitted {} evaluation requests for generation {generation}", ids.len());
        ids
    }

    /// Block until every request in `ids` is evaluated or `cancel` is set.
    pub fn await_all(
        &self,
        ids: &[RequestId],
        cancel: &AtomicBool,
    ) -> Result<AwaitOutcome, BridgeError> {
        self.await_all_within(ids, cancel, None)
    }

    /// Like [`await_all`](Self::await_all), but fail with
    /// [`BridgeError::ClaimTimeout`] if no request of the batch has been
    /// claimed by a consumer within `claim_timeout`.
    pub fn await_all_within(
        &self,
        ids: &[RequestId],
        cancel: &AtomicBool,
        claim_timeout: Option<Duration>,
    ) -> Result<AwaitOutcome, BridgeError> {
        let started = Instant::now();
        let mut entries = self.lock();

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(AwaitOutcome::Cancelled);
            }

            let mut results = Vec::with_capacity(ids.len());
            let mut any_claimed = false;
            for id in ids {
                let entry = entries
                    .iter()
                    .find(|e| e.id == *id)
                    .ok_or(BridgeError::UnknownRequest(*id))?;
                any_claimed |= entry.claimed;
                if let Some(fitness) = entry.fitness {
                    results.push(fitness);
                }
            }
            if results.len() == ids.len() {
                return Ok(AwaitOutcome::Completed(results));
            }

            if let Some(limit) = claim_timeout
                && !any_claimed
                && started.elapsed() >= limit
            {
                return Err(BridgeError::ClaimTimeout {
                    waited: started.elapsed(),
                });
            }

            let (guard, _) = self
                .completed
                .wait_timeout(entries, self.poll_interval)
                .unwrap_or_else(PoisonError::into_inner);
            entries = guard;
        }
    }

    /// Remove requests from the pending set.
    pub fn clear(&self, ids: &[RequestId]) {
        self.lock().retain(|e| !ids.contains(&e.id));
    }

    // ------------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------------

    /// Claim the oldest request nobody is working on.
    pub fn take_next_unevaluated(&self) -> Option<ClaimedRequest> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| !e.claimed && e.fitness.is_none())?;
        entry.claimed = true;
        log::debug!("Claimed evaluation request {}", entry.id);
        Some(ClaimedRequest {
            id: entry.id,
            pair: Arc::clone(&entry.pair),
        })
    }

    /// Hand a claimed but unfinished request back to the queue.
    pub fn release(&self, id: RequestId) -> Result<(), BridgeError> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(BridgeError::UnknownRequest(id))?;
        if entry.fitness.is_none() {
            entry.claimed = false;
        }
        Ok(())
    }

    /// Store the fitness of a request and wake waiters.
    ///
    /// A request is evaluated exactly once; a second completion is rejected
    /// and leaves the stored fitness unchanged.
    pub fn complete(&self, id: RequestId, fitness: FitnessVector) -> Result<(), BridgeError> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(BridgeError::UnknownRequest(id))?;
        if entry.fitness.is_some() {
            return Err(BridgeError::AlreadyEvaluated(id));
        }
        entry.claimed = true;
        entry.fitness = Some(fitness);
        drop(entries);

        self.completed.notify_all();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Number of requests not yet cleared.
    pub fn pending_len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_evaluated(&self, id: RequestId) -> Option<bool> {
        self.lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.fitness.is_some())
    }
}

impl Default for EvaluationBridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}
