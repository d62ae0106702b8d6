use bevy::prelude::*;
use std::collections::{HashMap, HashSet};

use crate::targeting::{PredictionToken, TargetSample};
use crate::AbilityHandle;

type Key = (AbilityHandle, PredictionToken);

/// Authority-local store of replicated target samples, keyed by
/// `(ability, prediction token)`.
///
/// Holds the most recent sample per key and at most one parked listener per
/// key. A key fires its listener at most once; later submissions for the
/// same key are accepted (the sample is retained for `consume`) but never
/// re-trigger a consumer that already ran.
#[derive(Resource, Debug, Default)]
pub struct TargetDataStore {
    samples: HashMap<Key, TargetSample>,
    listeners: HashMap<Key, Entity>,
    fired: HashSet<Key>,
}

impl TargetDataStore {
    /// Commit a sample for this key, replacing any earlier one.
    pub fn submit(&mut self, ability: AbilityHandle, token: PredictionToken, sample: TargetSample) {
        self.samples.insert((ability, token), sample);
    }

    /// Mark the sample for this key retrieved and hand it out. Idempotent:
    /// absent or already-consumed keys yield `None`, never a stale sample.
    pub fn consume(&mut self, ability: AbilityHandle, token: PredictionToken) -> Option<TargetSample> {
        self.samples.remove(&(ability, token))
    }

    pub fn has_sample(&self, ability: AbilityHandle, token: PredictionToken) -> bool {
        self.samples.contains_key(&(ability, token))
    }

    /// Park a listener for this key. Replaces any previous listener.
    pub fn register_listener(
        &mut self,
        ability: AbilityHandle,
        token: PredictionToken,
        listener: Entity,
    ) {
        self.listeners.insert((ability, token), listener);
    }

    /// Take the listener to fire for this key, at most once per key.
    /// Returns `None` when no listener is parked or the key already fired.
    pub fn take_listener(&mut self, ability: AbilityHandle, token: PredictionToken) -> Option<Entity> {
        let key = (ability, token);
        if self.fired.contains(&key) {
            return None;
        }
        let listener = self.listeners.remove(&key)?;
        self.fired.insert(key);
        Some(listener)
    }

    pub fn has_listener(&self, ability: AbilityHandle, token: PredictionToken) -> bool {
        self.listeners.contains_key(&(ability, token))
    }

    /// Forget every trace of a key: sample, parked listener, fired mark.
    /// Called when the activation owning the key completes or cancels, so
    /// the store stays bounded by in-flight activations rather than every
    /// activation ever made.
    pub fn release(&mut self, ability: AbilityHandle, token: PredictionToken) {
        let key = (ability, token);
        self.samples.remove(&key);
        self.listeners.remove(&key);
        self.fired.remove(&key);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.listeners.is_empty() && self.fired.is_empty()
    }
}
