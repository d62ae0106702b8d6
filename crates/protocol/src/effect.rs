use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// String-based effect template identifier, matching the authored RON key.
/// Serializes as the bare string so authored maps key on `"burning"`, not
/// on the wrapper type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectTemplateId(pub String);

impl EffectTemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// How long an applied instance of a template lives on its receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationPolicy {
    /// Applied and finished in the same call; nothing persists.
    Instant,
    /// Persists for `duration_secs`, then expires on its own.
    Duration,
    /// Persists until explicitly removed.
    Infinite,
}

/// Authored definition of a reusable status effect. Immutable after load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectDef {
    pub duration_policy: DurationPolicy,
    pub magnitude: f32,
    #[serde(default)]
    pub duration_secs: Option<f32>,
}

/// Resource holding loaded effect definitions, keyed by [`EffectTemplateId`].
#[derive(Resource, Clone, Debug, Default)]
pub struct EffectDefs {
    pub effects: HashMap<EffectTemplateId, EffectDef>,
}

impl EffectDefs {
    pub fn get(&self, id: &EffectTemplateId) -> Option<&EffectDef> {
        self.effects.get(id)
    }

    pub fn insert(&mut self, id: EffectTemplateId, def: EffectDef) {
        self.effects.insert(id, def);
    }

    /// Parse a RON map of template definitions, e.g.
    /// `{ "burning": (duration_policy: Instant, magnitude: 10.0) }`.
    pub fn from_ron(source: &str) -> Result<Self, ron::error::SpannedError> {
        let effects: HashMap<EffectTemplateId, EffectDef> = ron::from_str(source)?;
        Ok(Self { effects })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EffectError {
    #[error("target has no effect receiver")]
    InvalidReceiver,
    #[error("effect template {0:?} is not registered")]
    InvalidTemplate(EffectTemplateId),
    #[error("failed to construct outgoing spec for {0:?}")]
    SpecConstructionFailed(EffectTemplateId),
}

/// Token returned when an effect instance is applied. Allocated from
/// [`EffectHandles`], unique per application, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveEffectHandle(pub u64);

/// Endpoint-local allocator for [`ActiveEffectHandle`]s.
#[derive(Resource, Clone, Debug, Default)]
pub struct EffectHandles {
    next: u64,
}

impl EffectHandles {
    pub fn alloc(&mut self) -> ActiveEffectHandle {
        let handle = ActiveEffectHandle(self.next);
        self.next += 1;
        handle
    }
}

/// Attribution for an effect application: which entity caused it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectContext {
    pub source: Entity,
}

/// A template instantiated at a caster level, ready to apply.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectSpec {
    pub template: EffectTemplateId,
    pub duration_policy: DurationPolicy,
    pub magnitude: f32,
    pub duration_secs: Option<f32>,
    pub context: EffectContext,
}

/// Capability component for entities that can receive status effects.
///
/// Instant applications are counted and forgotten; duration/infinite
/// applications are held keyed by handle until removed or expired.
#[derive(Component, Debug, Default)]
pub struct EffectReceiver {
    active: HashMap<ActiveEffectHandle, EffectSpec>,
    instant_applied: u64,
}

impl EffectReceiver {
    pub fn make_effect_context(&self, source: Entity) -> EffectContext {
        EffectContext { source }
    }

    /// Derive an outgoing spec from a template at the given caster level.
    pub fn make_outgoing_spec(
        &self,
        defs: &EffectDefs,
        template: &EffectTemplateId,
        level: f32,
        context: EffectContext,
    ) -> Result<EffectSpec, EffectError> {
        let def = defs
            .get(template)
            .ok_or_else(|| EffectError::InvalidTemplate(template.clone()))?;
        let magnitude = def.magnitude * level;
        if !magnitude.is_finite() {
            return Err(EffectError::SpecConstructionFailed(template.clone()));
        }
        Ok(EffectSpec {
            template: template.clone(),
            duration_policy: def.duration_policy,
            magnitude,
            duration_secs: def.duration_secs,
            context,
        })
    }

    /// Apply a spec to this receiver under the given handle.
    pub fn apply_to_self(&mut self, spec: EffectSpec, handle: ActiveEffectHandle) {
        match spec.duration_policy {
            DurationPolicy::Instant => self.instant_applied += 1,
            DurationPolicy::Duration | DurationPolicy::Infinite => {
                self.active.insert(handle, spec);
            }
        }
    }

    /// Remove a live effect instance. Returns false when the handle is
    /// unknown (already removed or never applied here).
    pub fn remove_active_effect(&mut self, handle: ActiveEffectHandle) -> bool {
        self.active.remove(&handle).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn instant_applied(&self) -> u64 {
        self.instant_applied
    }

    pub fn has_effect(&self, template: &EffectTemplateId) -> bool {
        self.active.values().any(|spec| &spec.template == template)
    }
}

/// Outcome of a successful application, enough for the caller to decide
/// whether registry bookkeeping is needed.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedEffect {
    pub handle: ActiveEffectHandle,
    pub duration_policy: DurationPolicy,
}

/// Apply `template` to `receiver` at `caster_level`, attributed to `source`.
///
/// Mirrors the receiver capability sequence: build a context, derive the
/// outgoing spec, apply it to the receiver. The handle is allocated up front
/// and discarded for instant effects.
pub fn apply_effect(
    receiver: &mut EffectReceiver,
    defs: &EffectDefs,
    handles: &mut EffectHandles,
    template: &EffectTemplateId,
    caster_level: f32,
    source: Entity,
) -> Result<AppliedEffect, EffectError> {
    let context = receiver.make_effect_context(source);
    let spec = receiver.make_outgoing_spec(defs, template, caster_level, context)?;
    let duration_policy = spec.duration_policy;
    let handle = handles.alloc();
    receiver.apply_to_self(spec, handle);
    Ok(AppliedEffect {
        handle,
        duration_policy,
    })
}
