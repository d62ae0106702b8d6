use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::effect::{
    apply_effect, ActiveEffectHandle, DurationPolicy, EffectDefs, EffectHandles, EffectReceiver,
    EffectTemplateId,
};
use crate::messages::{EffectApplicationNotice, MessageOutbox, NetMessage};
use crate::{NetworkRole, PlayerId};

/// When an effect template is applied relative to the contact pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationPolicy {
    OnContactStart,
    OnContactEnd,
    #[default]
    DoNotApply,
}

/// When a persistent effect applied by this emitter is removed again. Only
/// meaningful for templates with an `Infinite` duration policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[default]
    OnContactEnd,
    DoNotRemove,
}

/// One row of the per-entry policy table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectPolicy {
    pub template: EffectTemplateId,
    pub apply_on: ApplicationPolicy,
    #[serde(default)]
    pub remove_on: RemovalPolicy,
}

/// Emitter-side configuration: which templates fire on which contact event.
///
/// Carries both the per-entry `policies` table and the older per-category
/// lists (one shared policy per duration category, single removal policy for
/// the infinite list). Both representations stay authorable; a template
/// listed in both for the same contact event is applied once, with the table
/// entry taking precedence over the legacy lists.
#[derive(Component, Clone, Debug, PartialEq)]
#[require(ActiveEffectRegistry)]
pub struct EffectActor {
    pub policies: Vec<EffectPolicy>,

    pub instant_templates: Vec<EffectTemplateId>,
    pub instant_application: ApplicationPolicy,
    pub duration_templates: Vec<EffectTemplateId>,
    pub duration_application: ApplicationPolicy,
    pub infinite_templates: Vec<EffectTemplateId>,
    pub infinite_application: ApplicationPolicy,
    pub infinite_removal: RemovalPolicy,

    /// Despawn the emitter once a contact-end pass has removed at least one
    /// persistent effect (single-use pickup behavior).
    pub despawn_on_effect_removal: bool,
    /// Level the outgoing specs are derived at.
    pub actor_level: f32,
}

impl Default for EffectActor {
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            instant_templates: Vec::new(),
            instant_application: ApplicationPolicy::DoNotApply,
            duration_templates: Vec::new(),
            duration_application: ApplicationPolicy::DoNotApply,
            infinite_templates: Vec::new(),
            infinite_application: ApplicationPolicy::DoNotApply,
            infinite_removal: RemovalPolicy::OnContactEnd,
            despawn_on_effect_removal: false,
            actor_level: 1.0,
        }
    }
}

/// Bookkeeping for persistent effects this emitter has applied and is
/// responsible for removing. One entry per live effect instance; the entry
/// and the live effect are created and deleted together.
#[derive(Component, Clone, Debug, Default)]
pub struct ActiveEffectRegistry {
    entries: HashMap<ActiveEffectHandle, Entity>,
}

impl ActiveEffectRegistry {
    pub fn insert(&mut self, handle: ActiveEffectHandle, receiver: Entity) {
        self.entries.insert(handle, receiver);
    }

    pub fn remove(&mut self, handle: &ActiveEffectHandle) -> Option<Entity> {
        self.entries.remove(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles of entries recorded against the given receiver.
    pub fn handles_for(&self, receiver: Entity) -> Vec<ActiveEffectHandle> {
        self.entries
            .iter()
            .filter(|(_, held_by)| **held_by == receiver)
            .map(|(handle, _)| *handle)
            .collect()
    }
}

/// Spatial overlap began between `emitter` and `other`. Fired by the
/// external overlap subsystem.
#[derive(Event, Clone, Copy, Debug)]
pub struct ContactStart {
    pub emitter: Entity,
    pub other: Entity,
}

/// Spatial overlap ended between `emitter` and `other`.
#[derive(Event, Clone, Copy, Debug)]
pub struct ContactEnd {
    pub emitter: Entity,
    pub other: Entity,
}

/// Templates (with their removal policy) this actor fires for a trigger.
/// Table entries first; legacy list entries that repeat a table template for
/// the same trigger are suppressed so nothing double-applies.
fn contact_templates(
    actor: &EffectActor,
    trigger: ApplicationPolicy,
) -> Vec<(EffectTemplateId, RemovalPolicy)> {
    let mut out: Vec<(EffectTemplateId, RemovalPolicy)> = actor
        .policies
        .iter()
        .filter(|policy| policy.apply_on == trigger)
        .map(|policy| (policy.template.clone(), policy.remove_on))
        .collect();

    let legacy = [
        (
            &actor.instant_templates,
            actor.instant_application,
            RemovalPolicy::DoNotRemove,
        ),
        (
            &actor.duration_templates,
            actor.duration_application,
            RemovalPolicy::DoNotRemove,
        ),
        (
            &actor.infinite_templates,
            actor.infinite_application,
            actor.infinite_removal,
        ),
    ];
    for (templates, application, removal) in legacy {
        if application != trigger {
            continue;
        }
        for template in templates {
            if out.iter().any(|(listed, _)| listed == template) {
                continue;
            }
            out.push((template.clone(), removal));
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn apply_for_trigger(
    trigger: ApplicationPolicy,
    emitter: Entity,
    actor: &EffectActor,
    registry: &mut ActiveEffectRegistry,
    target: Entity,
    defs: &EffectDefs,
    handles: &mut EffectHandles,
    receivers: &mut Query<(&mut EffectReceiver, Option<&PlayerId>)>,
    role: NetworkRole,
    outbox: &mut MessageOutbox,
) {
    let templates = contact_templates(actor, trigger);
    if templates.is_empty() {
        return;
    }
    let Ok((mut receiver, player_id)) = receivers.get_mut(target) else {
        debug!("contact target {target:?} has no effect receiver, skipping");
        return;
    };

    for (template, removal) in templates {
        match apply_effect(
            &mut receiver,
            defs,
            handles,
            &template,
            actor.actor_level,
            emitter,
        ) {
            Ok(applied) => {
                if applied.duration_policy == DurationPolicy::Infinite
                    && removal == RemovalPolicy::OnContactEnd
                {
                    registry.insert(applied.handle, target);
                }
                if role.is_authoritative() {
                    if let Some(&player) = player_id {
                        outbox.push(NetMessage::EffectApplication(EffectApplicationNotice {
                            template: template.clone(),
                            target: player,
                        }));
                    }
                }
            }
            Err(err) => {
                warn!("skipping effect {template:?} on {target:?}: {err}");
            }
        }
    }
}

/// Apply every policy entry that fires on contact-start.
pub fn apply_contact_start_effects(
    defs: Res<EffectDefs>,
    role: Res<NetworkRole>,
    mut handles: ResMut<EffectHandles>,
    mut outbox: ResMut<MessageOutbox>,
    mut events: EventReader<ContactStart>,
    mut emitters: Query<(&EffectActor, &mut ActiveEffectRegistry)>,
    mut receivers: Query<(&mut EffectReceiver, Option<&PlayerId>)>,
) {
    for event in events.read() {
        let Ok((actor, mut registry)) = emitters.get_mut(event.emitter) else {
            continue;
        };
        apply_for_trigger(
            ApplicationPolicy::OnContactStart,
            event.emitter,
            actor,
            &mut registry,
            event.other,
            &defs,
            &mut handles,
            &mut receivers,
            *role,
            &mut outbox,
        );
    }
}

/// Apply contact-end policy entries, then remove every persistent effect
/// this emitter recorded against the departing receiver. Removal and
/// deregistration happen in the same pass so no handle leaks and none is
/// removed twice.
pub fn apply_contact_end_effects(
    mut commands: Commands,
    defs: Res<EffectDefs>,
    role: Res<NetworkRole>,
    mut handles: ResMut<EffectHandles>,
    mut outbox: ResMut<MessageOutbox>,
    mut events: EventReader<ContactEnd>,
    mut emitters: Query<(&EffectActor, &mut ActiveEffectRegistry)>,
    mut receivers: Query<(&mut EffectReceiver, Option<&PlayerId>)>,
) {
    for event in events.read() {
        let Ok((actor, mut registry)) = emitters.get_mut(event.emitter) else {
            continue;
        };
        apply_for_trigger(
            ApplicationPolicy::OnContactEnd,
            event.emitter,
            actor,
            &mut registry,
            event.other,
            &defs,
            &mut handles,
            &mut receivers,
            *role,
            &mut outbox,
        );

        let removal_configured = actor.infinite_removal == RemovalPolicy::OnContactEnd
            || actor
                .policies
                .iter()
                .any(|policy| policy.remove_on == RemovalPolicy::OnContactEnd);
        if !removal_configured {
            continue;
        }
        let Ok((mut receiver, _)) = receivers.get_mut(event.other) else {
            // No receiver on the departing entity; nothing to remove.
            continue;
        };

        let mut removed = 0usize;
        for handle in registry.handles_for(event.other) {
            if !receiver.remove_active_effect(handle) {
                warn!("registry entry {handle:?} had no live effect on {:?}", event.other);
            }
            registry.remove(&handle);
            removed += 1;
        }

        if removed > 0 && actor.despawn_on_effect_removal {
            commands.entity(event.emitter).despawn();
        }
    }
}
