use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::messages::{MessageOutbox, NetMessage, TargetDataMessage};
use crate::replication::TargetDataStore;
use crate::{AbilityHandle, LocallyControlled, PlayerId};

/// Scopes one client-optimistic activation so its authoritative outcome can
/// be matched back to the originating attempt. Unique per activation per
/// issuing endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredictionToken {
    pub issuer: u64,
    pub seq: u32,
}

/// Endpoint-local allocator for [`PredictionToken`]s.
#[derive(Resource, Clone, Debug)]
pub struct PredictionTokens {
    issuer: u64,
    next_seq: u32,
}

impl PredictionTokens {
    pub fn new(issuer: u64) -> Self {
        Self {
            issuer,
            next_seq: 0,
        }
    }

    pub fn next(&mut self) -> PredictionToken {
        let token = PredictionToken {
            issuer: self.issuer,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        token
    }
}

/// A world-space target location captured by the controlling endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetSample {
    pub world_point: Vec3,
    pub source: PlayerId,
}

/// World point currently under the controlling pointer, maintained by the
/// input collaborator. `None` when the cursor ray hits nothing.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct CursorWorldPoint(pub Option<Vec3>);

/// A spell activation that needs a target location before it can act.
#[derive(Component, Clone, Copy, Debug)]
pub struct ActiveSpell {
    pub caster: Entity,
    pub ability: AbilityHandle,
    pub token: PredictionToken,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureState {
    /// Not yet activated; the next capture pass branches it.
    #[default]
    Created,
    /// Parked until the controlling endpoint's sample arrives.
    AwaitingRemote,
    /// Sample broadcast to consumers; further deliveries are ignored.
    Delivered,
}

/// Restartable, cancellable unit that resolves "where is the current
/// target" — locally from the cursor, or remotely by listening on the
/// authority's target-data store.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct TargetCaptureTask {
    pub state: CaptureState,
    pub cancelled: bool,
}

impl TargetCaptureTask {
    /// Whether a delivered sample may still reach consumers.
    pub fn may_broadcast(&self) -> bool {
        !self.cancelled
    }
}

/// A capture task resolved a target sample for this activation.
#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub struct TargetAcquired {
    pub spell: Entity,
    pub token: PredictionToken,
    pub sample: TargetSample,
}

/// Request to cancel a spell activation and its outstanding capture task.
#[derive(Event, Clone, Copy, Debug)]
pub struct CancelSpell {
    pub spell: Entity,
}

/// Begin a spell activation on the endpoint controlling `caster`, under a
/// freshly issued prediction token.
pub fn begin_local_activation(
    commands: &mut Commands,
    tokens: &mut PredictionTokens,
    caster: Entity,
    ability: AbilityHandle,
) -> (Entity, PredictionToken) {
    let token = tokens.next();
    let spell = commands
        .spawn((
            ActiveSpell {
                caster,
                ability,
                token,
            },
            TargetCaptureTask::default(),
            Name::new("ActiveSpell"),
        ))
        .id();
    (spell, token)
}

/// Begin the authority-side leg of an activation that some other endpoint
/// controls, reusing that endpoint's prediction token so replicated target
/// data matches up.
pub fn begin_remote_activation(
    commands: &mut Commands,
    caster: Entity,
    ability: AbilityHandle,
    token: PredictionToken,
) -> Entity {
    commands
        .spawn((
            ActiveSpell {
                caster,
                ability,
                token,
            },
            TargetCaptureTask::default(),
            Name::new("ActiveSpell"),
        ))
        .id()
}

/// Advance freshly created capture tasks.
///
/// Locally controlled caster: sample the cursor, send the sample to the
/// authority tagged with the activation's prediction token, and deliver to
/// local consumers immediately. Anyone else: check the store for a sample
/// that outran us, otherwise park and register a listener.
pub fn activate_capture_tasks(
    cursor: Res<CursorWorldPoint>,
    mut outbox: ResMut<MessageOutbox>,
    mut store: Option<ResMut<TargetDataStore>>,
    controlled: Query<&PlayerId, With<LocallyControlled>>,
    mut tasks: Query<(Entity, &ActiveSpell, &mut TargetCaptureTask)>,
    mut acquired: EventWriter<TargetAcquired>,
) {
    for (spell_entity, spell, mut task) in &mut tasks {
        if task.state != CaptureState::Created || task.cancelled {
            continue;
        }

        if let Ok(&player) = controlled.get(spell.caster) {
            let Some(world_point) = cursor.0 else {
                warn!("cursor sample unavailable for spell {spell_entity:?}, dropping capture");
                task.state = CaptureState::Delivered;
                continue;
            };
            let sample = TargetSample {
                world_point,
                source: player,
            };
            // Send first: the authority's copy is committed under this
            // token whether or not local delivery goes through.
            outbox.push(NetMessage::TargetData(TargetDataMessage {
                ability: spell.ability,
                token: spell.token,
                sample,
            }));
            if task.may_broadcast() {
                acquired.write(TargetAcquired {
                    spell: spell_entity,
                    token: spell.token,
                    sample,
                });
            }
            task.state = CaptureState::Delivered;
        } else {
            let Some(store) = store.as_mut() else {
                warn!("spell {spell_entity:?} awaits remote target data but this endpoint has no store");
                continue;
            };
            let key = (spell.ability, spell.token);
            // The replicated sample may have outrun task registration.
            if let Some(sample) = store.consume(spell.ability, spell.token) {
                acquired.write(TargetAcquired {
                    spell: spell_entity,
                    token: spell.token,
                    sample,
                });
                task.state = CaptureState::Delivered;
            } else {
                store.register_listener(key.0, key.1, spell_entity);
                task.state = CaptureState::AwaitingRemote;
            }
        }
    }
}

/// Resume a parked capture task with a freshly committed sample. Returns
/// false when the delivery was dropped (task gone, cancelled, or already
/// delivered).
pub fn resume_capture_task(
    spell_entity: Entity,
    tasks: &mut Query<(&ActiveSpell, &mut TargetCaptureTask)>,
    sample: TargetSample,
    acquired: &mut EventWriter<TargetAcquired>,
) -> bool {
    let Ok((spell, mut task)) = tasks.get_mut(spell_entity) else {
        return false;
    };
    if task.state != CaptureState::AwaitingRemote || !task.may_broadcast() {
        return false;
    }
    acquired.write(TargetAcquired {
        spell: spell_entity,
        token: spell.token,
        sample,
    });
    task.state = CaptureState::Delivered;
    true
}

/// Mark cancelled tasks and release their store state so a late sample
/// never fires into a dead activation and the key leaves the store.
pub fn handle_spell_cancellation(
    mut events: EventReader<CancelSpell>,
    mut store: Option<ResMut<TargetDataStore>>,
    mut tasks: Query<(&ActiveSpell, &mut TargetCaptureTask)>,
) {
    for event in events.read() {
        let Ok((spell, mut task)) = tasks.get_mut(event.spell) else {
            continue;
        };
        task.cancelled = true;
        if let Some(store) = store.as_mut() {
            store.release(spell.ability, spell.token);
        }
    }
}
