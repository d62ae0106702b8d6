use bevy::prelude::*;
use serde::{Deserialize, Serialize};

pub mod effect;
pub mod effect_actor;
pub mod feedback;
pub mod messages;
pub mod projectile;
pub mod replication;
pub mod targeting;

pub use effect::{
    apply_effect, ActiveEffectHandle, AppliedEffect, DurationPolicy, EffectContext, EffectDef,
    EffectDefs, EffectError, EffectHandles, EffectReceiver, EffectSpec, EffectTemplateId,
};
pub use effect_actor::{
    ActiveEffectRegistry, ApplicationPolicy, ContactEnd, ContactStart, EffectActor, EffectPolicy,
    RemovalPolicy,
};
pub use feedback::FeedbackEvent;
pub use messages::{
    EffectApplicationNotice, MessageInbox, MessageOutbox, NetMessage, ProjectileDestroyNotice,
    ProjectileSpawnNotice, TargetDataMessage,
};
pub use projectile::{
    aim_direction, spawn_projectile, LaunchSocket, Projectile, ProjectileContact, ProjectileId,
    ProjectileIds, PROJECTILE_LIFESPAN_TICKS, PROJECTILE_SPEED,
};
pub use replication::TargetDataStore;
pub use targeting::{
    begin_local_activation, begin_remote_activation, ActiveSpell, CancelSpell, CaptureState,
    CursorWorldPoint, PredictionToken, PredictionTokens, TargetAcquired, TargetCaptureTask,
    TargetSample,
};

pub const FIXED_TIMESTEP_HZ: f64 = 64.0;

/// Seconds per simulation tick. Flight integration uses this instead of wall
/// clock time so every endpoint advances projectiles identically.
pub const SIM_DT: f32 = 1.0 / FIXED_TIMESTEP_HZ as f32;

/// Identifies the player that owns an entity. Stable across endpoints, so
/// wire messages use it instead of `Entity` ids.
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlayerId(pub u64);

/// Stable identifier for a granted ability, assigned identically on every
/// endpoint at grant time. Scopes target-data exchanges together with the
/// activation's [`PredictionToken`](targeting::PredictionToken).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AbilityHandle(pub u32);

/// Marker on the character entity this endpoint controls. The target-data
/// capture task branches on its presence: present means sample the cursor
/// locally, absent means wait for the controlling endpoint's sample.
#[derive(Component, Clone, Debug)]
pub struct LocallyControlled;

/// Whether this endpoint's decisions about effect application and projectile
/// destruction are final, or merely cosmetic.
#[derive(Resource, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkRole {
    Authoritative,
    Cosmetic,
}

impl NetworkRole {
    pub fn is_authoritative(&self) -> bool {
        matches!(self, NetworkRole::Authoritative)
    }
}

/// Simulation tick counter, advanced once per fixed update. Projectile
/// lifespans are measured against it.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimTick(pub u64);

pub fn advance_sim_tick(mut tick: ResMut<SimTick>) {
    tick.0 += 1;
}

/// Shared gameplay systems that run identically on every endpoint. Endpoint
/// plugins (`server`/`client`) layer role-specific message handling on top.
pub struct SharedGameplayPlugin;

impl Plugin for SharedGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Time::<Fixed>::from_hz(FIXED_TIMESTEP_HZ));
        app.init_resource::<SimTick>();
        // Empty until the host loads authored definitions over it; the
        // contact systems must not fail validation before that happens.
        app.init_resource::<EffectDefs>();
        app.init_resource::<EffectHandles>();
        app.init_resource::<CursorWorldPoint>();
        app.init_resource::<MessageOutbox>();
        app.init_resource::<MessageInbox>();

        app.add_event::<ContactStart>();
        app.add_event::<ContactEnd>();
        app.add_event::<TargetAcquired>();
        app.add_event::<CancelSpell>();
        app.add_event::<ProjectileContact>();
        app.add_event::<FeedbackEvent>();

        app.add_systems(
            FixedUpdate,
            (
                advance_sim_tick,
                targeting::handle_spell_cancellation,
                targeting::activate_capture_tasks,
                effect_actor::apply_contact_start_effects,
                effect_actor::apply_contact_end_effects,
                projectile::move_projectiles,
            )
                .chain(),
        );
    }
}

#[cfg(feature = "test_utils")]
pub mod test_utils;
