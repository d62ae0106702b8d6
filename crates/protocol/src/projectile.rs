use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::targeting::TargetSample;
use crate::{NetworkRole, SimTick, SIM_DT};

pub const PROJECTILE_SPEED: f32 = 550.0;

/// 15 seconds of flight at the fixed tick rate.
pub const PROJECTILE_LIFESPAN_TICKS: u64 = (15.0 * crate::FIXED_TIMESTEP_HZ) as u64;

/// Authority-allocated projectile identifier, shared with cosmetic endpoints
/// through [`ProjectileSpawnNotice`](crate::messages::ProjectileSpawnNotice)
/// so destroy notices can find the local instance.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectileId(pub u64);

#[derive(Resource, Clone, Debug, Default)]
pub struct ProjectileIds {
    next: u64,
}

impl ProjectileIds {
    pub fn alloc(&mut self) -> ProjectileId {
        let id = ProjectileId(self.next);
        self.next += 1;
        id
    }
}

/// World-space point projectiles launch from (the caster's weapon socket,
/// maintained by the animation collaborator).
#[derive(Component, Clone, Copy, Debug)]
pub struct LaunchSocket(pub Vec3);

/// A kinematic projectile in flight. Constant velocity, no gravity.
///
/// `hit` is this endpoint's "contact already resolved" latch: it transitions
/// false to true exactly once and gates impact feedback on every endpoint.
#[derive(Component, Clone, Debug)]
pub struct Projectile {
    pub velocity: Vec3,
    pub spawn_tick: u64,
    pub lifespan_ticks: u64,
    pub hit: bool,
}

impl Projectile {
    pub fn expired(&self, tick: u64) -> bool {
        tick.saturating_sub(self.spawn_tick) >= self.lifespan_ticks
    }
}

/// The projectile's sphere began overlapping `other`. Fired by the external
/// overlap subsystem.
#[derive(Event, Clone, Copy, Debug)]
pub struct ProjectileContact {
    pub projectile: Entity,
    pub other: Entity,
}

/// Horizontal aim from a launch point toward a sampled target. The vertical
/// component is zeroed before normalizing so flight stays level no matter
/// what elevation the cursor sampled.
pub fn aim_direction(launch: Vec3, target: Vec3) -> Vec3 {
    let toward = target - launch;
    Vec3::new(toward.x, 0.0, toward.z).normalize_or_zero()
}

/// Spawn a projectile aimed from `launch` toward the captured sample.
///
/// Authority-only: cosmetic endpoints get their instance from the spawn
/// notice instead, and a call here is a logged no-op.
pub fn spawn_projectile(
    commands: &mut Commands,
    role: NetworkRole,
    ids: &mut ProjectileIds,
    tick: u64,
    launch: Vec3,
    sample: &TargetSample,
) -> Option<(Entity, ProjectileId)> {
    if !role.is_authoritative() {
        debug!("projectile spawn skipped on non-authoritative endpoint");
        return None;
    }
    let direction = aim_direction(launch, sample.world_point);
    let id = ids.alloc();
    let entity = commands
        .spawn((
            Projectile {
                velocity: direction * PROJECTILE_SPEED,
                spawn_tick: tick,
                lifespan_ticks: PROJECTILE_LIFESPAN_TICKS,
                hit: false,
            },
            id,
            Transform::from_translation(launch),
            Name::new("Projectile"),
        ))
        .id();
    Some((entity, id))
}

/// Integrate flight by one fixed tick. Identical on every endpoint.
pub fn move_projectiles(mut query: Query<(&Projectile, &mut Transform)>) {
    for (projectile, mut transform) in &mut query {
        transform.translation += projectile.velocity * SIM_DT;
    }
}

/// Ticks elapsed since spawn, for lifespan checks on either endpoint.
pub fn projectile_age(projectile: &Projectile, tick: &SimTick) -> u64 {
    tick.0.saturating_sub(projectile.spawn_tick)
}
