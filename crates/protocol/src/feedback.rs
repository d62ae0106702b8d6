use bevy::prelude::*;

use crate::projectile::ProjectileId;

/// Fire-and-forget cues for the audio/VFX collaborator. The core never
/// waits on these and never observes a failure; tests read them to check
/// exactly-once impact behavior.
#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub enum FeedbackEvent {
    /// One-shot impact burst (sound + particles) at a world position.
    ImpactAt { position: Vec3 },
    /// Begin the looping flight sound for a projectile.
    LoopStarted { projectile: ProjectileId },
    /// Stop the looping flight sound for a projectile.
    LoopStopped { projectile: ProjectileId },
}
