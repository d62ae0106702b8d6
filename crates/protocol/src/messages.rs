//! Explicit wire types for everything that crosses endpoints.
//!
//! Replication is deliberate rather than reflective: each replicated field
//! group is its own message, and every identifier in a message is stable
//! across endpoints (`PlayerId`, `AbilityHandle`, `PredictionToken`,
//! `ProjectileId` — never a raw `Entity`). The transport that moves an
//! outbox to a remote inbox is an external collaborator; it preserves send
//! order for messages sharing a prediction token.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::effect::EffectTemplateId;
use crate::projectile::ProjectileId;
use crate::targeting::{PredictionToken, TargetSample};
use crate::{AbilityHandle, PlayerId};

/// A captured target sample on its way from the authoring endpoint to the
/// authority (and onward to observers).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDataMessage {
    pub ability: AbilityHandle,
    pub token: PredictionToken,
    pub sample: TargetSample,
}

/// Authority-issued notice that a projectile entered flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpawnNotice {
    pub id: ProjectileId,
    pub origin: Vec3,
    pub direction: Vec3,
    pub speed: f32,
    pub lifespan_ticks: u64,
}

/// Authority-issued notice that a projectile is gone (hit or expired).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileDestroyNotice {
    pub id: ProjectileId,
}

/// Authority-issued notice that an effect template landed on a player's
/// character. Observational only; cosmetic endpoints re-emit it as an event
/// for UI collaborators.
#[derive(Event, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectApplicationNotice {
    pub template: EffectTemplateId,
    pub target: PlayerId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NetMessage {
    TargetData(TargetDataMessage),
    ProjectileSpawn(ProjectileSpawnNotice),
    ProjectileDestroy(ProjectileDestroyNotice),
    EffectApplication(EffectApplicationNotice),
}

/// Messages queued for the transport to carry off this endpoint.
#[derive(Resource, Debug, Default)]
pub struct MessageOutbox(VecDeque<NetMessage>);

impl MessageOutbox {
    pub fn push(&mut self, message: NetMessage) {
        self.0.push_back(message);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = NetMessage> + '_ {
        self.0.drain(..)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Messages the transport has delivered to this endpoint, in arrival order.
#[derive(Resource, Debug, Default)]
pub struct MessageInbox(VecDeque<NetMessage>);

impl MessageInbox {
    pub fn push(&mut self, message: NetMessage) {
        self.0.push_back(message);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = NetMessage> + '_ {
        self.0.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
