//! Helpers for wiring headless endpoint apps in tests.
//!
//! Enable with the `test_utils` feature flag. Tests add the systems under
//! test to `Update` themselves and drive the app with `app.update()`, so no
//! fixed-timestep accumulation gets in the way.

use bevy::prelude::*;

use crate::effect::{EffectDefs, EffectHandles};
use crate::effect_actor::{ContactEnd, ContactStart};
use crate::feedback::FeedbackEvent;
use crate::messages::{EffectApplicationNotice, MessageInbox, MessageOutbox};
use crate::projectile::{ProjectileContact, ProjectileIds};
use crate::replication::TargetDataStore;
use crate::targeting::{CancelSpell, CursorWorldPoint, PredictionTokens, TargetAcquired};
use crate::{NetworkRole, SimTick};

/// Build a bare endpoint app with every shared resource and event
/// registered. The authoritative endpoint additionally owns the
/// target-data store.
pub fn endpoint_app(role: NetworkRole, issuer: u64) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);

    app.insert_resource(role);
    app.insert_resource(PredictionTokens::new(issuer));
    app.init_resource::<SimTick>();
    app.init_resource::<EffectHandles>();
    app.init_resource::<EffectDefs>();
    app.init_resource::<CursorWorldPoint>();
    app.init_resource::<MessageOutbox>();
    app.init_resource::<MessageInbox>();
    app.init_resource::<ProjectileIds>();
    if role.is_authoritative() {
        app.init_resource::<TargetDataStore>();
    }

    app.add_event::<ContactStart>();
    app.add_event::<ContactEnd>();
    app.add_event::<TargetAcquired>();
    app.add_event::<CancelSpell>();
    app.add_event::<ProjectileContact>();
    app.add_event::<FeedbackEvent>();
    app.add_event::<EffectApplicationNotice>();

    app
}

/// Move everything in `from`'s outbox into `to`'s inbox, preserving order.
/// Stands in for the external transport. Returns how many messages moved.
pub fn shuttle(from: &mut App, to: &mut App) -> usize {
    let messages: Vec<_> = from
        .world_mut()
        .resource_mut::<MessageOutbox>()
        .drain()
        .collect();
    let count = messages.len();
    let mut inbox = to.world_mut().resource_mut::<MessageInbox>();
    for message in messages {
        inbox.push(message);
    }
    count
}

/// Drain and return all feedback events queued on an app.
pub fn drain_feedback(app: &mut App) -> Vec<FeedbackEvent> {
    app.world_mut()
        .resource_mut::<Events<FeedbackEvent>>()
        .drain()
        .collect()
}

/// Drain and return all target-acquired events queued on an app.
pub fn drain_acquired(app: &mut App) -> Vec<TargetAcquired> {
    app.world_mut()
        .resource_mut::<Events<TargetAcquired>>()
        .drain()
        .collect()
}
