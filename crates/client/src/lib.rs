//! Cosmetic/predicted endpoint: captures target samples for the locally
//! controlled character, mirrors authority-announced projectiles, and
//! suppresses duplicate impact feedback while the authority's destroy
//! notices catch up.

use bevy::prelude::*;
use protocol::*;

pub struct ClientGameplayPlugin {
    /// The player this endpoint controls. Doubles as the prediction-token
    /// issuer so tokens never collide across endpoints.
    pub local_player: PlayerId,
}

impl Plugin for ClientGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(SharedGameplayPlugin);

        app.insert_resource(NetworkRole::Cosmetic);
        app.insert_resource(PredictionTokens::new(self.local_player.0));
        app.add_event::<EffectApplicationNotice>();

        app.add_systems(PreUpdate, receive_server_messages);
        app.add_systems(
            FixedUpdate,
            (resolve_projectile_contacts, expire_projectiles)
                .chain()
                .after(targeting::activate_capture_tasks),
        );
    }
}

/// Drain authority messages: mirror projectile spawns, apply destroy
/// notices, surface effect-application notices to UI.
///
/// A destroy notice arriving while the local instance is still flying means
/// the authoritative destruction outran our contact event; the teardown
/// plays the impact feedback as a fallback, exactly once.
pub fn receive_server_messages(
    mut commands: Commands,
    tick: Res<SimTick>,
    mut inbox: ResMut<MessageInbox>,
    mut feedback: EventWriter<FeedbackEvent>,
    mut effect_notices: EventWriter<EffectApplicationNotice>,
    projectiles: Query<(Entity, &Projectile, &ProjectileId, &Transform)>,
) {
    let messages: Vec<NetMessage> = inbox.drain().collect();
    for message in messages {
        match message {
            NetMessage::ProjectileSpawn(notice) => {
                commands.spawn((
                    Projectile {
                        velocity: notice.direction * notice.speed,
                        spawn_tick: tick.0,
                        lifespan_ticks: notice.lifespan_ticks,
                        hit: false,
                    },
                    notice.id,
                    Transform::from_translation(notice.origin),
                    Name::new("Projectile"),
                ));
                feedback.write(FeedbackEvent::LoopStarted {
                    projectile: notice.id,
                });
            }
            NetMessage::ProjectileDestroy(notice) => {
                let found = projectiles.iter().find(|candidate| *candidate.2 == notice.id);
                let Some((entity, projectile, &id, transform)) = found else {
                    debug!("destroy notice for unknown projectile {:?}", notice.id);
                    continue;
                };
                if !projectile.hit {
                    feedback.write(FeedbackEvent::ImpactAt {
                        position: transform.translation,
                    });
                    feedback.write(FeedbackEvent::LoopStopped { projectile: id });
                }
                commands.entity(entity).despawn();
            }
            NetMessage::EffectApplication(notice) => {
                effect_notices.write(notice);
            }
            NetMessage::TargetData(msg) => {
                // Observer rebroadcast; nothing on this endpoint waits on it.
                debug!("observed target data for token {:?}", msg.token);
            }
        }
    }
}

/// Cosmetic contact resolution: play impact feedback and latch `hit`, but
/// leave destruction to the authority's notice.
pub fn resolve_projectile_contacts(
    mut contacts: EventReader<ProjectileContact>,
    mut feedback: EventWriter<FeedbackEvent>,
    mut projectiles: Query<(&mut Projectile, &ProjectileId, &Transform)>,
) {
    for contact in contacts.read() {
        let Ok((mut projectile, &id, transform)) = projectiles.get_mut(contact.projectile) else {
            continue;
        };
        if projectile.hit {
            continue;
        }
        projectile.hit = true;
        feedback.write(FeedbackEvent::ImpactAt {
            position: transform.translation,
        });
        feedback.write(FeedbackEvent::LoopStopped { projectile: id });
    }
}

/// Local lifespan fallback for when the authority's destroy notice never
/// arrives (or arrives after we expire). Plays the impact feedback iff
/// contact never resolved it.
pub fn expire_projectiles(
    mut commands: Commands,
    tick: Res<SimTick>,
    mut feedback: EventWriter<FeedbackEvent>,
    projectiles: Query<(Entity, &Projectile, &ProjectileId, &Transform)>,
) {
    for (entity, projectile, &id, transform) in &projectiles {
        if !projectile.expired(tick.0) {
            continue;
        }
        if !projectile.hit {
            feedback.write(FeedbackEvent::ImpactAt {
                position: transform.translation,
            });
            feedback.write(FeedbackEvent::LoopStopped { projectile: id });
        }
        commands.entity(entity).despawn();
    }
}
