//! Authoritative endpoint: commits replicated target samples, fires parked
//! capture-task listeners, spawns projectiles, and has the final word on
//! projectile destruction.

use bevy::prelude::*;
use protocol::targeting::resume_capture_task;
use protocol::*;

/// Issuer id the authority stamps on prediction tokens for its own
/// (listen-server) activations. Client issuers are their player ids, which
/// start at 1.
pub const SERVER_TOKEN_ISSUER: u64 = 0;

pub struct ServerGameplayPlugin;

impl Plugin for ServerGameplayPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(SharedGameplayPlugin);

        app.insert_resource(NetworkRole::Authoritative);
        app.insert_resource(PredictionTokens::new(SERVER_TOKEN_ISSUER));
        app.init_resource::<TargetDataStore>();
        app.init_resource::<ProjectileIds>();

        app.add_systems(PreUpdate, receive_client_messages);
        app.add_systems(
            FixedUpdate,
            (
                spawn_projectiles_on_target,
                resolve_projectile_contacts,
                expire_projectiles,
            )
                .chain()
                .after(targeting::activate_capture_tasks),
        );
    }
}

/// Drain the inbox and commit replicated target data.
///
/// The sample is stored before any listener fires, so a resumed task can
/// always see the sample it was woken for. The message is also forwarded to
/// observers unchanged.
pub fn receive_client_messages(
    mut inbox: ResMut<MessageInbox>,
    mut outbox: ResMut<MessageOutbox>,
    mut store: ResMut<TargetDataStore>,
    mut tasks: Query<(&ActiveSpell, &mut TargetCaptureTask)>,
    mut acquired: EventWriter<TargetAcquired>,
) {
    let messages: Vec<NetMessage> = inbox.drain().collect();
    for message in messages {
        match message {
            NetMessage::TargetData(msg) => {
                store.submit(msg.ability, msg.token, msg.sample);
                outbox.push(NetMessage::TargetData(msg.clone()));

                let Some(listener) = store.take_listener(msg.ability, msg.token) else {
                    continue;
                };
                let Some(sample) = store.consume(msg.ability, msg.token) else {
                    continue;
                };
                if !resume_capture_task(listener, &mut tasks, sample, &mut acquired) {
                    debug!("target data for token {:?} arrived after its task ended", msg.token);
                }
                // The parked activation is done either way; its key must
                // not accumulate in the store.
                store.release(msg.ability, msg.token);
            }
            other => {
                debug!("ignoring unexpected client message: {other:?}");
            }
        }
    }
}

/// Spawn a projectile for every resolved target sample and announce it.
pub fn spawn_projectiles_on_target(
    mut commands: Commands,
    role: Res<NetworkRole>,
    tick: Res<SimTick>,
    mut ids: ResMut<ProjectileIds>,
    mut outbox: ResMut<MessageOutbox>,
    mut feedback: EventWriter<FeedbackEvent>,
    mut acquired: EventReader<TargetAcquired>,
    spells: Query<&ActiveSpell>,
    sockets: Query<&LaunchSocket>,
) {
    for event in acquired.read() {
        let Ok(spell) = spells.get(event.spell) else {
            continue;
        };
        let Ok(socket) = sockets.get(spell.caster) else {
            warn!("caster {:?} has no launch socket, cannot spawn projectile", spell.caster);
            continue;
        };
        let Some((_, id)) =
            spawn_projectile(&mut commands, *role, &mut ids, tick.0, socket.0, &event.sample)
        else {
            continue;
        };
        feedback.write(FeedbackEvent::LoopStarted { projectile: id });
        outbox.push(NetMessage::ProjectileSpawn(ProjectileSpawnNotice {
            id,
            origin: socket.0,
            direction: aim_direction(socket.0, event.sample.world_point),
            speed: PROJECTILE_SPEED,
            lifespan_ticks: PROJECTILE_LIFESPAN_TICKS,
        }));
    }
}

/// Authoritative contact resolution: first contact plays impact feedback,
/// stops the flight loop, destroys the instance, and notifies observers.
/// The `hit` latch keeps a same-tick duplicate contact from re-triggering.
pub fn resolve_projectile_contacts(
    mut commands: Commands,
    mut contacts: EventReader<ProjectileContact>,
    mut outbox: ResMut<MessageOutbox>,
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
        commands.entity(contact.projectile).despawn();
        outbox.push(NetMessage::ProjectileDestroy(ProjectileDestroyNotice { id }));
    }
}

/// Tear down projectiles whose lifespan ran out without a hit. No impact
/// feedback here; the authority only plays impact on contact. The looping
/// flight cue started at spawn still has to stop.
pub fn expire_projectiles(
    mut commands: Commands,
    tick: Res<SimTick>,
    mut outbox: ResMut<MessageOutbox>,
    mut feedback: EventWriter<FeedbackEvent>,
    projectiles: Query<(Entity, &Projectile, &ProjectileId)>,
) {
    for (entity, projectile, &id) in &projectiles {
        if !projectile.expired(tick.0) {
            continue;
        }
        feedback.write(FeedbackEvent::LoopStopped { projectile: id });
        commands.entity(entity).despawn();
        outbox.push(NetMessage::ProjectileDestroy(ProjectileDestroyNotice { id }));
    }
}
