use bevy::prelude::*;
use protocol::targeting::{activate_capture_tasks, begin_remote_activation, handle_spell_cancellation};
use protocol::test_utils::{drain_acquired, drain_feedback, endpoint_app, shuttle};
use protocol::*;
use server::SERVER_TOKEN_ISSUER;

const ABILITY: AbilityHandle = AbilityHandle(1);

/// Authoritative endpoint with its full gameplay chain on `Update`, so each
/// `app.update()` is one deterministic server pass.
fn server_app() -> App {
    let mut app = endpoint_app(NetworkRole::Authoritative, SERVER_TOKEN_ISSUER);
    app.add_systems(
        Update,
        (
            server::receive_client_messages,
            handle_spell_cancellation,
            activate_capture_tasks,
            server::spawn_projectiles_on_target,
            projectile::move_projectiles,
            server::resolve_projectile_contacts,
            server::expire_projectiles,
        )
            .chain(),
    );
    app
}

fn client_app(player: u64) -> App {
    let mut app = endpoint_app(NetworkRole::Cosmetic, player);
    app.add_systems(
        Update,
        (
            client::receive_server_messages,
            handle_spell_cancellation,
            activate_capture_tasks,
            projectile::move_projectiles,
            client::resolve_projectile_contacts,
            client::expire_projectiles,
        )
            .chain(),
    );
    app
}

fn activate(app: &mut App, caster: Entity, token: PredictionToken) -> Entity {
    let spell = {
        let mut commands = app.world_mut().commands();
        begin_remote_activation(&mut commands, caster, ABILITY, token)
    };
    app.world_mut().flush();
    spell
}

fn impact_count(feedback: &[FeedbackEvent]) -> usize {
    feedback
        .iter()
        .filter(|event| matches!(event, FeedbackEvent::ImpactAt { .. }))
        .count()
}

#[test_log::test]
fn client_capture_drives_server_spawn_and_mirrors_back() {
    let mut server = server_app();
    let mut client = client_app(1);

    let socket = Vec3::new(0.0, 1.2, 0.0);
    let server_caster = server
        .world_mut()
        .spawn((PlayerId(1), LaunchSocket(socket)))
        .id();
    let client_caster = client
        .world_mut()
        .spawn((PlayerId(1), LocallyControlled))
        .id();
    client.world_mut().resource_mut::<CursorWorldPoint>().0 = Some(Vec3::new(30.0, 0.0, 0.0));

    // The activation exists on both endpoints under one prediction token.
    let token = client.world_mut().resource_mut::<PredictionTokens>().next();
    activate(&mut client, client_caster, token);
    activate(&mut server, server_caster, token);

    // Server pass first: its task parks waiting for the client's sample.
    server.update();
    assert!(drain_acquired(&mut server).is_empty());

    // Client pass: predicted delivery happens immediately.
    client.update();
    let predicted = drain_acquired(&mut client);
    assert_eq!(predicted.len(), 1);
    assert_eq!(predicted[0].token, token);

    // Sample travels to the authority; the parked task wakes and a
    // projectile enters flight.
    assert_eq!(shuttle(&mut client, &mut server), 1);
    server.update();
    let committed = drain_acquired(&mut server);
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].sample, predicted[0].sample);

    let mut projectiles = server.world_mut().query::<(&Projectile, &ProjectileId)>();
    let flying: Vec<_> = projectiles.iter(server.world()).collect();
    assert_eq!(flying.len(), 1);
    // Aimed flat toward +X from the socket, at launch speed.
    let (projectile, &server_id) = flying[0];
    assert_eq!(projectile.velocity, Vec3::X * PROJECTILE_SPEED);
    let server_feedback = drain_feedback(&mut server);
    assert!(server_feedback.contains(&FeedbackEvent::LoopStarted { projectile: server_id }));

    // Rebroadcast sample plus spawn notice reach the client, which mirrors
    // the projectile cosmetically.
    assert_eq!(shuttle(&mut server, &mut client), 2);
    client.update();
    let mut mirrored = client.world_mut().query::<(Entity, &ProjectileId)>();
    let instances: Vec<_> = mirrored.iter(client.world()).collect();
    assert_eq!(instances.len(), 1);
    assert_eq!(*instances[0].1, server_id);
    let client_feedback = drain_feedback(&mut client);
    assert!(client_feedback.contains(&FeedbackEvent::LoopStarted { projectile: server_id }));

    // Authoritative contact: one impact on the server, then the destroy
    // notice produces exactly one (fallback) impact on the client.
    let mut by_id = server.world_mut().query::<(Entity, &ProjectileId)>();
    let (server_entity, _) = by_id.iter(server.world()).next().unwrap();
    server.world_mut().send_event(ProjectileContact {
        projectile: server_entity,
        other: server_caster,
    });
    server.update();
    let server_feedback = drain_feedback(&mut server);
    assert_eq!(impact_count(&server_feedback), 1);
    assert!(server_feedback.contains(&FeedbackEvent::LoopStopped { projectile: server_id }));
    let mut remaining = server.world_mut().query::<&Projectile>();
    assert_eq!(remaining.iter(server.world()).count(), 0);

    assert_eq!(shuttle(&mut server, &mut client), 1);
    client.update();
    let client_feedback = drain_feedback(&mut client);
    assert_eq!(impact_count(&client_feedback), 1);
    let mut remaining = client.world_mut().query::<&Projectile>();
    assert_eq!(remaining.iter(client.world()).count(), 0);
}

#[test_log::test]
fn duplicate_target_data_fires_the_task_once() {
    let mut server = server_app();
    let caster = server
        .world_mut()
        .spawn((PlayerId(2), LaunchSocket(Vec3::ZERO)))
        .id();
    let token = PredictionToken { issuer: 2, seq: 0 };
    activate(&mut server, caster, token);
    server.update();

    let message = NetMessage::TargetData(TargetDataMessage {
        ability: ABILITY,
        token,
        sample: TargetSample {
            world_point: Vec3::new(10.0, 0.0, 0.0),
            source: PlayerId(2),
        },
    });
    // Transport retry delivered the same sample twice.
    {
        let mut inbox = server.world_mut().resource_mut::<MessageInbox>();
        inbox.push(message.clone());
        inbox.push(message);
    }
    server.update();

    assert_eq!(drain_acquired(&mut server).len(), 1);
    let mut projectiles = server.world_mut().query::<&Projectile>();
    assert_eq!(projectiles.iter(server.world()).count(), 1);

    // A third delivery on a later pass is also inert.
    let mut stale = server.world_mut().resource_mut::<MessageInbox>();
    stale.push(NetMessage::TargetData(TargetDataMessage {
        ability: ABILITY,
        token,
        sample: TargetSample {
            world_point: Vec3::new(99.0, 0.0, 0.0),
            source: PlayerId(2),
        },
    }));
    server.update();
    assert!(drain_acquired(&mut server).is_empty());
    let mut projectiles = server.world_mut().query::<&Projectile>();
    assert_eq!(projectiles.iter(server.world()).count(), 1);
}

#[test]
fn listen_server_player_captures_locally() {
    let mut server = server_app();
    let caster = server
        .world_mut()
        .spawn((PlayerId(0), LocallyControlled, LaunchSocket(Vec3::ZERO)))
        .id();
    server.world_mut().resource_mut::<CursorWorldPoint>().0 = Some(Vec3::new(0.0, 0.0, 8.0));

    let token = server.world_mut().resource_mut::<PredictionTokens>().next();
    assert_eq!(token.issuer, SERVER_TOKEN_ISSUER);
    activate(&mut server, caster, token);
    server.update();

    // Capture and spawn complete in a single authoritative pass.
    assert_eq!(drain_acquired(&mut server).len(), 1);
    let mut projectiles = server.world_mut().query::<&Projectile>();
    assert_eq!(projectiles.iter(server.world()).count(), 1);
}

#[test]
fn caster_without_launch_socket_spawns_nothing() {
    let mut server = server_app();
    let caster = server
        .world_mut()
        .spawn((PlayerId(0), LocallyControlled))
        .id();
    server.world_mut().resource_mut::<CursorWorldPoint>().0 = Some(Vec3::X);

    let token = server.world_mut().resource_mut::<PredictionTokens>().next();
    activate(&mut server, caster, token);
    server.update();

    let mut projectiles = server.world_mut().query::<&Projectile>();
    assert_eq!(projectiles.iter(server.world()).count(), 0);
    // The capture itself still delivered; only launch was refused.
    assert_eq!(drain_acquired(&mut server).len(), 1);
}

#[test]
fn same_tick_duplicate_contact_impacts_once() {
    let mut server = server_app();
    let entity = server
        .world_mut()
        .spawn((
            Projectile {
                velocity: Vec3::X * PROJECTILE_SPEED,
                spawn_tick: 0,
                lifespan_ticks: PROJECTILE_LIFESPAN_TICKS,
                hit: false,
            },
            ProjectileId(7),
            Transform::default(),
        ))
        .id();
    let wall = server.world_mut().spawn(Transform::default()).id();

    // Overlap reported against two colliders in the same pass.
    server
        .world_mut()
        .send_event(ProjectileContact { projectile: entity, other: wall });
    server
        .world_mut()
        .send_event(ProjectileContact { projectile: entity, other: wall });
    server.update();

    let feedback = drain_feedback(&mut server);
    assert_eq!(impact_count(&feedback), 1);
    let destroys: Vec<NetMessage> = server
        .world_mut()
        .resource_mut::<MessageOutbox>()
        .drain()
        .collect();
    assert_eq!(
        destroys,
        vec![NetMessage::ProjectileDestroy(ProjectileDestroyNotice {
            id: ProjectileId(7)
        })]
    );
}

#[test]
fn expiry_broadcasts_destroy_without_impact() {
    let mut server = server_app();
    server
        .world_mut()
        .spawn((
            Projectile {
                velocity: Vec3::X * PROJECTILE_SPEED,
                spawn_tick: 0,
                lifespan_ticks: 3,
                hit: false,
            },
            ProjectileId(11),
            Transform::default(),
        ));
    server.world_mut().resource_mut::<SimTick>().0 = 3;
    server.update();

    let mut projectiles = server.world_mut().query::<&Projectile>();
    assert_eq!(projectiles.iter(server.world()).count(), 0);
    // No hit means no impact cue on the authority, but the flight loop
    // started at spawn must stop; observers still learn about the teardown.
    let feedback = drain_feedback(&mut server);
    assert_eq!(impact_count(&feedback), 0);
    assert_eq!(
        feedback,
        vec![FeedbackEvent::LoopStopped {
            projectile: ProjectileId(11)
        }]
    );
    let sent: Vec<NetMessage> = server
        .world_mut()
        .resource_mut::<MessageOutbox>()
        .drain()
        .collect();
    assert_eq!(
        sent,
        vec![NetMessage::ProjectileDestroy(ProjectileDestroyNotice {
            id: ProjectileId(11)
        })]
    );
}

#[test]
fn store_forgets_a_key_once_its_activation_completes() {
    let mut server = server_app();
    let caster = server
        .world_mut()
        .spawn((PlayerId(2), LaunchSocket(Vec3::ZERO)))
        .id();
    let token = PredictionToken { issuer: 2, seq: 0 };
    activate(&mut server, caster, token);
    server.update();

    server
        .world_mut()
        .resource_mut::<MessageInbox>()
        .push(NetMessage::TargetData(TargetDataMessage {
            ability: ABILITY,
            token,
            sample: TargetSample {
                world_point: Vec3::new(6.0, 0.0, 0.0),
                source: PlayerId(2),
            },
        }));
    server.update();

    assert_eq!(drain_acquired(&mut server).len(), 1);
    // Sample, listener, and fired mark are all gone after the round-trip;
    // the store is bounded by in-flight activations.
    assert!(server.world().resource::<TargetDataStore>().is_empty());
}

#[test]
fn cancelled_activation_ignores_a_late_sample() {
    let mut server = server_app();
    let caster = server
        .world_mut()
        .spawn((PlayerId(3), LaunchSocket(Vec3::ZERO)))
        .id();
    let token = PredictionToken { issuer: 3, seq: 0 };
    let spell = activate(&mut server, caster, token);
    server.update();

    server.world_mut().send_event(CancelSpell { spell });
    server.update();
    // Cancellation released the key's store state along with the listener.
    assert!(server.world().resource::<TargetDataStore>().is_empty());

    let mut inbox = server.world_mut().resource_mut::<MessageInbox>();
    inbox.push(NetMessage::TargetData(TargetDataMessage {
        ability: ABILITY,
        token,
        sample: TargetSample {
            world_point: Vec3::X,
            source: PlayerId(3),
        },
    }));
    server.update();

    assert!(drain_acquired(&mut server).is_empty());
    let mut projectiles = server.world_mut().query::<&Projectile>();
    assert_eq!(projectiles.iter(server.world()).count(), 0);
}
