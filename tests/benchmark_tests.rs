//! Performance benchmarks for the hot paths of the world loop

use server::broadcast;
use server::pvp::{EligibilityRules, LevelScaled, PvpEngine};
use server::registry::Registry;
use server::session::{ConnectionHandle, ConnectionId, Session, Vitals};
use shared::{encode_frame, IdentityId, Packet, Position};
use std::time::Instant;
use tokio::sync::mpsc;

fn populate(
    registry: &mut Registry,
    count: u64,
    max_hp: u32,
) -> Vec<mpsc::UnboundedReceiver<Packet>> {
    let mut receivers = Vec::with_capacity(count as usize);
    for connection_id in 1..=count {
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .insert(Session::new(
                connection_id,
                connection_id as IdentityId,
                format!("player{}", connection_id),
                Position::new(30 + (connection_id % 50) as i32, 30),
                Vitals::new(1, max_hp, max_hp),
                ConnectionHandle::new(tx),
            ))
            .unwrap();
        receivers.push(rx);
    }
    receivers
}

/// Benchmarks session insert and removal
#[test]
fn benchmark_registry_churn() {
    let iterations = 10_000;
    let start = Instant::now();

    let mut registry = Registry::new();
    let _receivers = populate(&mut registry, iterations, 100);
    for connection_id in 1..=iterations {
        registry.remove(connection_id);
    }

    let duration = start.elapsed();
    println!(
        "Registry churn: {} sessions in {:?} ({:.2} μs/session)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(registry.is_empty());
    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks position updates, the most frequent event
#[test]
fn benchmark_position_updates() {
    let mut registry = Registry::new();
    let _receivers = populate(&mut registry, 100, 100);

    let iterations = 100_000u64;
    let start = Instant::now();

    for i in 0..iterations {
        let connection_id: ConnectionId = i % 100 + 1;
        registry.update(connection_id, |session| {
            session.position = Position::new(i as i32 % 64, 7)
        });
    }

    let duration = start.elapsed();
    println!(
        "Position updates: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks fan-out of one event to a crowded world
#[test]
fn benchmark_broadcast_fanout() {
    let mut registry = Registry::new();
    let mut receivers = populate(&mut registry, 500, 100);

    let iterations = 200;
    let start = Instant::now();

    for i in 0..iterations {
        broadcast::broadcast_move(&registry, 1, Position::new(i, i));
    }

    let duration = start.elapsed();
    println!(
        "Broadcast fan-out: {} events to 499 sessions in {:?}",
        iterations, duration
    );

    let mut received = 0;
    while receivers[1].try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, iterations);
    assert!(receivers[0].try_recv().is_err());
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the join snapshot for a late joiner
#[test]
fn benchmark_snapshot() {
    let mut registry = Registry::new();
    let _receivers = populate(&mut registry, 1_000, 100);

    let iterations = 100;
    let start = Instant::now();

    for _ in 0..iterations {
        let others = registry.list_all_except(1);
        assert_eq!(others.len(), 999);
    }

    let duration = start.elapsed();
    println!(
        "Snapshot of 999 players: {} iterations in {:?}",
        iterations, duration
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks PvP resolution including damage broadcasts
#[test]
fn benchmark_pvp_resolution() {
    let mut registry = Registry::new();
    let _receivers = populate(&mut registry, 20, 1_000_000);
    let mut pvp = PvpEngine::new(Box::new(LevelScaled::default()), EligibilityRules::permissive());

    let iterations = 20_000u64;
    let now = Instant::now();
    let start = Instant::now();

    for i in 0..iterations {
        let attacker = i % 20 + 1;
        let target = ((i + 1) % 20 + 1) as IdentityId;
        pvp.resolve_attack(&mut registry, attacker, target, 10, now);
    }

    let duration = start.elapsed();
    println!(
        "PvP resolution: {} attacks in {:?} ({:.2} μs/attack)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 3000);
}

/// Benchmarks frame encoding of a full snapshot
#[test]
fn benchmark_snapshot_encoding() {
    let mut registry = Registry::new();
    let _receivers = populate(&mut registry, 200, 100);
    let players = registry.list_all_except(0).into_iter().map(Session::view).collect();
    let packet = Packet::PlayersList { players };

    let iterations = 1_000;
    let start = Instant::now();

    let mut bytes = 0;
    for _ in 0..iterations {
        bytes = encode_frame(&packet).unwrap().len();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot encoding: {} bytes x {} in {:?}",
        bytes, iterations, duration
    );

    assert!(bytes > 0);
    assert!(duration.as_millis() < 2000);
}
