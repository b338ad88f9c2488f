//! A small particle simulation driving the world API end to end:
//! spawning, queries, in-place updates, component removal, and despawn.

use archon_engine::{Entity, World};

#[derive(Clone, Copy, Debug)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Clone, Copy, Debug)]
struct Lifetime(u32);

const PARTICLES: usize = 1_000;
const STEPS: u32 = 60;

fn main() {
    let mut world = World::new();

    // Emit a burst of particles. Every other particle decays.
    for i in 0..PARTICLES {
        let angle = (i as f32) * 0.137;
        let e = world.entity();
        world
            .set(e, Position { x: 0.0, y: 0.0 })
            .set(e, Velocity { dx: angle.cos(), dy: angle.sin() });
        if i % 2 == 0 {
            world.set(e, Lifetime(30 + (i as u32 % 30)));
        }
    }

    println!("spawned {} particles", world.len());

    for step in 0..STEPS {
        // Integrate positions.
        let moved: Vec<(Entity, Position)> = world
            .query::<(Position, Velocity)>()
            .into_iter()
            .map(|(entity, position, velocity)| {
                (
                    entity,
                    Position {
                        x: position.x + velocity.dx,
                        y: position.y + velocity.dy,
                    },
                )
            })
            .collect();
        for (entity, position) in moved {
            world.set(entity, position);
        }

        // Tick lifetimes and despawn expired particles.
        let expired: Vec<Entity> = world
            .query::<(Lifetime,)>()
            .into_iter()
            .filter_map(|(entity, lifetime)| (lifetime.0 <= 1).then_some(entity))
            .collect();
        let ticking: Vec<(Entity, u32)> = world
            .query::<(Lifetime,)>()
            .into_iter()
            .map(|(entity, lifetime)| (entity, lifetime.0))
            .collect();
        for (entity, remaining) in ticking {
            world.set(entity, Lifetime(remaining.saturating_sub(1)));
        }
        for entity in expired {
            world.despawn(entity);
        }

        if step % 15 == 0 {
            println!(
                "step {step:2}: {} alive, {} decaying",
                world.len(),
                world.query::<(Lifetime,)>().len()
            );
        }
    }

    // Freeze the survivors: drop their velocities.
    let survivors: Vec<Entity> = world
        .query::<(Position, Velocity)>()
        .into_iter()
        .map(|(entity, ..)| entity)
        .collect();
    for entity in &survivors {
        world.remove::<Velocity>(*entity);
    }

    println!(
        "done: {} particles left, {} still moving",
        world.len(),
        world.query::<(Position, Velocity)>().len()
    );
}
