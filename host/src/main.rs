use clap::Parser;
use host::host::NetworkingHost;
use host::net::HostServer;
use log::{error, info};
use shared::entity::EntityId;
use shared::error::NetError;
use shared::game::{self, AvatarComponent, WorldComponent};
use shared::prefab::PrefabRegistry;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (snapshots per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum number of players
    #[arg(short, long, default_value = "8")]
    max_players: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut registry = PrefabRegistry::new();
    game::register_prefabs(&mut registry);

    let address = format!("{}:{}", args.host, args.port);
    let tick = Duration::from_secs_f32(1.0 / args.tick_rate as f32);
    let server = HostServer::bind(&address, tick).await?;

    let mut host = NetworkingHost::new(registry, Box::new(server.transport()), args.max_players);
    let world = host.instantiate("world")?;

    // Join/leave delegates feed these queues; the gameplay closure
    // drains them at the top of each tick.
    let joined: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
    let left: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
    {
        let joined = Rc::clone(&joined);
        host.player_added
            .subscribe(move |id| joined.borrow_mut().push(*id));
        let left = Rc::clone(&left);
        host.player_removed
            .subscribe(move |id| left.borrow_mut().push(*id));
    }

    let mut avatars: HashMap<u32, EntityId> = HashMap::new();

    info!("hosting on {} (max {} players)", address, args.max_players);

    server
        .run(host, move |host| {
            for player_id in left.borrow_mut().drain(..) {
                if let Some(id) = avatars.remove(&player_id) {
                    host.destroy(&id);
                }
            }
            for player_id in joined.borrow_mut().drain(..) {
                match spawn_avatar(host, player_id, &world) {
                    Ok(id) => {
                        avatars.insert(player_id, id);
                    }
                    Err(e) => error!("failed to spawn avatar for player {}: {}", player_id, e),
                }
            }

            let bounds = world_bounds(host, &world);
            for player_id in host.player_ids() {
                let input = match host.player(player_id) {
                    Some(player) => player.input.clone(),
                    None => continue,
                };
                let Some(avatar_id) = avatars.get(&player_id) else {
                    continue;
                };
                if let Some(avatar) = host
                    .base_mut()
                    .entity_mut(avatar_id)
                    .and_then(|e| e.component_mut::<AvatarComponent>())
                {
                    game::apply_movement(avatar, &input, bounds);
                }
            }
        })
        .await
}

fn spawn_avatar(
    host: &mut NetworkingHost,
    player_id: u32,
    world: &EntityId,
) -> Result<EntityId, NetError> {
    let id = host.instantiate("player")?;
    if let Some(avatar) = host
        .base_mut()
        .entity_mut(&id)
        .and_then(|e| e.component_mut::<AvatarComponent>())
    {
        avatar.owner = player_id;
        avatar.world = Some(world.clone());
        avatar.x = (40.0 * player_id as f32) % game::WORLD_WIDTH;
        avatar.y = game::WORLD_HEIGHT / 2.0;
    }
    info!("spawned avatar {} for player {}", id, player_id);
    Ok(id)
}

fn world_bounds(host: &NetworkingHost, world: &EntityId) -> (f32, f32) {
    host.base()
        .entity(world)
        .and_then(|e| e.component::<WorldComponent>())
        .map(|w| (w.width, w.height))
        .unwrap_or((game::WORLD_WIDTH, game::WORLD_HEIGHT))
}
