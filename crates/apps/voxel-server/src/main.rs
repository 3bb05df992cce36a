use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxel_server::{ServerConfig, UdpTransport, VoxelServer, WorldState};

/// Largest UDP payload.
const MAX_DATAGRAM_SIZE: usize = 65_507;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("Loaded config: {:?}", config);

    let world = WorldState::load_or_default(&config)?;
    tracing::info!("World tree has {} nodes", world.read().node_count());

    let transport = Arc::new(UdpTransport::bind(&config.bind_address).await?);
    tracing::info!("Voxel server listening on {}", transport.local_addr()?);

    let server = VoxelServer::new(config, world);
    tokio::spawn(server.clone().run_sender(transport.clone()));

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            received = transport.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!("Receive failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = server.handle_packet(peer, &buf[..len]) {
                    tracing::warn!("Rejected datagram from {}: {}", peer, e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    server.world().save()?;
    Ok(())
}
