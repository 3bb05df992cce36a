use std::{env, path::PathBuf, time::Duration};
use voxels::LodTable;

/// Configuration for the voxel server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port the UDP socket binds to (e.g. `0.0.0.0:40106`).
    pub bind_address: String,
    /// Voxel packets each peer may receive per second.
    pub packets_per_second: u32,
    /// Period of the send loop.
    pub send_interval: Duration,
    /// Base distance of the geometric LOD table; `None` uses the default table.
    pub lod_base_distance: Option<f32>,
    /// Viewer movement (unit-cube lengths) that restarts a peer's pass.
    pub view_reset_distance: f32,
    /// Peers silent for this long are dropped.
    pub peer_timeout: Duration,
    /// Voxel record file loaded at startup and saved on shutdown.
    pub tree_file: Option<PathBuf>,
    /// Re-average ancestor colors after every edit.
    pub reaverage_on_edit: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:40106".to_string(),
            packets_per_second: 200,
            send_interval: Duration::from_millis(50),
            lod_base_distance: None,
            view_reset_distance: 0.01,
            peer_timeout: Duration::from_secs(10),
            tree_file: None,
            reaverage_on_edit: false,
        }
    }
}

impl ServerConfig {
    /// Builds a configuration from environment variables while falling back to
    /// the defaults for anything unset or unparsable.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_address = lookup("VOXEL_BIND").unwrap_or(defaults.bind_address);
        let packets_per_second = lookup("VOXEL_PACKETS_PER_SECOND")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.packets_per_second);
        let send_interval = lookup("VOXEL_SEND_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.send_interval);
        let lod_base_distance: Option<f32> = lookup("VOXEL_LOD_BASE_DISTANCE").and_then(|v| v.parse().ok());
        let view_reset_distance = lookup("VOXEL_VIEW_RESET_DISTANCE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.view_reset_distance);
        let peer_timeout = lookup("VOXEL_PEER_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.peer_timeout);
        let tree_file = lookup("VOXEL_TREE_FILE").map(PathBuf::from);
        let reaverage_on_edit = lookup("VOXEL_REAVERAGE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.reaverage_on_edit);

        anyhow::ensure!(packets_per_second >= 1, "packets per second must be >= 1");
        anyhow::ensure!(!send_interval.is_zero(), "send interval must be non-zero");
        anyhow::ensure!(
            view_reset_distance.is_finite() && view_reset_distance >= 0.0,
            "view reset distance must be a non-negative number"
        );
        if let Some(distance) = lod_base_distance {
            anyhow::ensure!(
                distance.is_finite() && distance > 0.0,
                "LOD base distance must be positive"
            );
        }

        Ok(Self {
            bind_address,
            packets_per_second,
            send_interval,
            lod_base_distance,
            view_reset_distance,
            peer_timeout,
            tree_file,
            reaverage_on_edit,
        })
    }

    /// Packet budget per peer for one tick of the send loop.
    pub fn packets_per_interval(&self) -> usize {
        let per_interval = f64::from(self.packets_per_second) * self.send_interval.as_secs_f64();
        (per_interval.ceil() as usize).max(1)
    }

    pub fn lod_table(&self) -> LodTable {
        self.lod_base_distance
            .map(LodTable::geometric)
            .unwrap_or_default()
    }
}
