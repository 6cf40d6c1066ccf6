pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod raft_api;
pub mod replicator;
pub mod simulation;
pub mod types;

pub use api::create_router;
pub use config::{NodeConfig, PeerConfig};
pub use daemon::RaftDaemon;
pub use error::TransportError;
pub use raft_api::create_raft_router;
pub use replicator::{ConsistencyMode, RaftConfig, RaftNode, Replicator, Transport};
pub use simulation::{run_simulation, LocalCluster};
pub use types::*;
