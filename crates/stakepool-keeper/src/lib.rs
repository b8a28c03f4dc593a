pub mod config;
pub mod error;
pub mod events;
pub mod keeper;

pub use config::{create_example_config, KeeperConfig, ModuleConfig, RoleGrant};
pub use error::{KeeperError, KeeperResult};
pub use events::{parse_journal, PoolEvent};
pub use keeper::{Keeper, KeeperState, ReplaySummary};
