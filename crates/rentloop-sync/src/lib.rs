pub mod board;
pub mod desk;
pub mod memory;
pub mod refresh;

pub use board::{Applied, ContractBoard, Scope, Ticket};
pub use desk::{ContractDesk, ContractView, DeskError};
pub use memory::{InMemoryBackend, InMemoryContractGateway};
pub use refresh::{DEFAULT_POLL_INTERVAL, RefreshSettings, run_refresh_loop, scopes_for_event};
