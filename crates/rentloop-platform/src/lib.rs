pub mod api;
pub mod config;
pub mod contracts;
pub mod redis_bus;

pub use api::{ApiError, HttpApi};
pub use config::ServiceConfig;
pub use contracts::{
    InitiateChatRequest, RejectContractRequest, SaveSignatureRequest, SendMessageRequest,
    UnreadCountResponse, decode_contract, decode_contract_list, unwrap_envelope,
};
pub use redis_bus::{RealtimeRelay, RedisBus};
