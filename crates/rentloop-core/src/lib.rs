pub mod error;
pub mod evaluator;
pub mod events;
pub mod gateway;
pub mod models;
pub mod status;
pub mod validation;

pub use error::{ContractError, FieldErrors, SignatureError};
pub use evaluator::{BadgeTone, Permissions, StatusBadge};
pub use events::{OutboundEvent, RealtimeEvent, RealtimeEventKind};
pub use gateway::{ContractGateway, SignatureVault};
pub use models::{
    Approval, Approvals, ChatMessage, ChatSummary, Contract, ContractDraft, ContractRecord,
    MarketRole, PartyDetails, PartyRole, Signature, Signatures, User,
};
pub use status::ContractStatus;
pub use validation::{SignatureInput, SignatureSubmission, validate_message};
