use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RealtimeEventKind {
    ReceiveMessage,
    MessagesViewed,
    ContractCreated,
    ContractUpdated,
    ContractSigned,
    ContractApproved,
    ContractRejected,
    ContractStatusUpdated,
    SignatureReminder,
}

impl RealtimeEventKind {
    /// Maps a bus event name; the backend emits several spellings of the
    /// same update.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "receive_message" => Some(RealtimeEventKind::ReceiveMessage),
            "messages_viewed" => Some(RealtimeEventKind::MessagesViewed),
            "contractCreated" => Some(RealtimeEventKind::ContractCreated),
            "contractUpdated" | "contract_updated" | "contractUpdate" => {
                Some(RealtimeEventKind::ContractUpdated)
            }
            "contractSigned" => Some(RealtimeEventKind::ContractSigned),
            "contractApproved" => Some(RealtimeEventKind::ContractApproved),
            "contractRejected" => Some(RealtimeEventKind::ContractRejected),
            "contractStatusUpdated" => Some(RealtimeEventKind::ContractStatusUpdated),
            "signatureReminder" => Some(RealtimeEventKind::SignatureReminder),
            _ => None,
        }
    }

    /// Events after which contract views must be refetched.
    pub fn refreshes_contracts(&self) -> bool {
        matches!(
            self,
            RealtimeEventKind::ContractCreated
                | RealtimeEventKind::ContractUpdated
                | RealtimeEventKind::ContractSigned
                | RealtimeEventKind::ContractApproved
                | RealtimeEventKind::ContractRejected
                | RealtimeEventKind::ContractStatusUpdated
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
    pub kind: RealtimeEventKind,
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct RealtimeFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl RealtimeEvent {
    /// Parses a relay frame `{"event": .., "data": ..}`. Unknown events and
    /// malformed frames yield `None`.
    pub fn from_frame(raw: &str) -> Option<Self> {
        let frame: RealtimeFrame = serde_json::from_str(raw).ok()?;
        let kind = RealtimeEventKind::from_wire(&frame.event)?;
        Some(Self {
            kind,
            payload: frame.data,
        })
    }

    pub fn contract_id(&self) -> Option<&str> {
        self.lookup(&["contractId", "_id"], "contract")
    }

    pub fn property_id(&self) -> Option<&str> {
        self.lookup(&["propertyId"], "property")
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.lookup(&["chatId"], "chat")
    }

    fn lookup(&self, keys: &[&str], nested: &str) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.payload.get(*key).and_then(Value::as_str))
            .or_else(|| {
                let inner = self.payload.get(nested)?;
                inner
                    .as_str()
                    .or_else(|| inner.get("_id").and_then(Value::as_str))
                    .or_else(|| keys.iter().find_map(|key| inner.get(*key).and_then(Value::as_str)))
            })
    }
}

/// Frames the desk emits towards the bus.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "register")]
    Register {
        #[serde(rename = "userId")]
        user_id: String,
    },
    #[serde(rename = "join_chat")]
    JoinChat {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
}
