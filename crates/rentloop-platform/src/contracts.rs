use rentloop_core::{ChatMessage, ChatSummary, Contract};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectContractRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSignatureRequest {
    pub signature_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateChatRequest {
    pub property_id: String,
    pub receiver_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    #[serde(alias = "unreadCount", alias = "count")]
    pub unread: u64,
}

/// Strips the `{contract: ..}` / `{data: ..}` style wrappers the backend
/// puts around payloads. Only object and array members count as wrapped
/// payloads.
pub fn unwrap_envelope(value: Value, keys: &[&str]) -> Value {
    let mut current = value;
    loop {
        let next = match &current {
            Value::Object(map) => keys
                .iter()
                .chain(["data"].iter())
                .find_map(|key| {
                    map.get(*key)
                        .filter(|inner| inner.is_object() || inner.is_array())
                })
                .cloned(),
            _ => None,
        };
        match next {
            Some(inner) => current = inner,
            None => return current,
        }
    }
}

pub fn decode_contract(value: Value) -> anyhow::Result<Contract> {
    let payload = unwrap_envelope(value, &["contract"]);
    Ok(Contract::from_json(payload)?)
}

/// Decodes a contract list; records that fail to decode are logged and
/// skipped so one bad document does not blank the whole view.
pub fn decode_contract_list(value: Value) -> anyhow::Result<Vec<Contract>> {
    let payload = unwrap_envelope(value, &["contracts"]);
    let Value::Array(items) = payload else {
        anyhow::bail!("expected a list of contracts");
    };

    let mut contracts = Vec::with_capacity(items.len());
    for item in items {
        match Contract::from_json(item) {
            Ok(contract) => contracts.push(contract),
            Err(err) => warn!("skipping contract record: {err}"),
        }
    }
    Ok(contracts)
}

pub fn decode_chats(value: Value) -> anyhow::Result<Vec<ChatSummary>> {
    let payload = unwrap_envelope(value, &["chats"]);
    Ok(serde_json::from_value(payload)?)
}

pub fn decode_chat(value: Value) -> anyhow::Result<ChatSummary> {
    let payload = unwrap_envelope(value, &["chat"]);
    Ok(serde_json::from_value(payload)?)
}

pub fn decode_messages(value: Value) -> anyhow::Result<Vec<ChatMessage>> {
    let payload = unwrap_envelope(value, &["messages"]);
    Ok(serde_json::from_value(payload)?)
}

pub fn decode_message(value: Value) -> anyhow::Result<ChatMessage> {
    let payload = unwrap_envelope(value, &["message"]);
    Ok(serde_json::from_value(payload)?)
}

pub fn decode_signature(value: Value) -> Option<String> {
    let payload = unwrap_envelope(value, &[]);
    let image = match &payload {
        Value::String(image) => Some(image.as_str()),
        Value::Object(map) => match map.get("signature") {
            Some(Value::String(image)) => Some(image.as_str()),
            Some(Value::Object(inner)) => inner.get("signatureImage").and_then(Value::as_str),
            _ => map.get("signatureImage").and_then(Value::as_str),
        },
        _ => None,
    };
    image
        .filter(|image| !image.trim().is_empty())
        .map(str::to_string)
}
