use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{ContractError, ContractStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MarketRole {
    Buyer,
    Seller,
    Admin,
}

impl MarketRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buyer" => Some(MarketRole::Buyer),
            "seller" => Some(MarketRole::Seller),
            "admin" => Some(MarketRole::Admin),
            _ => None,
        }
    }
}

/// Party role on a specific contract, derived from the user id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Landlord,
    Tenant,
}

impl PartyRole {
    pub fn counterparty(&self) -> PartyRole {
        match self {
            PartyRole::Landlord => PartyRole::Tenant,
            PartyRole::Tenant => PartyRole::Landlord,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub role: MarketRole,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, role: MarketRole) -> Self {
        Self {
            id: id.into(),
            role,
            name: None,
            email: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == MarketRole::Admin
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Approvals {
    #[serde(default)]
    pub landlord: Approval,
    #[serde(default)]
    pub tenant: Approval,
}

impl Approvals {
    pub fn for_role(&self, role: PartyRole) -> &Approval {
        match role {
            PartyRole::Landlord => &self.landlord,
            PartyRole::Tenant => &self.tenant,
        }
    }

    pub fn for_role_mut(&mut self, role: PartyRole) -> &mut Approval {
        match role {
            PartyRole::Landlord => &mut self.landlord,
            PartyRole::Tenant => &mut self.tenant,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signed_by: Option<String>,
    #[serde(default)]
    pub signature_image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signatures {
    #[serde(default)]
    pub landlord: Signature,
    #[serde(default)]
    pub tenant: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness: Option<Signature>,
}

impl Signatures {
    pub fn for_role(&self, role: PartyRole) -> &Signature {
        match role {
            PartyRole::Landlord => &self.landlord,
            PartyRole::Tenant => &self.tenant,
        }
    }

    pub fn for_role_mut(&mut self, role: PartyRole) -> &mut Signature {
        match role {
            PartyRole::Landlord => &mut self.landlord,
            PartyRole::Tenant => &mut self.tenant,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartyDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// A rental contract with its lifecycle collapsed to one canonical status.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub contract_id: String,
    pub status: ContractStatus,
    pub property_id: Option<String>,
    pub chat_id: Option<String>,
    pub landlord_id: String,
    pub tenant_id: String,
    pub created_by: Option<String>,
    pub approvals: Approvals,
    pub signatures: Signatures,
    pub monthly_rent: Option<Decimal>,
    pub security_deposit: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub terms: Option<String>,
    pub conditions: Option<String>,
    pub landlord_details: Option<PartyDetails>,
    pub tenant_details: Option<PartyDetails>,
    pub rejection_reason: Option<String>,
    pub documents: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Contract {
    pub fn new(
        contract_id: impl Into<String>,
        landlord_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            contract_id: contract_id.into(),
            status: ContractStatus::Draft,
            property_id: None,
            chat_id: None,
            landlord_id: landlord_id.into(),
            tenant_id: tenant_id.into(),
            created_by: None,
            approvals: Approvals::default(),
            signatures: Signatures::default(),
            monthly_rent: None,
            security_deposit: None,
            start_date: None,
            end_date: None,
            terms: None,
            conditions: None,
            landlord_details: None,
            tenant_details: None,
            rejection_reason: None,
            documents: Vec::new(),
            updated_at: None,
        }
    }

    /// Decodes one backend contract document.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ContractError> {
        let record: ContractRecord = serde_json::from_value(value)?;
        Contract::try_from(record)
    }
}

/// User references arrive either as a bare id or as a populated document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum UserRef {
    Id(String),
    Populated {
        #[serde(alias = "_id")]
        id: String,
    },
}

impl UserRef {
    fn into_id(self) -> String {
        match self {
            UserRef::Id(id) | UserRef::Populated { id } => id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StatusHistory {
    #[serde(default)]
    current: Option<String>,
}

/// Raw contract document as the REST backend returns it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    #[serde(default)]
    contract_id: Option<String>,
    #[serde(default, rename = "_id")]
    document_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_status: Option<StatusHistory>,
    #[serde(default, alias = "property")]
    property_id: Option<UserRef>,
    #[serde(default, alias = "chat")]
    chat_id: Option<UserRef>,
    #[serde(alias = "landlord")]
    landlord_id: UserRef,
    #[serde(alias = "tenant")]
    tenant_id: UserRef,
    #[serde(default, alias = "sender")]
    created_by: Option<UserRef>,
    #[serde(default)]
    approvals: Approvals,
    #[serde(default)]
    signatures: Signatures,
    #[serde(default)]
    monthly_rent: Option<Decimal>,
    #[serde(default)]
    security_deposit: Option<Decimal>,
    #[serde(default, deserialize_with = "flexible_date")]
    start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "flexible_date")]
    end_date: Option<NaiveDate>,
    #[serde(default)]
    terms: Option<String>,
    #[serde(default)]
    conditions: Option<String>,
    #[serde(default)]
    landlord_details: Option<PartyDetails>,
    #[serde(default)]
    tenant_details: Option<PartyDetails>,
    #[serde(default)]
    rejection_reason: Option<String>,
    #[serde(default)]
    documents: Vec<DocumentRef>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DocumentRef {
    Name(String),
    File {
        #[serde(default, alias = "fileName", alias = "name")]
        url: Option<String>,
    },
}

impl TryFrom<ContractRecord> for Contract {
    type Error = ContractError;

    fn try_from(record: ContractRecord) -> Result<Self, Self::Error> {
        let contract_id = [record.contract_id, record.document_id, record.id]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
            .ok_or(ContractError::MissingId)?;
        let status = ContractStatus::resolve(
            record.status.as_deref(),
            record
                .contract_status
                .as_ref()
                .and_then(|history| history.current.as_deref()),
        )?;

        Ok(Contract {
            contract_id,
            status,
            property_id: record.property_id.map(UserRef::into_id),
            chat_id: record.chat_id.map(UserRef::into_id),
            landlord_id: record.landlord_id.into_id(),
            tenant_id: record.tenant_id.into_id(),
            created_by: record.created_by.map(UserRef::into_id),
            approvals: record.approvals,
            signatures: record.signatures,
            monthly_rent: record.monthly_rent,
            security_deposit: record.security_deposit,
            start_date: record.start_date,
            end_date: record.end_date,
            terms: record.terms,
            conditions: record.conditions,
            landlord_details: record.landlord_details,
            tenant_details: record.tenant_details,
            rejection_reason: record.rejection_reason,
            documents: record
                .documents
                .into_iter()
                .filter_map(|document| match document {
                    DocumentRef::Name(name) => Some(name),
                    DocumentRef::File { url } => url,
                })
                .collect(),
            updated_at: record.updated_at,
        })
    }
}

/// Accepts `2024-05-01` as well as full RFC 3339 timestamps.
fn flexible_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.map(|value| value.trim().to_string()) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(timestamp.with_timezone(&Utc).date_naive()));
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Landlord-authored contract terms used for both create and edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractDraft {
    #[serde(default)]
    pub property_id: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub landlord_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub monthly_rent: Decimal,
    #[serde(default)]
    pub security_deposit: Decimal,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub terms: String,
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub landlord_details: PartyDetails,
    #[serde(default)]
    pub tenant_details: PartyDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    #[serde(alias = "_id")]
    pub chat_id: String,
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "_id")]
    pub message_id: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(alias = "sender")]
    pub sender_id: String,
    #[serde(alias = "message")]
    pub content: String,
    #[serde(default, alias = "createdAt")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "isViewed")]
    pub viewed: bool,
}
