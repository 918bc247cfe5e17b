use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Lifecycle of a rental contract.
///
/// The backend exposes the lifecycle twice (`status` and
/// `contractStatus.current`); records are collapsed into this single enum on
/// ingestion by [`ContractStatus::resolve`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    PendingApproval,
    PendingLandlordSignature,
    PendingTenantSignature,
    Approved,
    FullySigned,
    Active,
    Completed,
    Rejected,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 9] = [
        ContractStatus::Draft,
        ContractStatus::PendingApproval,
        ContractStatus::PendingLandlordSignature,
        ContractStatus::PendingTenantSignature,
        ContractStatus::Approved,
        ContractStatus::FullySigned,
        ContractStatus::Active,
        ContractStatus::Completed,
        ContractStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::PendingApproval => "pending_approval",
            ContractStatus::PendingLandlordSignature => "pending_landlord_signature",
            ContractStatus::PendingTenantSignature => "pending_tenant_signature",
            ContractStatus::Approved => "approved",
            ContractStatus::FullySigned => "fully_signed",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Rejected => "rejected",
        }
    }

    /// Approved or any later stage. Approval actions are closed from here on.
    pub fn is_past_approval(&self) -> bool {
        matches!(
            self,
            ContractStatus::Approved
                | ContractStatus::FullySigned
                | ContractStatus::Active
                | ContractStatus::Completed
        )
    }

    /// Statuses only reachable once both parties approved.
    pub fn implies_both_approved(&self) -> bool {
        matches!(
            self,
            ContractStatus::Approved
                | ContractStatus::PendingLandlordSignature
                | ContractStatus::PendingTenantSignature
        )
    }

    /// Statuses that already imply both signatures are in place.
    pub fn implies_fully_signed(&self) -> bool {
        matches!(
            self,
            ContractStatus::FullySigned | ContractStatus::Active | ContractStatus::Completed
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == ContractStatus::Rejected || self.implies_fully_signed()
    }

    /// Collapses the two backend status fields. `contractStatus.current` wins
    /// when present and non-blank; the legacy `status` is the fallback and a
    /// record carrying neither is a draft.
    pub fn resolve(legacy: Option<&str>, current: Option<&str>) -> Result<Self, ContractError> {
        match non_blank(current).or_else(|| non_blank(legacy)) {
            Some(raw) => raw.parse(),
            None => Ok(ContractStatus::Draft),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl FromStr for ContractStatus {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "draft" => Ok(ContractStatus::Draft),
            "pending" | "pending_approval" => Ok(ContractStatus::PendingApproval),
            "pending_landlord_signature" => Ok(ContractStatus::PendingLandlordSignature),
            "pending_tenant_signature" => Ok(ContractStatus::PendingTenantSignature),
            "approved" => Ok(ContractStatus::Approved),
            "fully_signed" => Ok(ContractStatus::FullySigned),
            "active" => Ok(ContractStatus::Active),
            "completed" => Ok(ContractStatus::Completed),
            "rejected" => Ok(ContractStatus::Rejected),
            _ => Err(ContractError::UnknownStatus(value.to_string())),
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
