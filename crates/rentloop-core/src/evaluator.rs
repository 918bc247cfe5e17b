//! Who may do what to a contract, and how its status reads.
//!
//! Everything here is a pure function of a contract snapshot and the viewing
//! user. Views and the desk both go through these functions so the rules live
//! in exactly one place.

use serde::{Deserialize, Serialize};

use crate::{Contract, ContractStatus, PartyRole, User};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permissions {
    pub approve: bool,
    pub reject: bool,
    pub sign: bool,
    pub delete: bool,
    pub download: bool,
    pub edit: bool,
    pub remind: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTone {
    Danger,
    Success,
    Info,
    Warning,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatusBadge {
    pub label: &'static str,
    pub tone: BadgeTone,
}

const REJECTED: StatusBadge = StatusBadge {
    label: "Rejected",
    tone: BadgeTone::Danger,
};
const FULLY_SIGNED: StatusBadge = StatusBadge {
    label: "Fully Signed",
    tone: BadgeTone::Success,
};
const AWAITING_SIGNATURES: StatusBadge = StatusBadge {
    label: "Awaiting Signatures",
    tone: BadgeTone::Info,
};
const PARTIALLY_APPROVED: StatusBadge = StatusBadge {
    label: "Partially Approved",
    tone: BadgeTone::Warning,
};
const PENDING_APPROVAL: StatusBadge = StatusBadge {
    label: "Pending Approval",
    tone: BadgeTone::Neutral,
};

pub fn party_role(contract: &Contract, user: &User) -> Option<PartyRole> {
    if user.id == contract.landlord_id {
        Some(PartyRole::Landlord)
    } else if user.id == contract.tenant_id {
        Some(PartyRole::Tenant)
    } else {
        None
    }
}

pub fn both_approved(contract: &Contract) -> bool {
    contract.approvals.landlord.approved && contract.approvals.tenant.approved
}

pub fn both_signed(contract: &Contract) -> bool {
    contract.signatures.landlord.signed && contract.signatures.tenant.signed
}

pub fn is_fully_signed(contract: &Contract) -> bool {
    both_signed(contract) || contract.status.implies_fully_signed()
}

fn approval_open(contract: &Contract, user: &User) -> bool {
    if contract.status == ContractStatus::Rejected || contract.status.is_past_approval() {
        return false;
    }
    party_role(contract, user)
        .is_some_and(|role| !contract.approvals.for_role(role).approved)
}

pub fn can_approve(contract: &Contract, user: &User) -> bool {
    approval_open(contract, user)
}

/// Reject shares the approve precondition; whichever lands first wins.
pub fn can_reject(contract: &Contract, user: &User) -> bool {
    approval_open(contract, user)
}

pub fn can_sign(contract: &Contract, user: &User) -> bool {
    if !both_approved(contract) {
        return false;
    }
    let Some(role) = party_role(contract, user) else {
        return false;
    };
    if contract.signatures.for_role(role).signed {
        return false;
    }

    match contract.status {
        ContractStatus::PendingLandlordSignature | ContractStatus::Draft => {
            role == PartyRole::Landlord
        }
        ContractStatus::PendingTenantSignature => role == PartyRole::Tenant,
        // no turn information on these, any unsigned party may go
        ContractStatus::PendingApproval | ContractStatus::Approved => true,
        ContractStatus::FullySigned
        | ContractStatus::Active
        | ContractStatus::Completed
        | ContractStatus::Rejected => false,
    }
}

/// Landlord, sender or admin, whatever the status.
pub fn can_delete(contract: &Contract, user: &User) -> bool {
    user.is_admin()
        || user.id == contract.landlord_id
        || contract.created_by.as_deref() == Some(user.id.as_str())
}

pub fn can_download(contract: &Contract, user: &User) -> bool {
    contract.status != ContractStatus::Rejected
        && (user.is_admin() || party_role(contract, user).is_some())
}

pub fn can_edit(contract: &Contract, user: &User) -> bool {
    let untouched = !contract.approvals.landlord.approved
        && !contract.approvals.tenant.approved
        && !contract.signatures.landlord.signed
        && !contract.signatures.tenant.signed;

    untouched
        && matches!(
            contract.status,
            ContractStatus::Draft | ContractStatus::PendingApproval
        )
        && (user.is_admin() || party_role(contract, user) == Some(PartyRole::Landlord))
}

pub fn can_remind(contract: &Contract, user: &User) -> bool {
    if contract.status == ContractStatus::Rejected || is_fully_signed(contract) {
        return false;
    }
    if !both_approved(contract) {
        return false;
    }
    party_role(contract, user)
        .is_some_and(|role| !contract.signatures.for_role(role.counterparty()).signed)
}

pub fn permissions(contract: &Contract, user: &User) -> Permissions {
    Permissions {
        approve: can_approve(contract, user),
        reject: can_reject(contract, user),
        sign: can_sign(contract, user),
        delete: can_delete(contract, user),
        download: can_download(contract, user),
        edit: can_edit(contract, user),
        remind: can_remind(contract, user),
    }
}

/// First matching rule wins; the order is part of the contract.
pub fn badge(contract: &Contract) -> StatusBadge {
    let approvals = &contract.approvals;

    if contract.status == ContractStatus::Rejected {
        REJECTED
    } else if is_fully_signed(contract) {
        FULLY_SIGNED
    } else if both_approved(contract) || contract.status.implies_both_approved() {
        AWAITING_SIGNATURES
    } else if approvals.landlord.approved || approvals.tenant.approved {
        PARTIALLY_APPROVED
    } else {
        PENDING_APPROVAL
    }
}
