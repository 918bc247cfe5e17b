use std::sync::Arc;

use rentloop_core::{
    Contract, ContractDraft, ContractGateway, FieldErrors, PartyRole, Permissions,
    SignatureError, SignatureInput, StatusBadge, User, evaluator,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::board::{Applied, ContractBoard, Scope};

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("{action} is not permitted on contract {contract_id}")]
    NotPermitted {
        action: &'static str,
        contract_id: String,
    },
    #[error("invalid contract: {0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("contract {0} is no longer available")]
    Gone(String),
    #[error("backend request failed: {0:#}")]
    Gateway(#[source] anyhow::Error),
}

/// A contract as one user sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    pub contract: Contract,
    pub party_role: Option<PartyRole>,
    pub badge: StatusBadge,
    pub permissions: Permissions,
}

impl ContractView {
    pub fn build(contract: Contract, user: &User) -> Self {
        Self {
            party_role: evaluator::party_role(&contract, user),
            badge: evaluator::badge(&contract),
            permissions: evaluator::permissions(&contract, user),
            contract,
        }
    }
}

/// One user's contract workspace: every action is checked against the
/// evaluator before it reaches the gateway.
pub struct ContractDesk {
    user: User,
    gateway: Arc<dyn ContractGateway>,
    board: Arc<ContractBoard>,
}

impl ContractDesk {
    pub fn new(user: User, gateway: Arc<dyn ContractGateway>, board: Arc<ContractBoard>) -> Self {
        Self {
            user,
            gateway,
            board,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn board(&self) -> &Arc<ContractBoard> {
        &self.board
    }

    pub async fn refresh(&self, scope: Scope) -> Result<Applied, DeskError> {
        let ticket = self.board.begin(scope.clone()).await;
        let snapshot = match &scope {
            Scope::Mine => self.gateway.my_contracts().await,
            Scope::Property(property_id) => self.gateway.property_contracts(property_id).await,
        }
        .map_err(DeskError::Gateway)?;

        let applied = self.board.apply(ticket, snapshot).await;
        if applied == Applied::Stale {
            info!("refresh of {scope:?} superseded by a newer request");
        }
        Ok(applied)
    }

    pub async fn views(&self, scope: Scope) -> Result<Vec<ContractView>, DeskError> {
        if !self.board.is_loaded(&scope).await {
            self.refresh(scope.clone()).await?;
        }
        Ok(self
            .board
            .list(&scope)
            .await
            .into_iter()
            .map(|contract| ContractView::build(contract, &self.user))
            .collect())
    }

    pub async fn view(&self, contract_id: &str) -> Result<ContractView, DeskError> {
        let contract = self.snapshot(contract_id).await?;
        Ok(ContractView::build(contract, &self.user))
    }

    pub async fn create(&self, draft: ContractDraft) -> Result<ContractView, DeskError> {
        draft.validate().map_err(DeskError::Invalid)?;
        if draft.landlord_id != self.user.id && !self.user.is_admin() {
            return Err(DeskError::NotPermitted {
                action: "create",
                contract_id: "(new)".to_string(),
            });
        }

        let created = self
            .gateway
            .create(&draft)
            .await
            .map_err(DeskError::Gateway)?;
        info!("contract {} created", created.contract_id);
        self.install(created).await
    }

    pub async fn edit(
        &self,
        contract_id: &str,
        draft: ContractDraft,
    ) -> Result<ContractView, DeskError> {
        draft.validate().map_err(DeskError::Invalid)?;
        self.authorize(contract_id, "edit", evaluator::can_edit)
            .await?;

        let updated = self
            .gateway
            .update(contract_id, &draft)
            .await
            .map_err(DeskError::Gateway)?;
        self.install(updated).await
    }

    pub async fn approve(&self, contract_id: &str) -> Result<ContractView, DeskError> {
        self.authorize(contract_id, "approve", evaluator::can_approve)
            .await?;

        let updated = self
            .gateway
            .approve(contract_id)
            .await
            .map_err(DeskError::Gateway)?;
        info!("contract {contract_id} approved by {}", self.user.id);
        self.install(updated).await
    }

    pub async fn reject(
        &self,
        contract_id: &str,
        reason: Option<String>,
    ) -> Result<ContractView, DeskError> {
        self.authorize(contract_id, "reject", evaluator::can_reject)
            .await?;

        let reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());
        let updated = self
            .gateway
            .reject(contract_id, reason.as_deref())
            .await
            .map_err(DeskError::Gateway)?;
        info!("contract {contract_id} rejected by {}", self.user.id);
        self.install(updated).await
    }

    pub async fn sign(
        &self,
        contract_id: &str,
        input: SignatureInput,
    ) -> Result<ContractView, DeskError> {
        let submission = input.validate()?;
        self.authorize(contract_id, "sign", evaluator::can_sign)
            .await?;

        let updated = self
            .gateway
            .sign(contract_id, &submission)
            .await
            .map_err(DeskError::Gateway)?;
        info!("contract {contract_id} signed by {}", self.user.id);
        self.install(updated).await
    }

    pub async fn delete(&self, contract_id: &str) -> Result<(), DeskError> {
        self.authorize(contract_id, "delete", evaluator::can_delete)
            .await?;

        self.gateway
            .remove(contract_id)
            .await
            .map_err(DeskError::Gateway)?;
        self.board.remove(contract_id).await;
        info!("contract {contract_id} deleted by {}", self.user.id);
        Ok(())
    }

    pub async fn send_reminder(&self, contract_id: &str) -> Result<(), DeskError> {
        self.authorize(contract_id, "remind", evaluator::can_remind)
            .await?;

        self.gateway
            .send_reminder(contract_id)
            .await
            .map_err(DeskError::Gateway)
    }

    pub async fn download_pdf(&self, contract_id: &str) -> Result<Vec<u8>, DeskError> {
        self.authorize(contract_id, "download", evaluator::can_download)
            .await?;

        self.gateway
            .download_pdf(contract_id)
            .await
            .map_err(DeskError::Gateway)
    }

    pub async fn upload_document(
        &self,
        contract_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ContractView, DeskError> {
        let mut errors = FieldErrors::new();
        if file_name.trim().is_empty() {
            errors.insert("fileName", "file name is required");
        }
        if bytes.is_empty() {
            errors.insert("document", "document is empty");
        }
        errors.into_result().map_err(DeskError::Invalid)?;

        self.authorize(contract_id, "upload", evaluator::can_download)
            .await?;

        let updated = self
            .gateway
            .upload_document(contract_id, file_name.trim(), bytes)
            .await
            .map_err(DeskError::Gateway)?;
        self.install(updated).await
    }

    async fn authorize(
        &self,
        contract_id: &str,
        action: &'static str,
        rule: fn(&Contract, &User) -> bool,
    ) -> Result<Contract, DeskError> {
        let contract = self.snapshot(contract_id).await?;
        if !rule(&contract, &self.user) {
            return Err(DeskError::NotPermitted {
                action,
                contract_id: contract_id.to_string(),
            });
        }
        Ok(contract)
    }

    async fn snapshot(&self, contract_id: &str) -> Result<Contract, DeskError> {
        if let Some(contract) = self.board.get(contract_id).await {
            return Ok(contract);
        }
        let fetched = self
            .gateway
            .contract(contract_id)
            .await
            .map_err(DeskError::Gateway)?;
        if !self.board.upsert(fetched.clone(), self.owns(&fetched)).await {
            return Err(DeskError::Gone(contract_id.to_string()));
        }
        Ok(fetched)
    }

    /// Whether the contract belongs in the user's own list.
    fn owns(&self, contract: &Contract) -> bool {
        evaluator::party_role(contract, &self.user).is_some()
    }

    async fn install(&self, contract: Contract) -> Result<ContractView, DeskError> {
        let contract_id = contract.contract_id.clone();
        let mine = self.owns(&contract);
        if !self.board.upsert(contract.clone(), mine).await {
            warn!("dropping response for deleted contract {contract_id}");
            return Err(DeskError::Gone(contract_id));
        }
        Ok(ContractView::build(contract, &self.user))
    }
}
