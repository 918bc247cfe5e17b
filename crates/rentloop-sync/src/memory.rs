use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::Utc;
use rentloop_core::{
    Contract, ContractDraft, ContractGateway, ContractStatus, PartyRole, SignatureSubmission,
    SignatureVault, evaluator,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct BackendState {
    contracts: HashMap<String, Contract>,
    sequence: u64,
    signatures: HashMap<String, String>,
}

/// In-process stand-in for the contract backend, shared by every user
/// session created from it.
#[derive(Default)]
pub struct InMemoryBackend {
    state: RwLock<BackendState>,
    calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of gateway calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn insert(&self, contract: Contract) {
        let mut state = self.state.write().await;
        state.contracts.insert(contract.contract_id.clone(), contract);
    }

    pub async fn contract(&self, contract_id: &str) -> Option<Contract> {
        self.state.read().await.contracts.get(contract_id).cloned()
    }
}

/// Gateway bound to one user, like a bearer token would be.
#[derive(Clone)]
pub struct InMemoryContractGateway {
    backend: Arc<InMemoryBackend>,
    user_id: String,
}

impl InMemoryContractGateway {
    pub fn new(backend: Arc<InMemoryBackend>, user_id: impl Into<String>) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
        }
    }

    fn track(&self) {
        self.backend.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn role_in(&self, contract: &Contract) -> anyhow::Result<PartyRole> {
        if contract.landlord_id == self.user_id {
            Ok(PartyRole::Landlord)
        } else if contract.tenant_id == self.user_id {
            Ok(PartyRole::Tenant)
        } else {
            bail!("user is not a party to contract {}", contract.contract_id)
        }
    }

    async fn mutate<F>(&self, contract_id: &str, apply: F) -> anyhow::Result<Contract>
    where
        F: FnOnce(&mut Contract, PartyRole) -> anyhow::Result<()> + Send,
    {
        let mut state = self.backend.state.write().await;
        let contract = state
            .contracts
            .get_mut(contract_id)
            .with_context(|| format!("contract {contract_id} not found"))?;
        let role = self.role_in(contract)?;
        apply(contract, role)?;
        contract.updated_at = Some(Utc::now());
        Ok(contract.clone())
    }
}

fn fill_from_draft(contract: &mut Contract, draft: &ContractDraft) {
    contract.property_id = Some(draft.property_id.clone());
    contract.chat_id = draft.chat_id.clone();
    contract.monthly_rent = Some(draft.monthly_rent);
    contract.security_deposit = Some(draft.security_deposit);
    contract.start_date = draft.start_date;
    contract.end_date = draft.end_date;
    contract.terms = Some(draft.terms.clone());
    contract.conditions = draft.conditions.clone();
    contract.landlord_details = Some(draft.landlord_details.clone());
    contract.tenant_details = Some(draft.tenant_details.clone());
}

#[async_trait]
impl ContractGateway for InMemoryContractGateway {
    async fn my_contracts(&self) -> anyhow::Result<Vec<Contract>> {
        self.track();
        let state = self.backend.state.read().await;
        let mut contracts: Vec<Contract> = state
            .contracts
            .values()
            .filter(|c| c.landlord_id == self.user_id || c.tenant_id == self.user_id)
            .cloned()
            .collect();
        contracts.sort_by(|a, b| a.contract_id.cmp(&b.contract_id));
        Ok(contracts)
    }

    async fn contract(&self, contract_id: &str) -> anyhow::Result<Contract> {
        self.track();
        self.backend
            .contract(contract_id)
            .await
            .with_context(|| format!("contract {contract_id} not found"))
    }

    async fn property_contracts(&self, property_id: &str) -> anyhow::Result<Vec<Contract>> {
        self.track();
        let state = self.backend.state.read().await;
        let mut contracts: Vec<Contract> = state
            .contracts
            .values()
            .filter(|c| c.property_id.as_deref() == Some(property_id))
            .cloned()
            .collect();
        contracts.sort_by(|a, b| a.contract_id.cmp(&b.contract_id));
        Ok(contracts)
    }

    async fn create(&self, draft: &ContractDraft) -> anyhow::Result<Contract> {
        self.track();
        let mut state = self.backend.state.write().await;
        state.sequence += 1;

        let mut contract = Contract::new(
            format!("contract-{}", state.sequence),
            draft.landlord_id.clone(),
            draft.tenant_id.clone(),
        );
        contract.status = ContractStatus::PendingApproval;
        contract.created_by = Some(self.user_id.clone());
        contract.updated_at = Some(Utc::now());
        fill_from_draft(&mut contract, draft);

        state
            .contracts
            .insert(contract.contract_id.clone(), contract.clone());
        Ok(contract)
    }

    async fn update(&self, contract_id: &str, draft: &ContractDraft) -> anyhow::Result<Contract> {
        self.track();
        self.mutate(contract_id, |contract, _| {
            fill_from_draft(contract, draft);
            Ok(())
        })
        .await
    }

    async fn remove(&self, contract_id: &str) -> anyhow::Result<()> {
        self.track();
        let mut state = self.backend.state.write().await;
        state
            .contracts
            .remove(contract_id)
            .map(|_| ())
            .with_context(|| format!("contract {contract_id} not found"))
    }

    async fn approve(&self, contract_id: &str) -> anyhow::Result<Contract> {
        self.track();
        self.mutate(contract_id, |contract, role| {
            let approval = contract.approvals.for_role_mut(role);
            approval.approved = true;
            approval.approved_at = Some(Utc::now());
            if evaluator::both_approved(contract) {
                contract.status = ContractStatus::PendingLandlordSignature;
            }
            Ok(())
        })
        .await
    }

    async fn reject(&self, contract_id: &str, reason: Option<&str>) -> anyhow::Result<Contract> {
        self.track();
        let reason = reason.map(str::to_string);
        self.mutate(contract_id, move |contract, _| {
            contract.status = ContractStatus::Rejected;
            contract.rejection_reason = reason;
            Ok(())
        })
        .await
    }

    async fn sign(
        &self,
        contract_id: &str,
        signature: &SignatureSubmission,
    ) -> anyhow::Result<Contract> {
        self.track();
        let image = if signature.use_stored_signature {
            let state = self.backend.state.read().await;
            Some(
                state
                    .signatures
                    .get(&self.user_id)
                    .cloned()
                    .context("no stored signature on file")?,
            )
        } else {
            signature.signature_image.clone()
        };
        let user_id = self.user_id.clone();

        self.mutate(contract_id, move |contract, role| {
            let slot = contract.signatures.for_role_mut(role);
            slot.signed = true;
            slot.signed_at = Some(Utc::now());
            slot.signed_by = Some(user_id);
            slot.signature_image = image;

            contract.status = if evaluator::both_signed(contract) {
                ContractStatus::FullySigned
            } else if contract.signatures.landlord.signed {
                ContractStatus::PendingTenantSignature
            } else {
                ContractStatus::PendingLandlordSignature
            };
            Ok(())
        })
        .await
    }

    async fn send_reminder(&self, contract_id: &str) -> anyhow::Result<()> {
        self.track();
        self.mutate(contract_id, |_, _| Ok(())).await.map(|_| ())
    }

    async fn download_pdf(&self, contract_id: &str) -> anyhow::Result<Vec<u8>> {
        self.track();
        let contract = self
            .backend
            .contract(contract_id)
            .await
            .with_context(|| format!("contract {contract_id} not found"))?;
        Ok(format!("%PDF-1.4\n% contract {}\n", contract.contract_id).into_bytes())
    }

    async fn upload_document(
        &self,
        contract_id: &str,
        file_name: &str,
        _bytes: Vec<u8>,
    ) -> anyhow::Result<Contract> {
        self.track();
        let file_name = file_name.to_string();
        self.mutate(contract_id, move |contract, _| {
            contract.documents.push(file_name);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SignatureVault for InMemoryContractGateway {
    async fn stored_signature(&self) -> anyhow::Result<Option<String>> {
        self.track();
        let state = self.backend.state.read().await;
        Ok(state.signatures.get(&self.user_id).cloned())
    }

    async fn save_signature(&self, image: &str) -> anyhow::Result<()> {
        self.track();
        let mut state = self.backend.state.write().await;
        state
            .signatures
            .insert(self.user_id.clone(), image.to_string());
        Ok(())
    }
}
