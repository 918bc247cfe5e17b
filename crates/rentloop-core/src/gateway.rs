use async_trait::async_trait;

use crate::{Contract, ContractDraft, SignatureSubmission};

/// The remote contract service. Every call is keyed by the contract id and
/// answers with the backend's authoritative snapshot.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    async fn my_contracts(&self) -> anyhow::Result<Vec<Contract>>;
    async fn contract(&self, contract_id: &str) -> anyhow::Result<Contract>;
    async fn property_contracts(&self, property_id: &str) -> anyhow::Result<Vec<Contract>>;
    async fn create(&self, draft: &ContractDraft) -> anyhow::Result<Contract>;
    async fn update(&self, contract_id: &str, draft: &ContractDraft) -> anyhow::Result<Contract>;
    async fn remove(&self, contract_id: &str) -> anyhow::Result<()>;
    async fn approve(&self, contract_id: &str) -> anyhow::Result<Contract>;
    async fn reject(&self, contract_id: &str, reason: Option<&str>) -> anyhow::Result<Contract>;
    async fn sign(
        &self,
        contract_id: &str,
        signature: &SignatureSubmission,
    ) -> anyhow::Result<Contract>;
    async fn send_reminder(&self, contract_id: &str) -> anyhow::Result<()>;
    async fn download_pdf(&self, contract_id: &str) -> anyhow::Result<Vec<u8>>;
    async fn upload_document(
        &self,
        contract_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<Contract>;
}

/// Per-user stored signature, reused with `useStoredSignature`.
#[async_trait]
pub trait SignatureVault: Send + Sync {
    async fn stored_signature(&self) -> anyhow::Result<Option<String>>;
    async fn save_signature(&self, image: &str) -> anyhow::Result<()>;
}
