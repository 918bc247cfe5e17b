use std::collections::{HashMap, HashSet};

use rentloop_core::Contract;
use tokio::sync::RwLock;
use tracing::debug;

/// A list view of contracts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Mine,
    Property(String),
}

/// Issued before a fetch; orders the responses of concurrent fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub scope: Scope,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Fresh { listed: usize },
    Stale,
}

#[derive(Debug, Clone)]
struct Record {
    contract: Contract,
    installed_at: u64,
}

#[derive(Debug, Clone, Default)]
struct ScopeView {
    applied: u64,
    ids: Vec<String>,
}

#[derive(Default)]
struct BoardState {
    sequence: u64,
    records: HashMap<String, Record>,
    scopes: HashMap<Scope, ScopeView>,
    tombstones: HashMap<String, u64>,
    /// Newest expired tombstone. Tickets issued before it are stale.
    horizon: u64,
}

impl BoardState {
    /// Runs after a snapshot issued at `sequence` was applied. Records no
    /// scope lists any more are dropped unless an action installed them
    /// later. Tombstones older than the snapshot are dropped too, and the
    /// horizon keeps tickets issued before them from being applied.
    fn expire(&mut self, sequence: u64) {
        let listed: HashSet<String> = self
            .scopes
            .values()
            .flat_map(|view| view.ids.iter().cloned())
            .collect();
        self.records
            .retain(|id, record| record.installed_at > sequence || listed.contains(id));

        let mut horizon = self.horizon;
        self.tombstones.retain(|_, deleted_at| {
            if *deleted_at < sequence {
                horizon = horizon.max(*deleted_at);
                false
            } else {
                true
            }
        });
        self.horizon = horizon;
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn install(&mut self, contract: Contract, sequence: u64) {
        match self.records.get(&contract.contract_id) {
            Some(existing) if existing.installed_at > sequence => {}
            _ => {
                self.records.insert(
                    contract.contract_id.clone(),
                    Record {
                        contract,
                        installed_at: sequence,
                    },
                );
            }
        }
    }
}

/// Local contract views shared by every screen of one user.
///
/// Every fetch takes a [`Ticket`] first. A response is applied only when its
/// ticket is newer than the one last applied to the same scope, so a slow
/// response can never overwrite a newer one. Deletions leave a tombstone that
/// older responses cannot undo.
#[derive(Default)]
pub struct ContractBoard {
    state: RwLock<BoardState>,
}

impl ContractBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, scope: Scope) -> Ticket {
        let mut state = self.state.write().await;
        let sequence = state.next_sequence();
        Ticket { scope, sequence }
    }

    pub async fn apply(&self, ticket: Ticket, snapshot: Vec<Contract>) -> Applied {
        let mut state = self.state.write().await;

        let last_applied = state
            .scopes
            .get(&ticket.scope)
            .map(|view| view.applied)
            .unwrap_or(0);
        if ticket.sequence <= last_applied {
            debug!(
                "discarding stale snapshot for {:?} (ticket {} <= {})",
                ticket.scope, ticket.sequence, last_applied
            );
            return Applied::Stale;
        }
        if ticket.sequence < state.horizon {
            debug!(
                "discarding snapshot for {:?} issued before an expired deletion",
                ticket.scope
            );
            return Applied::Stale;
        }

        let mut ids = Vec::with_capacity(snapshot.len());
        for contract in snapshot {
            let id = contract.contract_id.clone();
            match state.tombstones.get(&id).copied() {
                Some(deleted_at) if deleted_at > ticket.sequence => continue,
                Some(_) => {
                    state.tombstones.remove(&id);
                }
                None => {}
            }
            if !ids.contains(&id) {
                ids.push(id);
            }
            state.install(contract, ticket.sequence);
        }

        // contracts installed by actions after this ticket was issued stay listed
        let previous = state
            .scopes
            .get(&ticket.scope)
            .map(|view| view.ids.clone())
            .unwrap_or_default();
        for id in previous {
            let newer = state
                .records
                .get(&id)
                .is_some_and(|record| record.installed_at > ticket.sequence);
            if newer && !ids.contains(&id) {
                ids.push(id);
            }
        }

        let listed = ids.len();
        let sequence = ticket.sequence;
        state.scopes.insert(
            ticket.scope,
            ScopeView {
                applied: sequence,
                ids,
            },
        );
        state.expire(sequence);
        Applied::Fresh { listed }
    }

    /// Installs an action response. `mine` says whether the contract belongs
    /// in [`Scope::Mine`]. Returns `false` when the contract was deleted
    /// locally.
    pub async fn upsert(&self, contract: Contract, mine: bool) -> bool {
        let mut state = self.state.write().await;
        if state.tombstones.contains_key(&contract.contract_id) {
            return false;
        }

        let sequence = state.next_sequence();
        let id = contract.contract_id.clone();
        let property_scope = contract.property_id.clone().map(Scope::Property);
        state.install(contract, sequence);

        for (scope, view) in state.scopes.iter_mut() {
            let member = match scope {
                Scope::Mine => mine,
                Scope::Property(_) => Some(scope) == property_scope.as_ref(),
            };
            if member && !view.ids.contains(&id) {
                view.ids.push(id.clone());
            }
        }
        true
    }

    /// Drops the contract from every view at once.
    pub async fn remove(&self, contract_id: &str) {
        let mut state = self.state.write().await;
        let sequence = state.next_sequence();

        state.records.remove(contract_id);
        for view in state.scopes.values_mut() {
            view.ids.retain(|id| id != contract_id);
        }
        state.tombstones.insert(contract_id.to_string(), sequence);
    }

    pub async fn list(&self, scope: &Scope) -> Vec<Contract> {
        let state = self.state.read().await;
        let Some(view) = state.scopes.get(scope) else {
            return Vec::new();
        };
        view.ids
            .iter()
            .filter_map(|id| state.records.get(id))
            .map(|record| record.contract.clone())
            .collect()
    }

    pub async fn get(&self, contract_id: &str) -> Option<Contract> {
        let state = self.state.read().await;
        state
            .records
            .get(contract_id)
            .map(|record| record.contract.clone())
    }

    pub async fn is_loaded(&self, scope: &Scope) -> bool {
        self.state.read().await.scopes.contains_key(scope)
    }

    pub async fn scopes(&self) -> Vec<Scope> {
        let state = self.state.read().await;
        let mut scopes: Vec<Scope> = state.scopes.keys().cloned().collect();
        scopes.sort();
        scopes
    }
}

#[cfg(test)]
mod tests {
    use rentloop_core::ContractStatus;

    use super::*;

    fn contract(id: &str, property: &str, status: ContractStatus) -> Contract {
        Contract {
            status,
            property_id: Some(property.to_string()),
            ..Contract::new(id, "u-landlord", "u-tenant")
        }
    }

    fn ids(contracts: &[Contract]) -> Vec<&str> {
        contracts.iter().map(|c| c.contract_id.as_str()).collect()
    }

    #[tokio::test]
    async fn slower_older_response_is_discarded() {
        let board = ContractBoard::new();
        let older = board.begin(Scope::Mine).await;
        let newer = board.begin(Scope::Mine).await;

        let fresh = board
            .apply(
                newer,
                vec![contract("c-1", "p-1", ContractStatus::Approved)],
            )
            .await;
        assert_eq!(fresh, Applied::Fresh { listed: 1 });

        let stale = board
            .apply(
                older,
                vec![contract("c-1", "p-1", ContractStatus::PendingApproval)],
            )
            .await;
        assert_eq!(stale, Applied::Stale);
        assert_eq!(
            board.get("c-1").await.unwrap().status,
            ContractStatus::Approved
        );
    }

    #[tokio::test]
    async fn remove_clears_every_scope() {
        let board = ContractBoard::new();
        let mine = board.begin(Scope::Mine).await;
        let property = board.begin(Scope::Property("p-1".to_string())).await;
        let snapshot = vec![
            contract("c-1", "p-1", ContractStatus::PendingApproval),
            contract("c-2", "p-1", ContractStatus::PendingApproval),
        ];
        board.apply(mine, snapshot.clone()).await;
        board.apply(property, snapshot).await;

        board.remove("c-1").await;

        assert_eq!(ids(&board.list(&Scope::Mine).await), vec!["c-2"]);
        assert_eq!(
            ids(&board.list(&Scope::Property("p-1".to_string())).await),
            vec!["c-2"]
        );
        assert!(board.get("c-1").await.is_none());
    }

    #[tokio::test]
    async fn in_flight_snapshot_cannot_resurrect_deleted_contract() {
        let board = ContractBoard::new();
        let in_flight = board.begin(Scope::Mine).await;

        board.remove("c-1").await;
        board
            .apply(
                in_flight,
                vec![contract("c-1", "p-1", ContractStatus::PendingApproval)],
            )
            .await;

        assert!(board.list(&Scope::Mine).await.is_empty());
        assert!(
            !board
                .upsert(contract("c-1", "p-1", ContractStatus::Approved), true)
                .await
        );
    }

    #[tokio::test]
    async fn fetch_issued_after_delete_is_authoritative() {
        let board = ContractBoard::new();
        board.remove("c-1").await;

        let later = board.begin(Scope::Mine).await;
        board
            .apply(
                later,
                vec![contract("c-1", "p-1", ContractStatus::PendingApproval)],
            )
            .await;

        assert_eq!(ids(&board.list(&Scope::Mine).await), vec!["c-1"]);
    }

    #[tokio::test]
    async fn action_response_outlives_older_list_snapshot() {
        let board = ContractBoard::new();
        let first = board.begin(Scope::Mine).await;
        board.apply(first, Vec::new()).await;

        let in_flight = board.begin(Scope::Mine).await;
        assert!(
            board
                .upsert(contract("c-9", "p-3", ContractStatus::PendingApproval), true)
                .await
        );
        board.apply(in_flight, Vec::new()).await;

        assert_eq!(ids(&board.list(&Scope::Mine).await), vec!["c-9"]);
    }

    #[tokio::test]
    async fn records_no_scope_lists_are_evicted() {
        let board = ContractBoard::new();
        let first = board.begin(Scope::Mine).await;
        board
            .apply(
                first,
                vec![
                    contract("c-1", "p-1", ContractStatus::PendingApproval),
                    contract("c-2", "p-1", ContractStatus::PendingApproval),
                ],
            )
            .await;

        let second = board.begin(Scope::Mine).await;
        board
            .apply(
                second,
                vec![contract("c-2", "p-1", ContractStatus::PendingApproval)],
            )
            .await;

        assert!(board.get("c-1").await.is_none());
        assert!(board.get("c-2").await.is_some());
    }

    #[tokio::test]
    async fn record_listed_by_another_scope_survives() {
        let board = ContractBoard::new();
        let property = board.begin(Scope::Property("p-1".to_string())).await;
        board
            .apply(
                property,
                vec![contract("c-1", "p-1", ContractStatus::PendingApproval)],
            )
            .await;

        let mine = board.begin(Scope::Mine).await;
        board.apply(mine, Vec::new()).await;

        assert!(board.get("c-1").await.is_some());
    }

    #[tokio::test]
    async fn foreign_contract_does_not_join_mine() {
        let board = ContractBoard::new();
        let mine = board.begin(Scope::Mine).await;
        board.apply(mine, Vec::new()).await;

        assert!(
            board
                .upsert(contract("c-7", "p-1", ContractStatus::PendingApproval), false)
                .await
        );

        assert!(board.list(&Scope::Mine).await.is_empty());
        assert!(board.get("c-7").await.is_some());
    }

    #[tokio::test]
    async fn expired_tombstone_still_blocks_older_tickets() {
        let board = ContractBoard::new();
        let old_mine = board.begin(Scope::Mine).await;
        board.remove("c-1").await;

        let property = board.begin(Scope::Property("p-1".to_string())).await;
        board.apply(property, Vec::new()).await;
        assert!(board.state.read().await.tombstones.is_empty());

        let applied = board
            .apply(
                old_mine,
                vec![contract("c-1", "p-1", ContractStatus::PendingApproval)],
            )
            .await;
        assert_eq!(applied, Applied::Stale);
        assert!(board.get("c-1").await.is_none());
    }

    #[tokio::test]
    async fn upsert_joins_matching_property_scope_only() {
        let board = ContractBoard::new();
        let p1 = board.begin(Scope::Property("p-1".to_string())).await;
        let p2 = board.begin(Scope::Property("p-2".to_string())).await;
        board.apply(p1, Vec::new()).await;
        board.apply(p2, Vec::new()).await;

        board
            .upsert(contract("c-5", "p-2", ContractStatus::PendingApproval), true)
            .await;

        assert!(board.list(&Scope::Property("p-1".to_string())).await.is_empty());
        assert_eq!(
            ids(&board.list(&Scope::Property("p-2".to_string())).await),
            vec!["c-5"]
        );
        assert!(!board.is_loaded(&Scope::Mine).await);
    }
}
