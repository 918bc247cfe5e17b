use std::{sync::Arc, time::Duration};

use rentloop_core::{RealtimeEvent, RealtimeEventKind};
use tokio::{
    sync::{mpsc, watch},
    time::MissedTickBehavior,
};
use tracing::{info, warn};

use crate::{board::Scope, desk::ContractDesk};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub interval: Duration,
    /// Scopes kept fresh even before anyone asked for them.
    pub scopes: Vec<Scope>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            scopes: vec![Scope::Mine],
        }
    }
}

/// Scopes to refetch after a contract notification.
pub fn scopes_for_event(event: &RealtimeEvent, known: &[Scope]) -> Vec<Scope> {
    if !event.kind.refreshes_contracts() {
        return Vec::new();
    }

    match event.property_id() {
        Some(property_id) => {
            let mut scopes = vec![Scope::Mine];
            let property = Scope::Property(property_id.to_string());
            if known.contains(&property) {
                scopes.push(property);
            }
            scopes
        }
        None => known.to_vec(),
    }
}

async fn known_scopes(desk: &ContractDesk, settings: &RefreshSettings) -> Vec<Scope> {
    let mut scopes = desk.board().scopes().await;
    for scope in &settings.scopes {
        if !scopes.contains(scope) {
            scopes.push(scope.clone());
        }
    }
    scopes
}

async fn refresh_scopes(desk: &ContractDesk, scopes: Vec<Scope>) {
    for scope in scopes {
        if let Err(err) = desk.refresh(scope.clone()).await {
            warn!("refresh of {scope:?} failed: {err}");
        }
    }
}

/// Drives every contract refetch for one desk: notifications first, the
/// polling interval as a fallback. Runs until `shutdown` flips to `true`.
pub async fn run_refresh_loop(
    desk: Arc<ContractDesk>,
    mut events: mpsc::Receiver<RealtimeEvent>,
    settings: RefreshSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    info!(
        "contract refresh loop started (interval {:?})",
        settings.interval
    );

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv(), if events_open => {
                let Some(event) = event else {
                    warn!("realtime channel closed, falling back to polling only");
                    events_open = false;
                    continue;
                };
                if event.kind == RealtimeEventKind::SignatureReminder {
                    info!(
                        "signature reminder received for contract {}",
                        event.contract_id().unwrap_or("unknown")
                    );
                }
                let known = known_scopes(&desk, &settings).await;
                let scopes = scopes_for_event(&event, &known);
                if !scopes.is_empty() {
                    refresh_scopes(&desk, scopes).await;
                }
            }
            _ = ticker.tick() => {
                let known = known_scopes(&desk, &settings).await;
                refresh_scopes(&desk, known).await;
            }
        }
    }

    info!("contract refresh loop stopped");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rentloop_core::{Contract, ContractStatus, MarketRole, User};
    use serde_json::json;

    use super::*;
    use crate::{
        board::ContractBoard,
        memory::{InMemoryBackend, InMemoryContractGateway},
    };

    fn event(kind: RealtimeEventKind, payload: serde_json::Value) -> RealtimeEvent {
        RealtimeEvent { kind, payload }
    }

    #[test]
    fn property_event_refreshes_mine_and_watched_property() {
        let known = vec![Scope::Mine, Scope::Property("p-1".to_string())];
        let scopes = scopes_for_event(
            &event(RealtimeEventKind::ContractSigned, json!({ "propertyId": "p-1" })),
            &known,
        );
        assert_eq!(scopes, known);

        let unwatched = scopes_for_event(
            &event(RealtimeEventKind::ContractSigned, json!({ "propertyId": "p-9" })),
            &known,
        );
        assert_eq!(unwatched, vec![Scope::Mine]);
    }

    #[test]
    fn event_without_property_refreshes_everything_known() {
        let known = vec![Scope::Mine, Scope::Property("p-1".to_string())];
        let scopes = scopes_for_event(
            &event(RealtimeEventKind::ContractUpdated, json!({ "contractId": "c-1" })),
            &known,
        );
        assert_eq!(scopes, known);
    }

    #[test]
    fn chat_events_refresh_nothing() {
        let scopes = scopes_for_event(
            &event(RealtimeEventKind::ReceiveMessage, json!({})),
            &[Scope::Mine],
        );
        assert!(scopes.is_empty());
    }

    #[tokio::test]
    async fn notification_triggers_refetch_and_shutdown_stops_loop() {
        let backend = InMemoryBackend::new();
        let gateway = InMemoryContractGateway::new(backend.clone(), "u-tenant");
        let desk = Arc::new(ContractDesk::new(
            User::new("u-tenant", MarketRole::Buyer),
            Arc::new(gateway),
            Arc::new(ContractBoard::new()),
        ));

        let (events_tx, events_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = RefreshSettings {
            interval: Duration::from_secs(3600),
            scopes: vec![Scope::Mine],
        };
        let handle = tokio::spawn(run_refresh_loop(
            desk.clone(),
            events_rx,
            settings,
            shutdown_rx,
        ));

        let mut contract = Contract::new("c-1", "u-landlord", "u-tenant");
        contract.status = ContractStatus::PendingApproval;
        contract.updated_at = Some(Utc::now());
        backend.insert(contract).await;
        events_tx
            .send(event(
                RealtimeEventKind::ContractCreated,
                json!({ "contractId": "c-1" }),
            ))
            .await
            .unwrap();

        let mut listed = Vec::new();
        for _ in 0..100 {
            listed = desk.board().list(&Scope::Mine).await;
            if !listed.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listed.len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
