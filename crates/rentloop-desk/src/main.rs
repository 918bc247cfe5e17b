use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use rentloop_core::{
    ChatMessage, ChatSummary, ContractDraft, FieldErrors, OutboundEvent, SignatureInput,
    SignatureVault, validate_message, validation::validate_signature_image,
};
use rentloop_platform::{
    ApiError, HttpApi, InitiateChatRequest, RealtimeRelay, RedisBus, RejectContractRequest,
    SaveSignatureRequest, ServiceConfig,
};
use rentloop_sync::{
    ContractBoard, ContractDesk, ContractView, DeskError, RefreshSettings, Scope,
    run_refresh_loop,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Clone)]
struct AppState {
    desk: Arc<ContractDesk>,
    vault: Arc<dyn SignatureVault>,
    api: HttpApi,
    relay: RealtimeRelay,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureResponse {
    signature_image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PostMessageRequest {
    content: String,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "rentloop_desk=info,rentloop_sync=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8300")?;
    let api = HttpApi::new(&config.api_base_url, &config.api_token)?;
    let relay = RealtimeRelay::new(
        RedisBus::connect(&config.redis_url)?,
        config.realtime_channel.clone(),
        config.realtime_emit_channel.clone(),
    );

    let desk = Arc::new(ContractDesk::new(
        config.user(),
        Arc::new(api.clone()),
        Arc::new(ContractBoard::new()),
    ));

    let (events_tx, events_rx) = mpsc::channel(64);
    if let Err(err) = relay.spawn_listener(events_tx).await {
        warn!("realtime relay unavailable, polling only: {err:#}");
    }
    let register = OutboundEvent::Register {
        user_id: config.user_id.clone(),
    };
    if let Err(err) = relay.emit(&register).await {
        warn!("failed to register with realtime relay: {err:#}");
    }

    let mut scopes = vec![Scope::Mine];
    scopes.extend(
        config
            .watch_property_ids
            .iter()
            .cloned()
            .map(Scope::Property),
    );
    let settings = RefreshSettings {
        interval: config.poll_interval,
        scopes,
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh = tokio::spawn(run_refresh_loop(
        desk.clone(),
        events_rx,
        settings,
        shutdown_rx,
    ));

    let state = AppState {
        desk,
        vault: Arc::new(api.clone()),
        api,
        relay,
    };
    let router = router(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!(
        "contract desk for {} listening on {}",
        config.user_id, addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {err}");
            }
        })
        .await?;

    let _ = shutdown_tx.send(true);
    refresh.await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/contracts", get(list_contracts).post(create_contract))
        .route(
            "/contracts/{id}",
            get(get_contract).put(update_contract).delete(delete_contract),
        )
        .route("/contracts/{id}/approve", post(approve_contract))
        .route("/contracts/{id}/reject", post(reject_contract))
        .route("/contracts/{id}/sign", post(sign_contract))
        .route("/contracts/{id}/remind", post(remind_contract))
        .route("/contracts/{id}/pdf", get(download_pdf))
        .route("/contracts/{id}/documents", post(upload_document))
        .route("/properties/{property_id}/contracts", get(property_contracts))
        .route("/signature", get(get_signature).post(save_signature))
        .route("/chats", get(list_chats).post(initiate_chat))
        .route("/chats/unread-count", get(unread_count))
        .route("/chats/{id}/messages", get(chat_history).post(post_message))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_contracts(State(state): State<AppState>) -> ApiResult<Json<Vec<ContractView>>> {
    state.desk.views(Scope::Mine).await.map(Json).map_err(desk_error)
}

async fn property_contracts(
    State(state): State<AppState>,
    Path(property_id): Path<String>,
) -> ApiResult<Json<Vec<ContractView>>> {
    state
        .desk
        .views(Scope::Property(property_id))
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn get_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<Json<ContractView>> {
    state
        .desk
        .view(&contract_id)
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn create_contract(
    State(state): State<AppState>,
    Json(draft): Json<ContractDraft>,
) -> ApiResult<(StatusCode, Json<ContractView>)> {
    state
        .desk
        .create(draft)
        .await
        .map(|view| (StatusCode::CREATED, Json(view)))
        .map_err(desk_error)
}

async fn update_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    Json(draft): Json<ContractDraft>,
) -> ApiResult<Json<ContractView>> {
    state
        .desk
        .edit(&contract_id, draft)
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn delete_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .desk
        .delete(&contract_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(desk_error)
}

async fn approve_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<Json<ContractView>> {
    state
        .desk
        .approve(&contract_id)
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn reject_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    Json(payload): Json<RejectContractRequest>,
) -> ApiResult<Json<ContractView>> {
    state
        .desk
        .reject(&contract_id, payload.reason)
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn sign_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    Json(input): Json<SignatureInput>,
) -> ApiResult<Json<ContractView>> {
    state
        .desk
        .sign(&contract_id, input)
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn remind_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .desk
        .send_reminder(&contract_id)
        .await
        .map(|()| StatusCode::ACCEPTED)
        .map_err(desk_error)
}

async fn download_pdf(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .desk
        .download_pdf(&contract_id)
        .await
        .map_err(desk_error)?;
    let disposition = format!("attachment; filename=\"contract-{contract_id}.pdf\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

async fn upload_document(
    State(state): State<AppState>,
    Path(contract_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ContractView>> {
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    state
        .desk
        .upload_document(&contract_id, file_name, body.to_vec())
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn get_signature(State(state): State<AppState>) -> ApiResult<Json<SignatureResponse>> {
    let signature_image = state
        .vault
        .stored_signature()
        .await
        .map_err(backend_error)?;
    Ok(Json(SignatureResponse { signature_image }))
}

async fn save_signature(
    State(state): State<AppState>,
    Json(payload): Json<SaveSignatureRequest>,
) -> ApiResult<StatusCode> {
    let image = validate_signature_image(&payload.signature_image)
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
    state
        .vault
        .save_signature(&image)
        .await
        .map_err(backend_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_chats(State(state): State<AppState>) -> ApiResult<Json<Vec<ChatSummary>>> {
    state.api.my_chats().await.map(Json).map_err(backend_error)
}

async fn initiate_chat(
    State(state): State<AppState>,
    Json(payload): Json<InitiateChatRequest>,
) -> ApiResult<(StatusCode, Json<ChatSummary>)> {
    let mut errors = FieldErrors::new();
    if payload.property_id.trim().is_empty() {
        errors.insert("propertyId", "property is required");
    }
    if payload.receiver_id.trim().is_empty() {
        errors.insert("receiverId", "receiver is required");
    }
    errors.into_result().map_err(field_errors)?;

    let chat = state
        .api
        .initiate_chat(payload.property_id.trim(), payload.receiver_id.trim())
        .await
        .map_err(backend_error)?;

    let join = OutboundEvent::JoinChat {
        chat_id: chat.chat_id.clone(),
    };
    if let Err(err) = state.relay.emit(&join).await {
        warn!("failed to join chat {}: {err:#}", chat.chat_id);
    }
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn chat_history(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    state
        .api
        .chat_history(&chat_id)
        .await
        .map(Json)
        .map_err(backend_error)
}

async fn post_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(payload): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let content = validate_message(&payload.content).map_err(field_errors)?;
    state
        .api
        .send_message(&chat_id, &content)
        .await
        .map(|message| (StatusCode::CREATED, Json(message)))
        .map_err(backend_error)
}

async fn unread_count(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let unread = state.api.unread_count().await.map_err(backend_error)?;
    Ok(Json(json!({ "unread": unread })))
}

fn desk_error(err: DeskError) -> (StatusCode, String) {
    match err {
        DeskError::NotPermitted { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        DeskError::Invalid(errors) => field_errors(errors),
        DeskError::Signature(err) => (StatusCode::BAD_REQUEST, err.to_string()),
        DeskError::Gone(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DeskError::Gateway(err) => backend_error(err),
    }
}

fn field_errors(errors: FieldErrors) -> (StatusCode, String) {
    let body = serde_json::to_string(&errors).unwrap_or_else(|_| errors.to_string());
    (StatusCode::BAD_REQUEST, body)
}

fn backend_error(err: anyhow::Error) -> (StatusCode, String) {
    let status = match err.downcast_ref::<ApiError>() {
        Some(ApiError::NotFound(_)) => StatusCode::NOT_FOUND,
        Some(ApiError::Forbidden(_)) => StatusCode::FORBIDDEN,
        Some(ApiError::Unauthorized) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rentloop_core::{ContractStatus, MarketRole, PartyDetails, User};
    use rentloop_sync::{InMemoryBackend, InMemoryContractGateway};
    use rust_decimal::Decimal;

    use super::*;

    const LANDLORD: &str = "u-landlord";
    const TENANT: &str = "u-tenant";

    fn state_for(backend: &Arc<InMemoryBackend>, user: User) -> AppState {
        let gateway = Arc::new(InMemoryContractGateway::new(backend.clone(), user.id.clone()));
        let desk = Arc::new(ContractDesk::new(
            user,
            gateway.clone(),
            Arc::new(ContractBoard::new()),
        ));
        AppState {
            desk,
            vault: gateway,
            api: HttpApi::new("http://127.0.0.1:9/api", "test-token").unwrap(),
            relay: RealtimeRelay::new(
                RedisBus::connect("redis://127.0.0.1:9/").unwrap(),
                "rentloop.realtime",
                "rentloop.realtime.emit",
            ),
        }
    }

    fn draft() -> ContractDraft {
        ContractDraft {
            property_id: "p-1".to_string(),
            landlord_id: LANDLORD.to_string(),
            tenant_id: TENANT.to_string(),
            monthly_rent: Decimal::new(1100, 0),
            security_deposit: Decimal::new(2200, 0),
            start_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 8, 31),
            terms: "Twelve month lease".to_string(),
            landlord_details: PartyDetails {
                name: "Lena Landlord".to_string(),
                ..PartyDetails::default()
            },
            tenant_details: PartyDetails {
                name: "Tomas Tenant".to_string(),
                ..PartyDetails::default()
            },
            ..ContractDraft::default()
        }
    }

    fn drawn() -> SignatureInput {
        SignatureInput::Drawn {
            image: "data:image/png;base64,iVBORw0KGgo=".to_string(),
            text: None,
        }
    }

    #[tokio::test]
    async fn contract_lifecycle_over_handlers() {
        let backend = InMemoryBackend::new();
        let landlord = state_for(&backend, User::new(LANDLORD, MarketRole::Seller));
        let tenant = state_for(&backend, User::new(TENANT, MarketRole::Buyer));

        let (status, Json(created)) = create_contract(State(landlord.clone()), Json(draft()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let id = created.contract.contract_id.clone();
        assert!(created.permissions.approve);

        approve_contract(State(landlord.clone()), Path(id.clone()))
            .await
            .unwrap();
        let Json(view) = approve_contract(State(tenant.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(view.contract.status, ContractStatus::PendingLandlordSignature);
        assert!(!view.permissions.sign);

        // each desk only learns about the other party's moves on refresh
        landlord.desk.refresh(Scope::Mine).await.unwrap();
        sign_contract(State(landlord.clone()), Path(id.clone()), Json(drawn()))
            .await
            .unwrap();
        tenant.desk.refresh(Scope::Mine).await.unwrap();
        let Json(view) = sign_contract(State(tenant.clone()), Path(id.clone()), Json(drawn()))
            .await
            .unwrap();
        assert_eq!(view.contract.status, ContractStatus::FullySigned);
        assert_eq!(view.badge.label, "Fully Signed");

        let Json(listed) = list_contracts(State(tenant)).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn outsider_gets_forbidden() {
        let backend = InMemoryBackend::new();
        let landlord = state_for(&backend, User::new(LANDLORD, MarketRole::Seller));
        let outsider = state_for(&backend, User::new("u-other", MarketRole::Buyer));

        let (_, Json(created)) = create_contract(State(landlord), Json(draft()))
            .await
            .unwrap();
        let calls = backend.calls();

        let (status, _) = approve_contract(State(outsider), Path(created.contract.contract_id))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        // one fetch to learn the contract, no approve call
        assert_eq!(backend.calls(), calls + 1);
    }

    #[tokio::test]
    async fn invalid_draft_returns_field_map() {
        let backend = InMemoryBackend::new();
        let landlord = state_for(&backend, User::new(LANDLORD, MarketRole::Seller));
        let bad = ContractDraft {
            monthly_rent: Decimal::ZERO,
            ..draft()
        };

        let (status, body) = create_contract(State(landlord), Json(bad))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Value = serde_json::from_str(&body).unwrap();
        assert!(fields.get("monthlyRent").is_some());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn deleted_contract_is_gone_from_listing() {
        let backend = InMemoryBackend::new();
        let landlord = state_for(&backend, User::new(LANDLORD, MarketRole::Seller));

        let (_, Json(created)) = create_contract(State(landlord.clone()), Json(draft()))
            .await
            .unwrap();
        let status = delete_contract(
            State(landlord.clone()),
            Path(created.contract.contract_id.clone()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let Json(listed) = list_contracts(State(landlord)).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn upload_requires_file_name_header() {
        let backend = InMemoryBackend::new();
        let landlord = state_for(&backend, User::new(LANDLORD, MarketRole::Seller));
        let (_, Json(created)) = create_contract(State(landlord.clone()), Json(draft()))
            .await
            .unwrap();
        let id = created.contract.contract_id;

        let (status, _) = upload_document(
            State(landlord.clone()),
            Path(id.clone()),
            HeaderMap::new(),
            Bytes::from_static(b"%PDF-1.4"),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut headers = HeaderMap::new();
        headers.insert(FILE_NAME_HEADER, "lease.pdf".parse().unwrap());
        let Json(view) = upload_document(
            State(landlord),
            Path(id),
            headers,
            Bytes::from_static(b"%PDF-1.4"),
        )
        .await
        .unwrap();
        assert_eq!(view.contract.documents, vec!["lease.pdf".to_string()]);
    }

    #[tokio::test]
    async fn signature_round_trip_through_vault() {
        let backend = InMemoryBackend::new();
        let landlord = state_for(&backend, User::new(LANDLORD, MarketRole::Seller));

        let (status, _) = save_signature(
            State(landlord.clone()),
            Json(SaveSignatureRequest {
                signature_image: "   ".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        save_signature(
            State(landlord.clone()),
            Json(SaveSignatureRequest {
                signature_image: "https://cdn.example.com/sig.png".to_string(),
            }),
        )
        .await
        .unwrap();
        let Json(stored) = get_signature(State(landlord)).await.unwrap();
        assert_eq!(
            stored.signature_image.as_deref(),
            Some("https://cdn.example.com/sig.png")
        );
    }

    #[test]
    fn desk_errors_map_to_status_codes() {
        let forbidden = desk_error(DeskError::NotPermitted {
            action: "sign",
            contract_id: "c-1".to_string(),
        });
        assert_eq!(forbidden.0, StatusCode::FORBIDDEN);

        assert_eq!(
            desk_error(DeskError::Gone("c-1".to_string())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            desk_error(DeskError::Gateway(
                ApiError::NotFound("http://x/contract/c-1".to_string()).into()
            ))
            .0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            desk_error(DeskError::Gateway(anyhow::anyhow!("connection reset"))).0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn rejected_token_is_not_reported_as_an_outage() {
        let (status, body) = backend_error(ApiError::Unauthorized.into());
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "backend rejected the credentials");

        let wrapped = anyhow::Error::from(ApiError::Unauthorized).context("loading contracts");
        assert_eq!(backend_error(wrapped).0, StatusCode::UNAUTHORIZED);
    }
}
