use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    Method, RequestBuilder, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
    multipart,
};
use rentloop_core::{
    ChatMessage, ChatSummary, Contract, ContractDraft, ContractGateway, SignatureSubmission,
    SignatureVault,
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::contracts::{
    InitiateChatRequest, RejectContractRequest, SaveSignatureRequest, SendMessageRequest,
    UnreadCountResponse, decode_chat, decode_chats, decode_contract, decode_contract_list,
    decode_message, decode_messages, decode_signature, unwrap_envelope,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend rejected the credentials")]
    Unauthorized,
    #[error("backend refused the action: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Typed client for the marketplace REST backend.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, token: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("API token is not a valid header value")?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .default_headers(headers)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> (RequestBuilder, String) {
        let url = self.url(path);
        (self.client.request(method, &url), url)
    }

    async fn send(&self, builder: RequestBuilder, url: String) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;
        let status = response.status();
        debug!("{url} -> {status}");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, &url))
    }

    async fn json(&self, builder: RequestBuilder, url: String) -> Result<Value, ApiError> {
        let response = self.send(builder, url.clone()).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response
            .json::<Value>()
            .await
            .map_err(|source| ApiError::Transport { url, source })
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let (builder, url) = self.request(Method::GET, path);
        self.json(builder, url).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        let (builder, url) = self.request(method, path);
        self.json(builder.json(body), url).await
    }

    #[instrument(skip(self))]
    pub async fn my_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
        decode_chats(self.get_json("chat/my").await?)
    }

    #[instrument(skip(self))]
    pub async fn initiate_chat(
        &self,
        property_id: &str,
        receiver_id: &str,
    ) -> anyhow::Result<ChatSummary> {
        let body = InitiateChatRequest {
            property_id: property_id.to_string(),
            receiver_id: receiver_id.to_string(),
        };
        decode_chat(self.send_json(Method::POST, "chat/initiate", &body).await?)
    }

    #[instrument(skip(self))]
    pub async fn chat_history(&self, chat_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
        decode_messages(self.get_json(&format!("chat/history/{chat_id}")).await?)
    }

    #[instrument(skip(self, content))]
    pub async fn send_message(&self, chat_id: &str, content: &str) -> anyhow::Result<ChatMessage> {
        let body = SendMessageRequest {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
        };
        decode_message(self.send_json(Method::POST, "chat/send", &body).await?)
    }

    #[instrument(skip(self))]
    pub async fn unread_count(&self) -> anyhow::Result<u64> {
        let payload = unwrap_envelope(self.get_json("chat/unread-count").await?, &[]);
        let parsed: UnreadCountResponse =
            serde_json::from_value(payload).context("malformed unread count")?;
        Ok(parsed.unread)
    }
}

fn classify_failure(status: StatusCode, body: &str, url: &str) -> ApiError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(url.to_string()),
        _ => ApiError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl ContractGateway for HttpApi {
    #[instrument(skip(self))]
    async fn my_contracts(&self) -> anyhow::Result<Vec<Contract>> {
        decode_contract_list(self.get_json("contract/my").await?)
    }

    #[instrument(skip(self))]
    async fn contract(&self, contract_id: &str) -> anyhow::Result<Contract> {
        decode_contract(self.get_json(&format!("contract/{contract_id}")).await?)
    }

    #[instrument(skip(self))]
    async fn property_contracts(&self, property_id: &str) -> anyhow::Result<Vec<Contract>> {
        decode_contract_list(
            self.get_json(&format!("contract/property/{property_id}"))
                .await?,
        )
    }

    #[instrument(skip(self, draft))]
    async fn create(&self, draft: &ContractDraft) -> anyhow::Result<Contract> {
        decode_contract(self.send_json(Method::POST, "contract", draft).await?)
    }

    #[instrument(skip(self, draft))]
    async fn update(&self, contract_id: &str, draft: &ContractDraft) -> anyhow::Result<Contract> {
        decode_contract(
            self.send_json(Method::PUT, &format!("contract/{contract_id}"), draft)
                .await?,
        )
    }

    #[instrument(skip(self))]
    async fn remove(&self, contract_id: &str) -> anyhow::Result<()> {
        let (builder, url) = self.request(Method::DELETE, &format!("contract/remove/{contract_id}"));
        self.send(builder, url).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn approve(&self, contract_id: &str) -> anyhow::Result<Contract> {
        let path = format!("contract/{contract_id}/approve");
        decode_contract(self.send_json(Method::POST, &path, &json!({})).await?)
    }

    #[instrument(skip(self))]
    async fn reject(&self, contract_id: &str, reason: Option<&str>) -> anyhow::Result<Contract> {
        let path = format!("contract/{contract_id}/reject");
        let body = RejectContractRequest {
            reason: reason.map(str::to_string),
        };
        decode_contract(self.send_json(Method::POST, &path, &body).await?)
    }

    #[instrument(skip(self, signature))]
    async fn sign(
        &self,
        contract_id: &str,
        signature: &SignatureSubmission,
    ) -> anyhow::Result<Contract> {
        let path = format!("contract/{contract_id}/sign");
        decode_contract(self.send_json(Method::POST, &path, signature).await?)
    }

    #[instrument(skip(self))]
    async fn send_reminder(&self, contract_id: &str) -> anyhow::Result<()> {
        let path = format!("contract/{contract_id}/send-reminder");
        self.send_json(Method::POST, &path, &json!({})).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download_pdf(&self, contract_id: &str) -> anyhow::Result<Vec<u8>> {
        let (builder, url) = self.request(Method::POST, &format!("contract/{contract_id}/pdf"));
        let builder = builder.header(ACCEPT, "application/pdf");
        let response = self.send(builder, url.clone()).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ApiError::Transport { url, source })?;
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, bytes))]
    async fn upload_document(
        &self,
        contract_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<Contract> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("document", part);
        let (builder, url) = self.request(
            Method::POST,
            &format!("contract/{contract_id}/upload-document"),
        );
        decode_contract(self.json(builder.multipart(form), url).await?)
    }
}

#[async_trait]
impl SignatureVault for HttpApi {
    async fn stored_signature(&self) -> anyhow::Result<Option<String>> {
        match self.get_json("user/signature").await {
            Ok(payload) => Ok(decode_signature(payload)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_signature(&self, image: &str) -> anyhow::Result<()> {
        let body = SaveSignatureRequest {
            signature_image: image.to_string(),
        };
        self.send_json(Method::POST, "user/signature", &body).await?;
        Ok(())
    }
}
