//! HTTP implementation of [`AccessControl`] over the Cloudflare v4 API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use super::{
    AccessApp, AccessAppRequest, AccessControl, AccessPolicy, AccessPolicyRequest,
    CloudflareError,
};

/// Page size used when listing applications and policies
const PER_PAGE: u32 = 100;

/// Standard Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    total_pages: u32,
}

fn describe(errors: &[ApiMessage]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Cloudflare Access client scoped to one account
#[derive(Clone)]
pub struct CloudflareClient {
    api_base: String,
    account_id: String,
    token: Zeroizing<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl CloudflareClient {
    /// Create a client for `account_id` against `api_base`
    pub fn new(
        api_base: impl Into<String>,
        account_id: impl Into<String>,
        token: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self, CloudflareError> {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CloudflareError::Transport {
                method: "-".to_string(),
                path: api_base.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            api_base,
            account_id: account_id.into(),
            token,
            http,
        })
    }

    fn apps_path(&self) -> String {
        format!("/accounts/{}/access/apps", self.account_id)
    }

    fn app_path(&self, app_id: &str) -> String {
        format!("{}/{}", self.apps_path(), app_id)
    }

    fn policies_path(&self, app_id: &str) -> String {
        format!("{}/policies", self.app_path(app_id))
    }

    /// Send a request and unwrap the response envelope
    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, u32)],
        body: Option<&B>,
    ) -> Result<Envelope<T>, CloudflareError> {
        let transport = |e: reqwest::Error| CloudflareError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            message: e.to_string(),
        };

        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.api_base, path))
            .bearer_auth(self.token.as_str());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(method = %method, path = %path, "Calling Cloudflare");
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        let envelope: Result<Envelope<T>, _> = serde_json::from_str(&text);

        if !status.is_success() {
            let message = match &envelope {
                Ok(env) if !env.errors.is_empty() => describe(&env.errors),
                _ => text,
            };
            return Err(CloudflareError::api(
                method.as_str(),
                path,
                status.as_u16(),
                message,
            ));
        }

        let envelope = envelope.map_err(|e| CloudflareError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        if !envelope.success {
            return Err(CloudflareError::api(
                method.as_str(),
                path,
                status.as_u16(),
                describe(&envelope.errors),
            ));
        }
        Ok(envelope)
    }

    async fn fetch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, CloudflareError> {
        self.call(method, path, &[], body)
            .await?
            .result
            .ok_or_else(|| CloudflareError::Decode {
                path: path.to_string(),
                message: "response has no result".to_string(),
            })
    }

    /// Read an object, mapping 404 to `None`
    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, CloudflareError> {
        match self.fetch::<(), T>(Method::GET, path, None).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List every item of a paginated collection
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, CloudflareError> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let envelope: Envelope<Vec<T>> = self
                .call(
                    Method::GET,
                    path,
                    &[("page", page), ("per_page", PER_PAGE)],
                    None::<&()>,
                )
                .await?;

            let batch = envelope.result.unwrap_or_default();
            let exhausted = batch.is_empty()
                || match envelope.result_info {
                    Some(info) => info.page.max(page) >= info.total_pages,
                    None => true,
                };
            items.extend(batch);

            if exhausted {
                return Ok(items);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl AccessControl for CloudflareClient {
    async fn find_access_app_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<AccessApp>, CloudflareError> {
        let apps: Vec<AccessApp> = self.list_all(&self.apps_path()).await?;
        Ok(apps.into_iter().find(|app| app.domain == domain))
    }

    async fn get_access_app(&self, app_id: &str) -> Result<Option<AccessApp>, CloudflareError> {
        self.fetch_optional(&self.app_path(app_id)).await
    }

    async fn create_access_app(
        &self,
        request: &AccessAppRequest,
    ) -> Result<AccessApp, CloudflareError> {
        self.fetch(Method::POST, &self.apps_path(), Some(request))
            .await
    }

    async fn update_access_app(
        &self,
        app_id: &str,
        request: &AccessAppRequest,
    ) -> Result<(), CloudflareError> {
        self.call::<_, serde_json::Value>(Method::PUT, &self.app_path(app_id), &[], Some(request))
            .await
            .map(|_| ())
    }

    async fn delete_access_app(&self, app_id: &str) -> Result<(), CloudflareError> {
        match self
            .call::<(), serde_json::Value>(Method::DELETE, &self.app_path(app_id), &[], None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_access_policy(
        &self,
        app_id: &str,
        policy_id: &str,
    ) -> Result<Option<AccessPolicy>, CloudflareError> {
        let path = format!("{}/{}", self.policies_path(app_id), policy_id);
        self.fetch_optional(&path).await
    }

    async fn find_access_policy_by_name(
        &self,
        app_id: &str,
        name: &str,
    ) -> Result<Option<AccessPolicy>, CloudflareError> {
        let policies: Vec<AccessPolicy> = self.list_all(&self.policies_path(app_id)).await?;
        Ok(policies.into_iter().find(|p| p.name == name))
    }

    async fn create_access_policy(
        &self,
        app_id: &str,
        request: &AccessPolicyRequest,
    ) -> Result<AccessPolicy, CloudflareError> {
        self.fetch(Method::POST, &self.policies_path(app_id), Some(request))
            .await
    }

    async fn update_access_policy(
        &self,
        app_id: &str,
        policy_id: &str,
        request: &AccessPolicyRequest,
    ) -> Result<(), CloudflareError> {
        let path = format!("{}/{}", self.policies_path(app_id), policy_id);
        self.call::<_, serde_json::Value>(Method::PUT, &path, &[], Some(request))
            .await
            .map(|_| ())
    }
}
