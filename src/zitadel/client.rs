//! HTTP implementation of [`IdentityProvider`] over the Zitadel Management API v1

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use super::{App, AppConfig, AppUpdate, CreatedApp, IdentityProvider, Project, Role, ZitadelError};

const TEXT_QUERY_METHOD_EQUALS: &str = "TEXT_QUERY_METHOD_EQUALS";

/// Search body with optional exact-name filter
#[derive(Debug, Default, Serialize)]
struct SearchRequest<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    queries: Vec<SearchQuery<'a>>,
}

impl<'a> SearchRequest<'a> {
    fn by_name(name: &'a str) -> Self {
        Self {
            queries: vec![SearchQuery {
                name_query: NameQuery {
                    name,
                    method: TEXT_QUERY_METHOD_EQUALS,
                },
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery<'a> {
    name_query: NameQuery<'a>,
}

#[derive(Debug, Serialize)]
struct NameQuery<'a> {
    name: &'a str,
    method: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ProjectRecord {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleRecord {
    key: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    oidc_config: Option<OidcConfigRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OidcConfigRecord {
    #[serde(default)]
    client_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAppResponse {
    app_id: String,
    client_id: String,
    #[serde(default)]
    client_secret: String,
}

/// Zitadel Management API client authenticated with a personal access token
#[derive(Clone)]
pub struct ZitadelClient {
    base_url: String,
    token: Zeroizing<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for ZitadelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZitadelClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl ZitadelClient {
    /// Create a client for the Zitadel instance at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        token: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self, ZitadelError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ZitadelError::Transport {
                method: "-".to_string(),
                path: base_url.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url,
            token,
            http,
        })
    }

    /// Send a request and return the raw body of a successful response
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String, ZitadelError> {
        let transport = |e: reqwest::Error| ZitadelError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            message: e.to_string(),
        };

        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .bearer_auth(self.token.as_str())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(method = %method, path = %path, "Calling Zitadel");
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ZitadelError::api(
                method.as_str(),
                path,
                status.as_u16(),
                text,
            ));
        }
        Ok(text)
    }

    async fn call<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, ZitadelError> {
        let text = self.send(method, path, body).await?;
        serde_json::from_str(&text).map_err(|e| ZitadelError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for ZitadelClient {
    async fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, ZitadelError> {
        let response: SearchResponse<ProjectRecord> = self
            .call(
                Method::POST,
                "/management/v1/projects/_search",
                Some(&SearchRequest::by_name(name)),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| Project {
                id: p.id,
                name: p.name,
            }))
    }

    async fn list_project_roles(&self, project_id: &str) -> Result<Vec<Role>, ZitadelError> {
        let path = format!("/management/v1/projects/{project_id}/roles/_search");
        let response: SearchResponse<RoleRecord> = self
            .call(Method::POST, &path, Some(&SearchRequest::default()))
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|r| Role {
                key: r.key,
                display_name: r.display_name,
            })
            .collect())
    }

    async fn find_app_by_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<Option<App>, ZitadelError> {
        let path = format!("/management/v1/projects/{project_id}/apps/_search");
        let response: SearchResponse<AppRecord> = self
            .call(Method::POST, &path, Some(&SearchRequest::by_name(name)))
            .await?;

        Ok(response
            .result
            .into_iter()
            .find(|a| a.name == name)
            .map(|a| App {
                id: a.id,
                client_id: a.oidc_config.map(|c| c.client_id).unwrap_or_default(),
            }))
    }

    async fn create_app(
        &self,
        project_id: &str,
        config: &AppConfig,
    ) -> Result<CreatedApp, ZitadelError> {
        let path = format!("/management/v1/projects/{project_id}/apps/oidc");
        let response: CreateAppResponse = self.call(Method::POST, &path, Some(config)).await?;

        Ok(CreatedApp {
            id: response.app_id,
            client_id: response.client_id,
            client_secret: Zeroizing::new(response.client_secret),
        })
    }

    async fn update_app(
        &self,
        project_id: &str,
        app_id: &str,
        config: &AppConfig,
    ) -> Result<AppUpdate, ZitadelError> {
        let path = format!("/management/v1/projects/{project_id}/apps/{app_id}/oidc_config");
        match self.send(Method::PUT, &path, Some(config)).await {
            Ok(_) => Ok(AppUpdate::Updated),
            Err(e) if e.is_no_changes() => Ok(AppUpdate::Unchanged),
            Err(e) if e.is_not_found() => Ok(AppUpdate::NotFound),
            Err(e) => Err(e),
        }
    }

    async fn delete_app(&self, project_id: &str, app_id: &str) -> Result<(), ZitadelError> {
        let path = format!("/management/v1/projects/{project_id}/apps/{app_id}");
        match self.send::<()>(Method::DELETE, &path, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
