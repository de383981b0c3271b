use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, multipart};
use serde::{Serialize, de::DeserializeOwned};

use super::{ClientConfig, ClientError};
use crate::models::{
    ApplyBaselineResponse, Baseline, CreateBaselineRequest, CreateProjectRequest,
    CreateTaskDefinitionRequest, CreateTaskRequest, Evidence, LoginRequest, LoginResponse,
    MessageResponse, Project, RegisterResponse, RegisterUserRequest, Role, Task, TaskDefinition,
    UpdateEvidenceRequest, UpdateProjectRequest, UpdateRoleRequest, UpdateTaskRequest, UserProfile,
    UserSummary,
};

/// AuthBackend
///
/// The two calls the session provider needs. `ApiClient` is the real implementation;
/// tests substitute their own.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchanges credentials for an access token.
    async fn login(&self, username: &str, password: &str) -> Result<String, ClientError>;

    /// Resolves the profile the token belongs to (GET /me).
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ClientError>;
}

/// ApiClient
///
/// Thin reqwest wrapper over the REST surface. Unauthenticated calls live here;
/// everything else goes through `authorized(token)`.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    pub async fn register(
        &self,
        req: &RegisterUserRequest,
    ) -> Result<RegisterResponse, ClientError> {
        require("username", &req.username)?;
        require("email", &req.email)?;
        require_secret("password", &req.password)?;
        let resp = self.request(Method::POST, "/auth/register").json(req).send().await?;
        handle_response(resp).await
    }

    /// Binds a token to the client for authenticated calls.
    pub fn authorized(&self, token: impl Into<String>) -> AuthorizedApi {
        AuthorizedApi {
            client: self.clone(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        require("username", username)?;
        require_secret("password", password)?;
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp = self.request(Method::POST, "/auth/login").json(&body).send().await?;
        let LoginResponse { access_token } = handle_response(resp).await?;
        Ok(access_token)
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ClientError> {
        self.authorized(token).me().await
    }
}

/// One file to attach as evidence.
#[derive(Debug, Clone, Default)]
pub struct EvidenceUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub notes: Option<String>,
    pub tool_type: Option<String>,
}

/// AuthorizedApi
///
/// The API as seen by one token. Every request carries `Authorization: Bearer`.
#[derive(Clone)]
pub struct AuthorizedApi {
    client: ApiClient,
    token: String,
}

impl std::fmt::Debug for AuthorizedApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedApi")
            .field("base_url", &self.client.base_url)
            .finish_non_exhaustive()
    }
}

impl AuthorizedApi {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, path).bearer_auth(&self.token)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.request(Method::GET, path).send().await?;
        handle_response(resp).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.request(method, path).json(body).send().await?;
        handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<MessageResponse, ClientError> {
        let resp = self.request(Method::DELETE, path).send().await?;
        handle_response(resp).await
    }

    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        self.get("/me").await
    }

    pub async fn users(&self) -> Result<Vec<UserSummary>, ClientError> {
        self.get("/users").await
    }

    // --- Projects ---

    pub async fn projects(&self) -> Result<Vec<Project>, ClientError> {
        self.get("/projects").await
    }

    pub async fn create_project(&self, req: &CreateProjectRequest) -> Result<Project, ClientError> {
        require("name", &req.name)?;
        self.send_json(Method::POST, "/projects", req).await
    }

    pub async fn project(&self, id: i64) -> Result<Project, ClientError> {
        self.get(&format!("/projects/{id}")).await
    }

    pub async fn update_project(
        &self,
        id: i64,
        req: &UpdateProjectRequest,
    ) -> Result<Project, ClientError> {
        self.send_json(Method::PUT, &format!("/projects/{id}"), req).await
    }

    pub async fn delete_project(&self, id: i64) -> Result<MessageResponse, ClientError> {
        self.delete(&format!("/projects/{id}")).await
    }

    // --- Tasks ---

    pub async fn project_tasks(&self, project_id: i64) -> Result<Vec<Task>, ClientError> {
        self.get(&format!("/projects/{project_id}/tasks")).await
    }

    pub async fn create_task(
        &self,
        project_id: i64,
        req: &CreateTaskRequest,
    ) -> Result<Task, ClientError> {
        require("title", &req.title)?;
        self.send_json(Method::POST, &format!("/projects/{project_id}/tasks"), req)
            .await
    }

    pub async fn task(&self, id: i64) -> Result<Task, ClientError> {
        self.get(&format!("/tasks/{id}")).await
    }

    pub async fn update_task(&self, id: i64, req: &UpdateTaskRequest) -> Result<Task, ClientError> {
        self.send_json(Method::PUT, &format!("/tasks/{id}"), req).await
    }

    // --- Evidence ---

    pub async fn task_evidence(&self, task_id: i64) -> Result<Vec<Evidence>, ClientError> {
        self.get(&format!("/tasks/{task_id}/evidence")).await
    }

    pub async fn add_evidence(
        &self,
        task_id: i64,
        upload: EvidenceUpload,
    ) -> Result<Evidence, ClientError> {
        require("file", &upload.file_name)?;

        let mut part = multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
        if let Some(mime) = upload.mime_type.as_deref() {
            part = part.mime_str(mime)?;
        }
        let mut form = multipart::Form::new().part("file", part);
        if let Some(notes) = upload.notes {
            form = form.text("notes", notes);
        }
        if let Some(tool_type) = upload.tool_type {
            form = form.text("tool_type", tool_type);
        }

        let resp = self
            .request(Method::POST, &format!("/tasks/{task_id}/evidence"))
            .multipart(form)
            .send()
            .await?;
        handle_response(resp).await
    }

    pub async fn evidence(&self, id: i64) -> Result<Evidence, ClientError> {
        self.get(&format!("/evidence/{id}")).await
    }

    /// The verification action. `verified` is only ever changed through this call.
    pub async fn update_evidence(
        &self,
        id: i64,
        req: &UpdateEvidenceRequest,
    ) -> Result<Evidence, ClientError> {
        self.send_json(Method::PUT, &format!("/evidence/{id}"), req).await
    }

    pub async fn delete_evidence(&self, id: i64) -> Result<MessageResponse, ClientError> {
        self.delete(&format!("/evidence/{id}")).await
    }

    pub async fn download_evidence(&self, id: i64) -> Result<Vec<u8>, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/evidence/{id}/download"))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // --- Baselines ---

    pub async fn baselines(&self) -> Result<Vec<Baseline>, ClientError> {
        self.get("/baselines").await
    }

    pub async fn create_baseline(
        &self,
        req: &CreateBaselineRequest,
    ) -> Result<Baseline, ClientError> {
        require("name", &req.name)?;
        self.send_json(Method::POST, "/baselines", req).await
    }

    pub async fn task_definitions(
        &self,
        baseline_id: i64,
    ) -> Result<Vec<TaskDefinition>, ClientError> {
        self.get(&format!("/baselines/{baseline_id}/task_definitions")).await
    }

    pub async fn add_task_definition(
        &self,
        baseline_id: i64,
        req: &CreateTaskDefinitionRequest,
    ) -> Result<TaskDefinition, ClientError> {
        require("title", &req.title)?;
        self.send_json(
            Method::POST,
            &format!("/baselines/{baseline_id}/task_definitions"),
            req,
        )
        .await
    }

    pub async fn apply_baseline(
        &self,
        project_id: i64,
        baseline_id: i64,
    ) -> Result<ApplyBaselineResponse, ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/projects/{project_id}/apply_baseline/{baseline_id}"),
            )
            .send()
            .await?;
        handle_response(resp).await
    }

    // --- Admin ---

    pub async fn update_user_role(
        &self,
        user_id: i64,
        role: Role,
    ) -> Result<UserSummary, ClientError> {
        self.send_json(
            Method::PUT,
            &format!("/admin/users/{user_id}/role"),
            &UpdateRoleRequest { role },
        )
        .await
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation { field });
    }
    Ok(())
}

/// Passwords are sent exactly as typed; only an empty one is refused.
fn require_secret(field: &'static str, value: &str) -> Result<(), ClientError> {
    if value.is_empty() {
        return Err(ClientError::Validation { field });
    }
    Ok(())
}

/// Maps a non-success response to `Api` when the body carries a `msg`, else `Status`.
async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<MessageResponse>(&body) {
        Ok(MessageResponse { msg }) if !msg.is_empty() => Err(ClientError::Api {
            status: status.as_u16(),
            msg,
        }),
        _ => Err(ClientError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
        }),
    }
}

async fn handle_response<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let resp = check_status(resp).await?;
    Ok(resp.json::<T>().await?)
}
