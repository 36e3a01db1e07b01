use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::{fmt, time::Duration};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::permissions_form::PermissionsForm;
use crate::{
    api::{
        error::ErrorBody,
        handlers::{admins::SavePermissionsRequest, auth::login::LoginResponse},
    },
    store::{AdminDetail, Permission},
    APP_USER_AGENT,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum ClientError {
    Http(reqwest::Error),
    /// The server answered with an error envelope (or at least a non-2xx status).
    Api {
        status: StatusCode,
        message: String,
    },
    Url(url::ParseError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(err) => write!(f, "request failed: {err}"),
            Self::Api { message, .. } => f.write_str(message),
            Self::Url(err) => write!(f, "invalid URL: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Url(err) => Some(err),
            Self::Api { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::Url(err)
    }
}

/// Console-side HTTP client. Keeps the session cookie set by login.
#[derive(Clone, Debug)]
pub struct ConsoleClient {
    client: Client,
    base_url: Url,
}

impl ConsoleClient {
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    /// # Errors
    /// Returns [`ClientError::Api`] with the server message on bad credentials.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginResponse, ClientError> {
        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });
        let response = self
            .client
            .post(self.endpoint("/api/login")?)
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    /// # Errors
    /// Returns an error if the request fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.endpoint("/api/logout")?)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    /// # Errors
    /// Returns an error if the admin does not exist or the session lacks rights.
    pub async fn admin(&self, admin_id: Uuid) -> Result<AdminDetail, ClientError> {
        self.get(&format!("/api/admins/{admin_id}")).await
    }

    /// # Errors
    /// Returns an error if the request fails.
    pub async fn permissions(&self) -> Result<Vec<Permission>, ClientError> {
        self.get("/api/permissions").await
    }

    /// # Errors
    /// Returns an error if the server rejects the entries.
    pub async fn save_permissions(
        &self,
        admin_id: Uuid,
        request: &SavePermissionsRequest,
    ) -> Result<AdminDetail, ClientError> {
        self.put(&format!("/api/admins/{admin_id}/permissions"), request)
            .await
    }

    /// Load an admin and the permission catalogue into a fresh form.
    ///
    /// # Errors
    /// Returns an error if either request fails.
    pub async fn load_permissions_form(
        &self,
        admin_id: Uuid,
    ) -> Result<PermissionsForm, ClientError> {
        let (admin, options) = tokio::try_join!(self.admin(admin_id), self.permissions())?;
        Ok(PermissionsForm::new(&admin, options))
    }

    /// Submit the form and fold the outcome back into it.
    pub async fn save(&self, form: &mut PermissionsForm) {
        let request = form.submit();
        let result = self
            .save_permissions(form.admin_id(), &request)
            .await
            .map_err(|err| err.to_string());
        form.apply_save(result);
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.client.get(self.endpoint(path)?).send().await?;
        decode(response).await
    }

    async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .put(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    Ok(check(response).await?.json().await?)
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!("{} - {}", response.url(), status);
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text).map_or_else(
        |_| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        },
        |body| body.message,
    );
    Err(ClientError::Api { status, message })
}
