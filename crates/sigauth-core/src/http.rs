#![cfg(feature = "http")]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::RemoteError;
use crate::protocol::{IdentityTransport, LoginRequest, LoginResponse, NonceResponse, TokenResponse};

/// Identity service reached over HTTP.
///
/// `POST {base}/nonce`, `POST {base}/login` and `POST {base}/token`, JSON
/// bodies in camelCase. Anything but a 2xx fails the step.
#[derive(Clone)]
pub struct HttpIdentityClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NonceBody<'a> {
    public_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody<'a> {
    login_token: &'a str,
}

impl HttpIdentityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, RemoteError> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, resp.text().await.ok()));
        }

        resp.json::<R>()
            .await
            .map_err(|e| RemoteError::BadResponse(e.to_string()))
    }
}

fn status_error(status: StatusCode, body: Option<String>) -> RemoteError {
    RemoteError::Status {
        status: status.as_u16(),
        body: body.unwrap_or_default(),
    }
}

#[async_trait]
impl IdentityTransport for HttpIdentityClient {
    async fn request_nonce(&self, public_key: &str) -> Result<NonceResponse, RemoteError> {
        self.post("nonce", &NonceBody { public_key }).await
    }

    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, RemoteError> {
        self.post("login", request).await
    }

    async fn exchange_token(&self, login_token: &str) -> Result<TokenResponse, RemoteError> {
        self.post("token", &TokenBody { login_token }).await
    }
}
