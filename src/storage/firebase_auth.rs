//! Firebase Authentication REST client (email/password)

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{StorageError, StorageResult};
use crate::config::FirebaseConfig;

/// Authenticated Firebase user
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub local_id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Sign-in and sign-up against the identity toolkit
#[derive(Clone)]
pub struct FirebaseAuth {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FirebaseAuth {
    pub fn new(config: &FirebaseConfig) -> Self {
        let base_url = match &config.auth_emulator_host {
            Some(host) => format!("http://{}/identitytoolkit.googleapis.com/v1", host),
            None => "https://identitytoolkit.googleapis.com/v1".to_string(),
        };
        Self::with_base_url(Client::new(), base_url, config.api_key.clone())
    }

    pub fn with_base_url(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// `None` when the provider rejects the credentials
    pub async fn sign_in(&self, email: &str, password: &str) -> StorageResult<Option<AuthUser>> {
        match self.call("accounts:signInWithPassword", email, password).await {
            Ok(user) => Ok(Some(user)),
            Err(AuthFailure::Rejected(code)) if is_credential_rejection(&code) => {
                tracing::info!(email, code = %code, "Sign-in rejected");
                Ok(None)
            }
            Err(AuthFailure::Rejected(code)) => Err(StorageError::Auth(code)),
            Err(AuthFailure::Transport(e)) => Err(e),
        }
    }

    /// Register a new user, mapping provider codes to readable messages
    pub async fn sign_up(&self, email: &str, password: &str) -> StorageResult<AuthUser> {
        match self.call("accounts:signUp", email, password).await {
            Ok(user) => Ok(user),
            Err(AuthFailure::Rejected(code)) => Err(StorageError::Auth(sign_up_message(&code))),
            Err(AuthFailure::Transport(e)) => Err(e),
        }
    }

    async fn call(&self, method: &str, email: &str, password: &str) -> Result<AuthUser, AuthFailure> {
        let url = format!("{}/{}?key={}", self.base_url, method, self.api_key);
        let response = self
            .client
            .post(&url)
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AuthFailure::Transport(StorageError::Request(e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => Err(AuthFailure::Rejected(envelope.error.message)),
                Err(_) => Err(AuthFailure::Transport(StorageError::Api { status, body })),
            };
        }

        response
            .json()
            .await
            .map_err(|e| AuthFailure::Transport(StorageError::Request(e)))
    }
}

enum AuthFailure {
    /// Provider answered with an error code such as `EMAIL_EXISTS`
    Rejected(String),
    Transport(StorageError),
}

fn error_code(message: &str) -> &str {
    // Codes may carry a detail suffix: "WEAK_PASSWORD : Password should be..."
    message.split(':').next().unwrap_or(message).trim()
}

fn is_credential_rejection(message: &str) -> bool {
    matches!(
        error_code(message),
        "EMAIL_NOT_FOUND"
            | "INVALID_PASSWORD"
            | "INVALID_LOGIN_CREDENTIALS"
            | "INVALID_EMAIL"
            | "USER_DISABLED"
    )
}

fn sign_up_message(message: &str) -> String {
    match error_code(message) {
        "EMAIL_EXISTS" => "El correo electrónico ya está en uso".to_string(),
        "WEAK_PASSWORD" => "La contraseña debe tener al menos 6 caracteres".to_string(),
        "INVALID_EMAIL" | "MISSING_EMAIL" => "El correo electrónico no es válido".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_identity_toolkit() -> String {
        let app = Router::new().route(
            "/v1/:method",
            post(|Path(method): Path<String>, Json(body): Json<Value>| async move {
                let email = body["email"].as_str().unwrap_or_default().to_string();
                let password = body["password"].as_str().unwrap_or_default().to_string();
                let error = |message: &str| {
                    (StatusCode::BAD_REQUEST, Json(json!({"error": {"code": 400, "message": message}})))
                };
                match method.as_str() {
                    "accounts:signInWithPassword" if password == "admin" => {
                        (StatusCode::OK, Json(json!({"localId": "uid-1", "email": email})))
                    }
                    "accounts:signInWithPassword" => error("INVALID_LOGIN_CREDENTIALS"),
                    "accounts:signUp" if email == "taken@sigep.cl" => error("EMAIL_EXISTS"),
                    "accounts:signUp" if password.len() < 6 => {
                        error("WEAK_PASSWORD : Password should be at least 6 characters")
                    }
                    "accounts:signUp" => (StatusCode::OK, Json(json!({"localId": "uid-2", "email": email}))),
                    _ => error("OPERATION_NOT_ALLOWED"),
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    async fn auth() -> FirebaseAuth {
        FirebaseAuth::with_base_url(Client::new(), spawn_identity_toolkit().await, "key".to_string())
    }

    #[tokio::test]
    async fn test_sign_in_accepts_and_rejects() {
        let auth = auth().await;

        let user = auth.sign_in("admin@sigep.cl", "admin").await.unwrap().unwrap();
        assert_eq!(user.local_id, "uid-1");
        assert_eq!(user.email, "admin@sigep.cl");

        assert!(auth.sign_in("admin@sigep.cl", "wrong").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_maps_provider_codes() {
        let auth = auth().await;

        let user = auth.sign_up("new@sigep.cl", "secret1").await.unwrap();
        assert_eq!(user.local_id, "uid-2");

        match auth.sign_up("taken@sigep.cl", "secret1").await {
            Err(StorageError::Auth(msg)) => assert_eq!(msg, "El correo electrónico ya está en uso"),
            other => panic!("unexpected: {:?}", other),
        }
        match auth.sign_up("new@sigep.cl", "123").await {
            Err(StorageError::Auth(msg)) => assert!(msg.contains("6 caracteres")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_error_codes_drop_detail_suffix() {
        assert_eq!(error_code("WEAK_PASSWORD : too short"), "WEAK_PASSWORD");
        assert!(is_credential_rejection("INVALID_PASSWORD"));
        assert!(!is_credential_rejection("QUOTA_EXCEEDED"));
    }
}
