use super::{sort_by_last_activity, SessionSummary, SessionsResponse, UserInfo};
use crate::settings::ClientSettings;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    RequestError(String),
    #[error("API error: status {0}")]
    StatusError(u16),
    #[error("Invalid response: {0}")]
    DecodeError(String),
    #[error("No access token available")]
    MissingToken,
}

/// REST side of the backend. Every call authenticates with the token
/// passed as the `token` query parameter.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(settings: &ClientSettings) -> Self {
        Self::with_base_url(&settings.api_url)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, token: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| ApiError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::StatusError(response.status().as_u16()));
        }

        Ok(response)
    }

    /// Fetch the profile behind `token`.
    ///
    /// Any failure (transport, non-2xx, undecodable body) collapses to `None`;
    /// callers only care whether the token still resolves to a user.
    pub async fn get_user_infos(&self, token: &str) -> Option<UserInfo> {
        let response = match self.get("/user", token).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("User info request failed: {}", e);
                return None;
            }
        };

        match response.json::<UserInfo>().await {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("User info response could not be decoded: {}", e);
                None
            }
        }
    }

    /// List the caller's sessions, newest activity first.
    pub async fn list_sessions(&self, token: &str) -> Result<Vec<SessionSummary>, ApiError> {
        let response = self.get("/sessions", token).await?;

        let body: SessionsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::DecodeError(e.to_string()))?;

        let mut sessions = body.sessions;
        sort_by_last_activity(&mut sessions);
        Ok(sessions)
    }

    pub async fn get_session(&self, token: &str, id: i64) -> Result<SessionSummary, ApiError> {
        let response = self.get(&format!("/sessions/{}", id), token).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::DecodeError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, ApiClient) {
        let server = MockServer::start().await;
        let client = ApiClient::with_base_url(&server.uri());
        (server, client)
    }

    #[tokio::test]
    async fn test_get_user_infos_success() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(query_param("token", "jwt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "u1", "email": "a@b.c"})),
            )
            .mount(&server)
            .await;

        let info = client.get_user_infos("jwt").await.unwrap();
        assert_eq!(info.email(), Some("a@b.c"));
    }

    #[tokio::test]
    async fn test_get_user_infos_collapses_errors() {
        let (server, client) = setup().await;

        for status in [401u16, 404, 500] {
            server.reset().await;
            Mock::given(method("GET"))
                .and(path("/user"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            assert!(client.get_user_infos("jwt").await.is_none());
        }
    }

    #[tokio::test]
    async fn test_get_user_infos_unreachable() {
        let client = ApiClient::with_base_url("http://127.0.0.1:1");
        assert!(client.get_user_infos("jwt").await.is_none());
    }

    #[tokio::test]
    async fn test_list_sessions_sorted() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/sessions"))
            .and(query_param("token", "jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sessions": [
                    {"id": 1, "created_at": "2024-03-01 10:00:00", "last_activity_at": "2024-03-02 10:00:00"},
                    {"id": 2, "created_at": "2024-03-01 10:00:00", "last_activity_at": "2024-03-08 10:00:00"},
                    {"id": 3, "created_at": "2024-03-01 10:00:00", "last_activity_at": "2024-03-05 10:00:00"}
                ]
            })))
            .mount(&server)
            .await;

        let sessions = client.list_sessions("jwt").await.unwrap();
        let ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_list_sessions_status_error() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client.list_sessions("jwt").await;
        assert!(matches!(result, Err(ApiError::StatusError(500))));
    }

    #[tokio::test]
    async fn test_get_session() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/sessions/7"))
            .and(query_param("token", "jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 7,
                "title": "Draft",
                "created_at": "2024-03-01T10:00:00",
                "last_activity_at": "2024-03-02T10:00:00",
                "is_open": true
            })))
            .mount(&server)
            .await;

        let session = client.get_session("jwt", 7).await.unwrap();
        assert_eq!(session.id, 7);
        assert!(session.is_open);
    }
}
