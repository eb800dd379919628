use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{InteractionLimit, InteractionRestriction, InteractionsApi, RestrictionExpiry};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let user_agent = format!("burstguard/{}", env!("CARGO_PKG_VERSION"));
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            header::HeaderValue::from_static(API_VERSION),
        );
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context("Failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn limits_url(&self) -> String {
        format!("{}/user/interaction-limits", self.base_url)
    }
}

#[async_trait]
impl InteractionsApi for GitHubClient {
    async fn current_restriction(&self) -> Result<Option<InteractionRestriction>> {
        // An empty object is returned when nothing is in place.
        #[derive(Deserialize)]
        struct RawRestriction {
            limit: Option<InteractionLimit>,
            origin: Option<String>,
            expires_at: Option<chrono::DateTime<chrono::Utc>>,
        }

        let url = self.limits_url();
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("GitHub interaction-limits request failed")?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .context("Failed to read GitHub interaction-limits body")?;
        if !status.is_success() {
            return Err(anyhow!(
                "GET {} failed (status {}): {}",
                url,
                status,
                String::from_utf8_lossy(&bytes)
            ));
        }
        if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let raw: RawRestriction = serde_json::from_slice(&bytes)
            .context("Failed to parse GitHub interaction-limits JSON")?;
        debug!(limit = ?raw.limit, expires_at = ?raw.expires_at, "Current interaction limit");
        Ok(raw.limit.map(|limit| InteractionRestriction {
            limit,
            origin: raw.origin,
            expires_at: raw.expires_at,
        }))
    }

    async fn set_restriction(
        &self,
        limit: InteractionLimit,
        expiry: RestrictionExpiry,
    ) -> Result<()> {
        let url = self.limits_url();
        let res = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "limit": limit, "expiry": expiry }))
            .send()
            .await
            .context("GitHub set interaction-limits request failed")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("PUT {} failed (status {}): {}", url, status, text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded {
        current: Arc<Mutex<Option<Value>>>,
        puts: Arc<Mutex<Vec<Value>>>,
        auth: Arc<Mutex<Vec<String>>>,
    }

    async fn get_limits(
        State(rec): State<Recorded>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        use axum::response::IntoResponse;
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            rec.auth.lock().unwrap().push(auth.to_string());
        }
        match rec.current.lock().unwrap().clone() {
            Some(body) => Json(body).into_response(),
            None => axum::http::StatusCode::NO_CONTENT.into_response(),
        }
    }

    async fn put_limits(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
        rec.puts.lock().unwrap().push(body.clone());
        Json(body)
    }

    async fn serve(rec: Recorded) -> String {
        let app = Router::new()
            .route("/user/interaction-limits", get(get_limits).put(put_limits))
            .with_state(rec);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn reads_missing_and_present_restrictions() {
        let rec = Recorded::default();
        let base = serve(rec.clone()).await;
        let client = GitHubClient::new(&base, "ghp_token", Duration::from_secs(5)).unwrap();

        assert_eq!(client.current_restriction().await.unwrap(), None);

        *rec.current.lock().unwrap() = Some(serde_json::json!({}));
        assert_eq!(client.current_restriction().await.unwrap(), None);

        *rec.current.lock().unwrap() = Some(serde_json::json!({
            "limit": "existing_users",
            "origin": "user",
            "expires_at": "2026-10-17T10:00:00Z"
        }));
        let current = client.current_restriction().await.unwrap().unwrap();
        assert_eq!(current.limit, InteractionLimit::ExistingUsers);
        assert_eq!(current.origin.as_deref(), Some("user"));

        assert!(rec
            .auth
            .lock()
            .unwrap()
            .iter()
            .all(|a| a == "Bearer ghp_token"));
    }

    #[tokio::test]
    async fn puts_limit_and_expiry() {
        let rec = Recorded::default();
        let base = serve(rec.clone()).await;
        let client = GitHubClient::new(&base, "ghp_token", Duration::from_secs(5)).unwrap();

        client
            .set_restriction(InteractionLimit::CollaboratorsOnly, RestrictionExpiry::ThreeDays)
            .await
            .unwrap();
        assert_eq!(
            *rec.puts.lock().unwrap(),
            vec![serde_json::json!({ "limit": "collaborators_only", "expiry": "three_days" })]
        );
    }

    #[tokio::test]
    async fn surfaces_http_errors() {
        let client =
            GitHubClient::new("http://127.0.0.1:9", "ghp_token", Duration::from_secs(1)).unwrap();
        assert!(client.current_restriction().await.is_err());
        assert!(client
            .set_restriction(InteractionLimit::ExistingUsers, RestrictionExpiry::OneDay)
            .await
            .is_err());
    }
}
