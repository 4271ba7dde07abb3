// Pet-data backend client
// All network I/O of the extension goes through here

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::error::FetchError;
use crate::types::{Asset, Pet, PetData};

#[async_trait]
pub trait PetBackend: Send + Sync {
    /// `GET /api/user-pet`. Without `pet_id` the backend picks the owner's first pet.
    async fn fetch_pet_data(&self, address: &str, pet_id: Option<&str>)
        -> Result<PetData, FetchError>;

    /// `GET /api/user-pet-list`.
    async fn fetch_pet_list(&self, address: &str) -> Result<Vec<Pet>, FetchError>;
}

#[derive(Deserialize)]
struct PetDataBody {
    pet: Option<Pet>,
    assets: Option<Vec<Asset>>,
}

#[derive(Deserialize)]
struct PetListBody {
    #[serde(default)]
    pets: Option<Vec<Pet>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, FetchError> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                secs: self.timeout.as_secs().max(1),
            }
        } else {
            FetchError::Network(e.to_string())
        }
    }

    /// GET `path` and return the status with the raw body. Non-2xx becomes a
    /// backend error carrying the body's `error` field when it has one.
    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        fallback: &str,
    ) -> Result<(u16, String), FetchError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, query);

        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| fallback.to_string());
            tracing::warn!("{} returned {}: {}", path, status, message);
            return Err(FetchError::backend(Some(status.as_u16()), message));
        }

        Ok((status.as_u16(), body))
    }
}

#[async_trait]
impl PetBackend for HttpBackend {
    async fn fetch_pet_data(
        &self,
        address: &str,
        pet_id: Option<&str>,
    ) -> Result<PetData, FetchError> {
        let mut query = vec![("address", address)];
        if let Some(pet) = pet_id {
            query.push(("pet", pet));
        }

        let (status, body) = self
            .get("/api/user-pet", &query, "Failed to fetch pet data")
            .await?;

        let parsed: PetDataBody = serde_json::from_str(&body).map_err(|e| {
            FetchError::backend(Some(status), format!("Malformed pet data: {}", e))
        })?;

        match (parsed.pet, parsed.assets) {
            (Some(pet), Some(assets)) => Ok(PetData { pet, assets }),
            _ => Err(FetchError::backend(Some(status), "Invalid data from backend")),
        }
    }

    async fn fetch_pet_list(&self, address: &str) -> Result<Vec<Pet>, FetchError> {
        let (status, body) = self
            .get(
                "/api/user-pet-list",
                &[("address", address)],
                "Failed to fetch pets",
            )
            .await?;

        let parsed: PetListBody = serde_json::from_str(&body).map_err(|e| {
            FetchError::backend(Some(status), format!("Malformed pet list: {}", e))
        })?;

        Ok(parsed.pets.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poem::http::StatusCode;
    use poem::listener::{Acceptor, Listener, TcpListener};
    use poem::web::Query;
    use poem::{get, handler, Response, Route, Server};
    use std::collections::HashMap;

    fn json_response(status: StatusCode, body: &str) -> Response {
        Response::builder()
            .status(status)
            .content_type("application/json")
            .body(body.to_string())
    }

    #[handler]
    fn user_pet(Query(params): Query<HashMap<String, String>>) -> Response {
        match (params.get("address").map(String::as_str), params.get("pet").map(String::as_str)) {
            (None, _) => json_response(StatusCode::BAD_REQUEST, r#"{"error":"Missing address"}"#),
            (Some("0xowner"), Some("p1")) | (Some("0xowner"), None) => json_response(
                StatusCode::OK,
                r#"{"pet":{"id":"p1","name":"Fluffy","imageUrl":null},
                    "assets":[{"id":"a1","url":"http://x/a1.png","name":"Hat","description":"A hat"}]}"#,
            ),
            (Some("0xowner"), Some(_)) => {
                json_response(StatusCode::NOT_FOUND, r#"{"error":"Pet not found for user."}"#)
            }
            (Some("0xhalf"), _) => json_response(StatusCode::OK, r#"{"pet":{"id":"p1","name":"Fluffy"}}"#),
            (Some("0xgarbage"), _) => json_response(StatusCode::OK, "<html>oops</html>"),
            (Some("0xcrash"), _) => json_response(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            _ => json_response(
                StatusCode::NOT_FOUND,
                r#"{"error":"No pets found for this address."}"#,
            ),
        }
    }

    #[handler]
    fn user_pet_list(Query(params): Query<HashMap<String, String>>) -> Response {
        match params.get("address").map(String::as_str) {
            Some("0xowner") => json_response(
                StatusCode::OK,
                r#"{"pets":[{"id":"p1","name":"Fluffy"},{"id":"p2","name":"Rex","imageUrl":"http://x/rex.png"}]}"#,
            ),
            Some(_) => json_response(StatusCode::OK, r#"{}"#),
            None => json_response(StatusCode::BAD_REQUEST, r#"{"error":"Missing address"}"#),
        }
    }

    #[handler]
    async fn slow() -> Response {
        tokio::time::sleep(Duration::from_secs(5)).await;
        json_response(StatusCode::OK, "{}")
    }

    async fn serve() -> String {
        let app = Route::new()
            .at("/api/user-pet", get(user_pet))
            .at("/api/user-pet-list", get(user_pet_list))
            .at("/slow/api/user-pet", get(slow));

        let acceptor = TcpListener::bind("127.0.0.1:0")
            .into_acceptor()
            .await
            .unwrap();
        let addr = *acceptor.local_addr()[0].as_socket_addr().unwrap();
        tokio::spawn(Server::new_with_acceptor(acceptor).run(app));

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_pet_data_success() {
        let backend = HttpBackend::new(serve().await, Duration::from_secs(5)).unwrap();

        let data = backend.fetch_pet_data("0xowner", Some("p1")).await.unwrap();

        assert_eq!(data.pet.name, "Fluffy");
        assert_eq!(data.pet.image_url, None);
        assert_eq!(data.assets.len(), 1);
        assert_eq!(data.assets[0].url, "http://x/a1.png");
    }

    #[tokio::test]
    async fn test_not_found_surfaces_backend_message() {
        let backend = HttpBackend::new(serve().await, Duration::from_secs(5)).unwrap();

        let err = backend.fetch_pet_data("0xowner", Some("p9")).await.unwrap_err();

        assert_eq!(err, FetchError::backend(Some(404), "Pet not found for user."));
        assert_eq!(err.to_string(), "Pet not found for user.");
    }

    #[tokio::test]
    async fn test_error_without_json_body_uses_fallback() {
        let backend = HttpBackend::new(serve().await, Duration::from_secs(5)).unwrap();

        let err = backend.fetch_pet_data("0xcrash", None).await.unwrap_err();

        assert_eq!(err, FetchError::backend(Some(500), "Failed to fetch pet data"));
    }

    #[tokio::test]
    async fn test_incomplete_or_malformed_body_is_rejected() {
        let backend = HttpBackend::new(serve().await, Duration::from_secs(5)).unwrap();

        let err = backend.fetch_pet_data("0xhalf", None).await.unwrap_err();
        assert_eq!(err, FetchError::backend(Some(200), "Invalid data from backend"));

        let err = backend.fetch_pet_data("0xgarbage", None).await.unwrap_err();
        assert!(matches!(err, FetchError::Backend { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let base = format!("{}/slow", serve().await);
        let backend = HttpBackend::new(base, Duration::from_millis(200)).unwrap();

        let err = backend.fetch_pet_data("0xowner", None).await.unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let backend = HttpBackend::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();

        let err = backend.fetch_pet_data("0xowner", None).await.unwrap_err();

        assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_pet_list() {
        let backend = HttpBackend::new(serve().await, Duration::from_secs(5)).unwrap();

        let pets = backend.fetch_pet_list("0xowner").await.unwrap();
        assert_eq!(pets.len(), 2);
        assert_eq!(pets[1].image_url.as_deref(), Some("http://x/rex.png"));

        let pets = backend.fetch_pet_list("0xnobody").await.unwrap();
        assert!(pets.is_empty());
    }
}
