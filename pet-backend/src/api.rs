use poem_openapi::param::Query;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi, OpenApiService};
use std::sync::Arc;

use crate::config::{AssetConfig, PetConfig};
use crate::registry::Registry;

pub struct Api {
    pub registry: Arc<Registry>,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct PetView {
    pub id: String,
    pub name: String,
    /// Pet artwork, when it has any
    pub image_url: Option<String>,
}

impl From<&PetConfig> for PetView {
    fn from(pet: &PetConfig) -> Self {
        Self {
            id: pet.id.clone(),
            name: pet.name.clone(),
            image_url: pet.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct AssetView {
    pub id: String,
    /// Static image or sprite sheet
    pub url: String,
    pub name: String,
    pub description: String,
    pub action: Option<u32>,
    pub frames: Option<u32>,
    pub attributes: Option<String>,
}

impl From<&AssetConfig> for AssetView {
    fn from(asset: &AssetConfig) -> Self {
        Self {
            id: asset.id.clone(),
            url: asset.url.clone(),
            name: asset.name.clone(),
            description: asset.description.clone(),
            action: asset.action,
            frames: asset.frames,
            attributes: asset.attributes.clone(),
        }
    }
}

#[derive(Debug, Object)]
pub struct UserPetResponse {
    pub pet: PetView,
    /// Equipped assets, in equip order
    pub assets: Vec<AssetView>,
}

#[derive(Debug, Object)]
pub struct PetListResponse {
    pub pets: Vec<PetView>,
}

#[derive(Debug, Object)]
pub struct HealthResponse {
    pub status: String,
    /// Registered owner addresses
    pub owners: usize,
    /// Registered assets
    pub assets: usize,
}

#[derive(Debug, Object)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(ApiResponse)]
pub enum UserPetResult {
    #[oai(status = 200)]
    Ok(Json<UserPetResponse>),
    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),
    #[oai(status = 404)]
    NotFound(Json<ErrorResponse>),
}

#[derive(ApiResponse)]
pub enum PetListResult {
    #[oai(status = 200)]
    Ok(Json<PetListResponse>),
    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),
}

fn error(message: impl Into<String>) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: message.into(),
    })
}

/// Query values that are absent or blank count as missing.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[OpenApi]
impl Api {
    /// A pet and its equipped assets (first pet when `pet` is omitted)
    #[oai(path = "/api/user-pet", method = "get")]
    async fn user_pet(&self, address: Query<Option<String>>, pet: Query<Option<String>>) -> UserPetResult {
        let Some(address) = present(address.0) else {
            return UserPetResult::BadRequest(error("Missing address"));
        };
        let pet = present(pet.0);

        match self.registry.user_pet(&address, pet.as_deref()) {
            Ok(record) => {
                tracing::info!(
                    "Serving pet {} for {} with {} assets",
                    record.pet.id,
                    address,
                    record.assets.len()
                );
                UserPetResult::Ok(Json(UserPetResponse {
                    pet: record.pet.into(),
                    assets: record.assets.into_iter().map(AssetView::from).collect(),
                }))
            }
            Err(e) => {
                tracing::debug!("Lookup for {} failed: {}", address, e);
                UserPetResult::NotFound(error(e.to_string()))
            }
        }
    }

    /// Every pet owned by an address
    #[oai(path = "/api/user-pet-list", method = "get")]
    async fn user_pet_list(&self, address: Query<Option<String>>) -> PetListResult {
        let Some(address) = present(address.0) else {
            return PetListResult::BadRequest(error("Missing address"));
        };

        let pets = self
            .registry
            .pets(&address)
            .into_iter()
            .map(PetView::from)
            .collect();
        PetListResult::Ok(Json(PetListResponse { pets }))
    }

    /// Health check
    #[oai(path = "/health", method = "get")]
    async fn health(&self) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "ok".to_string(),
            owners: self.registry.owner_count(),
            assets: self.registry.asset_count(),
        })
    }
}

pub fn service(registry: Arc<Registry>) -> OpenApiService<Api, ()> {
    OpenApiService::new(Api { registry }, "Pet Backend", "0.1.0")
}
