// Extension message protocol
// Requests carry a typed response; broadcasts have no reply

use serde::{Deserialize, Serialize};

use crate::types::PetData;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PetSelection {
    pub sui_address: String,
    pub pet_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Persist the selection, then fetch.
    SaveAddressAndFetch(PetSelection),
    /// Refresh without touching the stored selection.
    FetchPetData(PetSelection),
    GetPetData,
    ToggleVisibility,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::SaveAddressAndFetch(_) => "SAVE_ADDRESS_AND_FETCH",
            Request::FetchPetData(_) => "FETCH_PET_DATA",
            Request::GetPetData => "GET_PET_DATA",
            Request::ToggleVisibility => "TOGGLE_VISIBILITY",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredPetData {
    pub pet_data: PetData,
    pub sui_address: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayload {
    pub sui_address: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<StoredPetData>,
    },
    Pending {
        payload: PendingPayload,
    },
    Nodata,
    Error {
        message: String,
    },
    VisibilityToggled {
        #[serde(rename = "isVisible")]
        is_visible: bool,
    },
}

impl Response {
    pub fn success() -> Self {
        Response::Success { payload: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Broadcast {
    PetDataUpdated(PetData),
    PetDataError(String),
}
