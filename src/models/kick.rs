use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for removing a participant from a live room
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KickResponse {
    pub room_id: String,
    pub user_id: String,
    pub kicked: bool,
}
