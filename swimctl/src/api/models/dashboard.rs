//! API response model for the admin dashboard.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub students: i64,
    pub active_entitlements: i64,
    pub todays_bookings: i64,
    pub pending_students: i64,
}
