use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// The business-record tables owned by a license. The merge engine reassigns
/// ownership across every one of these; their row contents are otherwise
/// opaque to this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessTable {
    SavedTours,
    Trips,
    Clients,
    Quotes,
    Vehicles,
    Drivers,
    Charges,
    Trailers,
}

impl BusinessTable {
    pub const ALL: [BusinessTable; 8] = [
        BusinessTable::SavedTours,
        BusinessTable::Trips,
        BusinessTable::Clients,
        BusinessTable::Quotes,
        BusinessTable::Vehicles,
        BusinessTable::Drivers,
        BusinessTable::Charges,
        BusinessTable::Trailers,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            BusinessTable::SavedTours => "saved_tours",
            BusinessTable::Trips => "trips",
            BusinessTable::Clients => "clients",
            BusinessTable::Quotes => "quotes",
            BusinessTable::Vehicles => "user_vehicles",
            BusinessTable::Drivers => "user_drivers",
            BusinessTable::Charges => "user_charges",
            BusinessTable::Trailers => "user_trailers",
        }
    }
}

/// Common shape shared by all business tables: ownership columns plus an
/// opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BusinessRecord {
    pub id: Uuid,
    pub license_id: Uuid,
    pub identity_id: Option<Uuid>,
    pub name: Option<String>,
    pub revenue: Option<f64>,
    pub distance_km: Option<f64>,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// Aggregated revenue/distance for one table scope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageTotals {
    pub revenue: f64,
    pub distance_km: f64,
}
