use futures::future::try_join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::{BusinessTable, MemberRole, Membership};
use crate::database::store::{Stores, StoreResult};

/// Per-member usage statistics for the admin company panel.
#[derive(Debug, Clone, Serialize)]
pub struct MemberStats {
    pub membership_id: Uuid,
    pub identity_id: Option<Uuid>,
    pub email: String,
    pub display_name: Option<String>,
    pub role: MemberRole,
    pub tours_count: i64,
    pub trips_count: i64,
    pub clients_count: i64,
    pub quotes_count: i64,
    pub vehicles_count: i64,
    pub drivers_count: i64,
    pub charges_count: i64,
    pub total_revenue: f64,
    pub total_distance: f64,
    pub last_activity_at: Option<chrono::DateTime<chrono::Utc>>,
    pub accepted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Whole-company usage rollup.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyTotals {
    pub tours: i64,
    pub trips: i64,
    pub clients: i64,
    pub quotes: i64,
    pub vehicles: i64,
    pub drivers: i64,
    pub charges: i64,
    pub revenue: f64,
    pub distance: f64,
}

/// Per-identity record counts for the get-user-stats action.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatCounts {
    pub saved_tours: i64,
    pub trips: i64,
    pub clients: i64,
    pub quotes: i64,
    pub vehicles: i64,
    pub drivers: i64,
    pub charges: i64,
}

const STAT_TABLES: [BusinessTable; 7] = [
    BusinessTable::SavedTours,
    BusinessTable::Trips,
    BusinessTable::Clients,
    BusinessTable::Quotes,
    BusinessTable::Vehicles,
    BusinessTable::Drivers,
    BusinessTable::Charges,
];

/// Read-aggregation over the business tables. The per-entity lookups are
/// independent, so they are issued concurrently and joined before the
/// response is assembled.
pub struct CompanyDataService {
    stores: Stores,
}

impl CompanyDataService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn member_stats(&self, member: &Membership) -> StoreResult<MemberStats> {
        let mut stats = MemberStats {
            membership_id: member.id,
            identity_id: member.identity_id,
            email: member.email.clone(),
            display_name: member.display_name.clone(),
            role: member.role,
            tours_count: 0,
            trips_count: 0,
            clients_count: 0,
            quotes_count: 0,
            vehicles_count: 0,
            drivers_count: 0,
            charges_count: 0,
            total_revenue: 0.0,
            total_distance: 0.0,
            last_activity_at: member.last_activity_at,
            accepted_at: member.accepted_at,
        };

        // Members that never authenticated own no records yet.
        let Some(identity_id) = member.identity_id else {
            return Ok(stats);
        };

        let (counts, totals) = futures::try_join!(
            self.identity_counts(identity_id),
            self.stores.business.totals_by_identity(BusinessTable::Trips, identity_id),
        )?;

        stats.tours_count = counts.saved_tours;
        stats.trips_count = counts.trips;
        stats.clients_count = counts.clients;
        stats.quotes_count = counts.quotes;
        stats.vehicles_count = counts.vehicles;
        stats.drivers_count = counts.drivers;
        stats.charges_count = counts.charges;
        stats.total_revenue = totals.revenue;
        stats.total_distance = totals.distance_km;
        Ok(stats)
    }

    pub async fn all_member_stats(&self, members: &[Membership]) -> StoreResult<Vec<MemberStats>> {
        try_join_all(members.iter().map(|m| self.member_stats(m))).await
    }

    pub async fn identity_counts(&self, identity_id: Uuid) -> StoreResult<UserStatCounts> {
        let counts = try_join_all(
            STAT_TABLES
                .iter()
                .map(|&table| self.stores.business.count_by_identity(table, identity_id)),
        )
        .await?;

        Ok(UserStatCounts {
            saved_tours: counts[0],
            trips: counts[1],
            clients: counts[2],
            quotes: counts[3],
            vehicles: counts[4],
            drivers: counts[5],
            charges: counts[6],
        })
    }

    pub async fn company_totals(&self, license_id: Uuid) -> StoreResult<CompanyTotals> {
        let counts = try_join_all(
            STAT_TABLES
                .iter()
                .map(|&table| self.stores.business.count_by_license(table, license_id)),
        )
        .await?;

        let (tour_totals, trip_totals) = futures::try_join!(
            self.stores.business.totals_by_license(BusinessTable::SavedTours, license_id),
            self.stores.business.totals_by_license(BusinessTable::Trips, license_id),
        )?;

        Ok(CompanyTotals {
            tours: counts[0],
            trips: counts[1],
            clients: counts[2],
            quotes: counts[3],
            vehicles: counts[4],
            drivers: counts[5],
            charges: counts[6],
            revenue: tour_totals.revenue + trip_totals.revenue,
            distance: tour_totals.distance_km + trip_totals.distance_km,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{BusinessRecord, NewLicense, NewMembership, PlanTier};
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn totals_combine_tours_and_trips() {
        let stores = Stores::memory();
        let license = stores
            .licenses
            .insert(NewLicense {
                license_code: "AAAA-BBBB-CCCC-DDDD".to_string(),
                email: "owner@acme.test".to_string(),
                plan_tier: PlanTier::Pro,
                first_name: None,
                last_name: None,
                company_name: None,
                registration_id: None,
                address: None,
                city: None,
                postal_code: None,
                company_status: None,
                employee_count: None,
            })
            .await
            .unwrap();

        for (table, revenue) in
            [(BusinessTable::SavedTours, 100.0), (BusinessTable::Trips, 250.0)]
        {
            stores
                .business
                .insert(
                    table,
                    BusinessRecord {
                        id: Uuid::new_v4(),
                        license_id: license.id,
                        identity_id: None,
                        name: None,
                        revenue: Some(revenue),
                        distance_km: Some(10.0),
                        data: json!({}),
                        created_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        let totals = CompanyDataService::new(stores.clone()).company_totals(license.id).await.unwrap();
        assert_eq!(totals.tours, 1);
        assert_eq!(totals.trips, 1);
        assert_eq!(totals.revenue, 350.0);
        assert_eq!(totals.distance, 20.0);
    }

    #[tokio::test]
    async fn unauthenticated_member_reports_zero_usage() {
        let stores = Stores::memory();
        let license_id = Uuid::new_v4();
        let member = stores
            .memberships
            .insert(NewMembership {
                license_id,
                email: "invited@acme.test".to_string(),
                identity_id: None,
                role: MemberRole::Member,
                display_name: None,
                invited_at: Some(Utc::now()),
                accepted_at: None,
            })
            .await
            .unwrap();

        let stats = CompanyDataService::new(stores).member_stats(&member).await.unwrap();
        assert_eq!(stats.tours_count, 0);
        assert_eq!(stats.total_revenue, 0.0);
        assert!(stats.identity_id.is_none());
    }
}
