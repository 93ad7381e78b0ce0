//! Client-side filtering and status counts over fetched lists.
//!
//! The tallies produce the same shapes as the server `/stats` endpoints so a
//! caller can summarise a page it already holds without another round trip.

use std::str::FromStr;

use crate::models::{
    DashboardStats, Incident, IncidentSeverity, IncidentStats, IncidentStatus, Inspeksi,
    InspeksiStats, InspeksiStatus, ParseKindError, Permit, PermitStats, PermitStatus,
};

/// Filter selection: every record, or one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter<S> {
    #[default]
    All,
    Only(S),
}

impl<S: Copy + PartialEq> StatusFilter<S> {
    pub fn matches(self, status: S) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }

    /// The value to send as a query parameter; `None` for `All`.
    pub fn as_query(self) -> Option<S> {
        match self {
            Self::All => None,
            Self::Only(status) => Some(status),
        }
    }
}

impl<S: FromStr<Err = ParseKindError>> FromStr for StatusFilter<S> {
    type Err = ParseKindError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        raw.parse().map(Self::Only)
    }
}

pub fn filter_inspeksi(
    records: &[Inspeksi],
    filter: StatusFilter<InspeksiStatus>,
) -> Vec<&Inspeksi> {
    records
        .iter()
        .filter(|record| filter.matches(record.status))
        .collect()
}

pub fn tally_inspeksi(records: &[Inspeksi]) -> InspeksiStats {
    records
        .iter()
        .fold(InspeksiStats::default(), |mut stats, record| {
            stats.total += 1;
            match record.status {
                InspeksiStatus::Safe => stats.safe += 1,
                InspeksiStatus::Unsafe => stats.unsafe_count += 1,
                InspeksiStatus::Pending => stats.pending += 1,
                InspeksiStatus::Unknown => {}
            }
            stats
        })
}

pub fn tally_incidents(records: &[Incident]) -> IncidentStats {
    records
        .iter()
        .fold(IncidentStats::default(), |mut stats, record| {
            stats.total += 1;
            match record.severity {
                IncidentSeverity::Minor => stats.minor += 1,
                IncidentSeverity::Major => stats.major += 1,
                IncidentSeverity::NearMiss => stats.near_miss += 1,
                IncidentSeverity::Unknown => {}
            }
            match record.status {
                IncidentStatus::Open => stats.open += 1,
                IncidentStatus::Investigating => stats.investigating += 1,
                IncidentStatus::Closed => stats.closed += 1,
                IncidentStatus::Unknown => {}
            }
            stats
        })
}

/// Closed permits count toward the total only; the stats shape has no bucket
/// for them. The same goes for unrecognised statuses in every tally.
pub fn tally_permits(records: &[Permit]) -> PermitStats {
    records
        .iter()
        .fold(PermitStats::default(), |mut stats, record| {
            stats.total += 1;
            match record.status {
                PermitStatus::Pending => stats.pending += 1,
                PermitStatus::Approved => stats.approved += 1,
                PermitStatus::Rejected => stats.rejected += 1,
                PermitStatus::Expired => stats.expired += 1,
                PermitStatus::Closed | PermitStatus::Unknown => {}
            }
            stats
        })
}

pub fn dashboard_summary(
    inspections: &InspeksiStats,
    incidents: &IncidentStats,
    permits: &PermitStats,
) -> DashboardStats {
    DashboardStats {
        total_inspections: inspections.total,
        total_incidents: incidents.total,
        total_permits: permits.total,
        safe_inspections: inspections.safe,
        unsafe_inspections: inspections.unsafe_count,
        pending_permits: permits.pending,
        open_incidents: incidents.open,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersonRef;

    fn inspection(id: &str, status: InspeksiStatus) -> Inspeksi {
        Inspeksi {
            id: id.to_string(),
            title: format!("Inspection {id}"),
            description: String::new(),
            location: "Gudang A".to_string(),
            status,
            photo: None,
            photos: Vec::new(),
            findings: None,
            recommendations: None,
            inspector: PersonRef {
                id: "3".to_string(),
                name: "Rina".to_string(),
            },
            department: None,
            area: None,
            created_at: "2024-01-10T07:00:00Z".to_string(),
            updated_at: "2024-01-10T07:00:00Z".to_string(),
        }
    }

    fn sample() -> Vec<Inspeksi> {
        vec![
            inspection("1", InspeksiStatus::Safe),
            inspection("2", InspeksiStatus::Unsafe),
            inspection("3", InspeksiStatus::Safe),
            inspection("4", InspeksiStatus::Pending),
        ]
    }

    #[test]
    fn all_filter_keeps_every_record() {
        let records = sample();
        let filter: StatusFilter<InspeksiStatus> = "all".parse().expect("filter");
        assert_eq!(filter, StatusFilter::All);
        assert_eq!(filter.as_query(), None);
        assert_eq!(filter_inspeksi(&records, filter).len(), 4);
    }

    #[test]
    fn status_filter_keeps_matching_records_in_order() {
        let records = sample();
        let filter: StatusFilter<InspeksiStatus> = "safe".parse().expect("filter");
        let ids: Vec<&str> = filter_inspeksi(&records, filter)
            .iter()
            .map(|record| record.id.as_str())
            .collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn unknown_filter_is_an_error() {
        assert!("broken".parse::<StatusFilter<InspeksiStatus>>().is_err());
    }

    #[test]
    fn inspection_tally_matches_stats_shape() {
        let stats = tally_inspeksi(&sample());
        assert_eq!(
            stats,
            InspeksiStats {
                total: 4,
                safe: 2,
                unsafe_count: 1,
                pending: 1,
            }
        );
    }

    #[test]
    fn dashboard_summary_projects_tallies() {
        let inspections = tally_inspeksi(&sample());
        let incidents = IncidentStats {
            total: 5,
            open: 2,
            ..IncidentStats::default()
        };
        let permits = PermitStats {
            total: 3,
            pending: 1,
            ..PermitStats::default()
        };
        let summary = dashboard_summary(&inspections, &incidents, &permits);
        assert_eq!(summary.total_inspections, 4);
        assert_eq!(summary.unsafe_inspections, 1);
        assert_eq!(summary.open_incidents, 2);
        assert_eq!(summary.pending_permits, 1);
    }

    #[test]
    fn incident_and_permit_tallies_count_every_bucket() {
        let incidents: Vec<Incident> = serde_json::from_value(serde_json::json!([
            incident_json("1", "minor", "open"),
            incident_json("2", "near-miss", "open"),
            incident_json("3", "major", "closed"),
        ]))
        .expect("incidents");
        let stats = tally_incidents(&incidents);
        assert_eq!((stats.total, stats.minor, stats.major, stats.near_miss), (3, 1, 1, 1));
        assert_eq!((stats.open, stats.investigating, stats.closed), (2, 0, 1));

        let permits: Vec<Permit> = serde_json::from_value(serde_json::json!([
            permit_json("1", "pending"),
            permit_json("2", "closed"),
            permit_json("3", "expired"),
        ]))
        .expect("permits");
        let stats = tally_permits(&permits);
        assert_eq!(
            stats,
            PermitStats {
                total: 3,
                pending: 1,
                approved: 0,
                rejected: 0,
                expired: 1,
            }
        );
    }

    #[test]
    fn unrecognised_statuses_count_toward_total_only() {
        let incidents: Vec<Incident> = serde_json::from_value(serde_json::json!([
            incident_json("1", "minor", "escalated"),
            incident_json("2", "catastrophic", "open"),
        ]))
        .expect("incidents");
        let stats = tally_incidents(&incidents);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.minor + stats.major + stats.near_miss, 1);
        assert_eq!(stats.open + stats.investigating + stats.closed, 1);

        let permits: Vec<Permit> = serde_json::from_value(serde_json::json!([
            permit_json("1", "suspended"),
            permit_json("2", "approved"),
        ]))
        .expect("permits");
        assert_eq!(
            tally_permits(&permits),
            PermitStats {
                total: 2,
                approved: 1,
                ..PermitStats::default()
            }
        );

        let mut records = sample();
        records[0].status = InspeksiStatus::Unknown;
        let stats = tally_inspeksi(&records);
        assert_eq!((stats.total, stats.safe), (4, 1));
        assert_eq!(filter_inspeksi(&records, StatusFilter::Only(InspeksiStatus::Safe)).len(), 1);
    }

    fn incident_json(id: &str, severity: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": "Slip near loading dock",
            "location": "Dock 2",
            "severity": severity,
            "status": status,
            "date": "2024-04-12",
            "reporter": { "id": "9", "name": "Dewi" },
            "createdAt": "2024-04-12T10:00:00Z",
            "updatedAt": "2024-04-12T10:00:00Z"
        })
    }

    fn permit_json(id: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "permitNumber": format!("PTW-{id}"),
            "type": "general",
            "title": "Roof access",
            "location": "Block C",
            "status": status,
            "startDate": "2024-04-01",
            "endDate": "2024-04-02",
            "requester": { "id": "2", "name": "Agus" },
            "createdAt": "2024-03-30T10:00:00Z",
            "updatedAt": "2024-03-30T10:00:00Z"
        })
    }
}
