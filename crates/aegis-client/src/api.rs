//! Typed wrappers over the dashboard, inspection, incident, permit and user
//! endpoints. Every call goes through the session dispatcher and therefore
//! shares its token renewal.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::dispatcher::{ApiRequest, Dispatcher};
use crate::error::{ClientError, Result};
use crate::models::{
    ApprovePermitPayload, CreateIncidentPayload, CreateInspeksiPayload, CreatePermitPayload,
    CreateUserPayload, DashboardStats, Incident, IncidentChartData, IncidentQuery, IncidentStats,
    Inspeksi, InspeksiChartData, InspeksiQuery, InspeksiStats, Page, PageMeta, Permit, PermitQuery,
    PermitStats, UpdateIncidentPayload, UpdateInspeksiPayload, UpdatePermitPayload,
    UpdateUserPayload, User, UserQuery,
};

const DASHBOARD: &str = "/dashboard";
const INSPEKSI: &str = "/inspeksi";
const INCIDENTS: &str = "/incidents";
const PERMITS: &str = "/permits";
const USERS: &str = "/users";

#[derive(Clone)]
pub struct AegisApi {
    dispatcher: Dispatcher,
}

impl AegisApi {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    // ============ Dashboard ============

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.fetch(ApiRequest::get(format!("{DASHBOARD}/stats"))).await
    }

    pub async fn incidents_chart(&self) -> Result<Vec<IncidentChartData>> {
        self.fetch(ApiRequest::get(format!("{DASHBOARD}/incidents-chart")))
            .await
    }

    pub async fn inspeksi_chart(&self) -> Result<Vec<InspeksiChartData>> {
        self.fetch(ApiRequest::get(format!("{DASHBOARD}/inspeksi-chart")))
            .await
    }

    // ============ Inspeksi ============

    pub async fn list_inspeksi(&self, query: &InspeksiQuery) -> Result<Page<Inspeksi>> {
        let request = ApiRequest::get(INSPEKSI)
            .query_opt("status", query.status)
            .query_opt("page", query.page)
            .query_opt("limit", query.limit);
        self.fetch_page(request).await
    }

    pub async fn inspeksi(&self, id: &str) -> Result<Inspeksi> {
        self.fetch(ApiRequest::get(item_path(INSPEKSI, id)?)).await
    }

    pub async fn inspeksi_stats(&self) -> Result<InspeksiStats> {
        self.fetch(ApiRequest::get(format!("{INSPEKSI}/stats"))).await
    }

    pub async fn create_inspeksi(&self, payload: &CreateInspeksiPayload) -> Result<Inspeksi> {
        self.fetch(ApiRequest::post(INSPEKSI).json(payload)?).await
    }

    pub async fn update_inspeksi(
        &self,
        id: &str,
        payload: &UpdateInspeksiPayload,
    ) -> Result<Inspeksi> {
        self.fetch(ApiRequest::patch(item_path(INSPEKSI, id)?).json(payload)?)
            .await
    }

    pub async fn delete_inspeksi(&self, id: &str) -> Result<()> {
        self.remove(item_path(INSPEKSI, id)?).await
    }

    // ============ Incidents ============

    pub async fn list_incidents(&self, query: &IncidentQuery) -> Result<Page<Incident>> {
        let request = ApiRequest::get(INCIDENTS)
            .query_opt("severity", query.severity)
            .query_opt("status", query.status)
            .query_opt("page", query.page)
            .query_opt("limit", query.limit);
        self.fetch_page(request).await
    }

    pub async fn incident(&self, id: &str) -> Result<Incident> {
        self.fetch(ApiRequest::get(item_path(INCIDENTS, id)?)).await
    }

    pub async fn incident_stats(&self) -> Result<IncidentStats> {
        self.fetch(ApiRequest::get(format!("{INCIDENTS}/stats"))).await
    }

    pub async fn create_incident(&self, payload: &CreateIncidentPayload) -> Result<Incident> {
        self.fetch(ApiRequest::post(INCIDENTS).json(payload)?).await
    }

    pub async fn update_incident(
        &self,
        id: &str,
        payload: &UpdateIncidentPayload,
    ) -> Result<Incident> {
        self.fetch(ApiRequest::patch(item_path(INCIDENTS, id)?).json(payload)?)
            .await
    }

    pub async fn delete_incident(&self, id: &str) -> Result<()> {
        self.remove(item_path(INCIDENTS, id)?).await
    }

    // ============ Permits ============

    pub async fn list_permits(&self, query: &PermitQuery) -> Result<Page<Permit>> {
        let request = ApiRequest::get(PERMITS)
            .query_opt("type", query.permit_type)
            .query_opt("status", query.status)
            .query_opt("page", query.page)
            .query_opt("limit", query.limit);
        self.fetch_page(request).await
    }

    pub async fn permit(&self, id: &str) -> Result<Permit> {
        self.fetch(ApiRequest::get(item_path(PERMITS, id)?)).await
    }

    pub async fn permit_stats(&self) -> Result<PermitStats> {
        self.fetch(ApiRequest::get(format!("{PERMITS}/stats"))).await
    }

    pub async fn create_permit(&self, payload: &CreatePermitPayload) -> Result<Permit> {
        self.fetch(ApiRequest::post(PERMITS).json(payload)?).await
    }

    pub async fn update_permit(&self, id: &str, payload: &UpdatePermitPayload) -> Result<Permit> {
        self.fetch(ApiRequest::patch(item_path(PERMITS, id)?).json(payload)?)
            .await
    }

    /// Approves or rejects a pending permit.
    pub async fn approve_permit(
        &self,
        id: &str,
        payload: &ApprovePermitPayload,
    ) -> Result<Permit> {
        let path = format!("{}/approve", item_path(PERMITS, id)?);
        self.fetch(ApiRequest::post(path).json(payload)?).await
    }

    pub async fn delete_permit(&self, id: &str) -> Result<()> {
        self.remove(item_path(PERMITS, id)?).await
    }

    // ============ Users ============

    pub async fn list_users(&self, query: &UserQuery) -> Result<Page<User>> {
        let request = ApiRequest::get(USERS)
            .query_opt("role", query.role.as_ref())
            .query_opt("page", query.page)
            .query_opt("limit", query.limit);
        self.fetch_page(request).await
    }

    pub async fn user(&self, id: &str) -> Result<User> {
        self.fetch(ApiRequest::get(item_path(USERS, id)?)).await
    }

    pub async fn create_user(&self, payload: &CreateUserPayload) -> Result<User> {
        self.fetch(ApiRequest::post(USERS).json(payload)?).await
    }

    pub async fn update_user(&self, id: &str, payload: &UpdateUserPayload) -> Result<User> {
        self.fetch(ApiRequest::patch(item_path(USERS, id)?).json(payload)?)
            .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.remove(item_path(USERS, id)?).await
    }

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.dispatcher.send(request).await?.data()
    }

    async fn fetch_page<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Page<T>> {
        let body: ListBody<T> = self.dispatcher.send(request).await?.json()?;
        Ok(body.into_page())
    }

    /// Deletes answer 200 with an envelope or 204 with nothing; both are success.
    async fn remove(&self, path: String) -> Result<()> {
        self.dispatcher.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}

/// List endpoints answer `{ data, meta }`, occasionally a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Paged(Page<T>),
    Bare(Vec<T>),
}

impl<T> ListBody<T> {
    fn into_page(self) -> Page<T> {
        match self {
            Self::Paged(page) => page,
            Self::Bare(data) => {
                let total = data.len() as u64;
                let count = u32::try_from(data.len()).unwrap_or(u32::MAX);
                Page {
                    data,
                    meta: PageMeta {
                        total,
                        page: 1,
                        per_page: count,
                        total_pages: 1,
                    },
                }
            }
        }
    }
}

fn item_path(collection: &str, id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ClientError::InvalidPath);
    }
    Ok(format!("{collection}/{}", urlencoding::encode(id)))
}
