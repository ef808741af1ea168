use crate::api::attendance::{AttendancePage, AttendanceResponse};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::attendance::{day_start, page_offset, total_pages};
use crate::repo::attendance as repo;
use crate::upload::storage::ObjectStorage;
use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::IntoParams;

const SORT_COLUMNS: [&str; 3] = ["clock_in", "clock_out", "created_at"];

#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminAttendanceQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Comma-separated staff ids, e.g. `3,17,42`
    pub staff_ids: Option<String>,
    #[param(example = "2025-06-01")]
    pub clock_in_start: Option<NaiveDate>,
    #[param(example = "2025-06-30")]
    pub clock_in_end: Option<NaiveDate>,
    pub clock_out_start: Option<NaiveDate>,
    pub clock_out_end: Option<NaiveDate>,
    /// One of `clock_in`, `clock_out`, `created_at`
    pub sort_by: Option<String>,
    /// `asc` or `desc`
    pub sort_order: Option<String>,
}

/// Admin-scoped attendance listing across all staff
#[utoipa::path(
    get,
    path = "/api/admin/attendance",
    params(AdminAttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance across staff", body = AttendancePage),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only", body = Object, example = json!({
            "message": "Admin only"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Admin"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    storage: web::Data<dyn ObjectStorage>,
    query: web::Query<AdminAttendanceQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = page_offset(page, per_page);

    let staff_ids = query
        .staff_ids
        .as_deref()
        .map(|s| {
            s.split(',')
                .filter_map(|part| part.trim().parse::<u64>().ok())
                .collect()
        })
        .unwrap_or_default();

    let offset_minutes = config.day_offset_minutes;
    let filter = repo::AdminFilter {
        staff_ids,
        clock_in_from: query.clock_in_start.map(|d| day_start(d, offset_minutes)),
        clock_in_to: query
            .clock_in_end
            .map(|d| day_start(d + Duration::days(1), offset_minutes)),
        clock_out_from: query.clock_out_start.map(|d| day_start(d, offset_minutes)),
        clock_out_to: query
            .clock_out_end
            .map(|d| day_start(d + Duration::days(1), offset_minutes)),
    };

    // Sort input is allow-listed; anything else falls back to the default.
    let sort_column = match query.sort_by.as_deref() {
        Some(col) if SORT_COLUMNS.contains(&col) => col,
        _ => "clock_in",
    };
    let sort_dir = match query.sort_order.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };

    debug!(
        ?filter,
        sort_column, sort_dir, page, per_page, "Admin attendance listing"
    );

    let total = repo::count_all(pool.get_ref(), &filter).await?;
    let records =
        repo::list_all(pool.get_ref(), &filter, sort_column, sort_dir, per_page, offset).await?;

    let data = records
        .into_iter()
        .map(|r| AttendanceResponse::resolve(r, storage.get_ref(), config.signed_url_ttl_secs))
        .collect();

    Ok(HttpResponse::Ok().json(AttendancePage {
        data,
        page,
        per_page,
        total,
        total_pages: total_pages(total, per_page),
    }))
}
