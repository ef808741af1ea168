use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::attendance::{
    Attendance, PhotoSlot, UploadStatus, append_notes, day_bounds, day_start, page_offset,
    total_pages,
};
use crate::repo::attendance as repo;
use crate::upload::dispatcher::{PhotoUploadJob, UploadDispatcher};
use crate::upload::photo::{PhotoUpload, validate_photo};
use crate::upload::storage::ObjectStorage;
use actix_multipart::form::{MultipartForm, bytes::Bytes as MultipartBytes, text::Text};
use actix_web::{HttpRequest, HttpResponse, http::header, web};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

/// Multipart body shared by clock-in and clock-out: a `photo` file part and
/// an optional `notes` text part.
#[derive(Debug, MultipartForm)]
pub struct PhotoForm {
    pub photo: Option<MultipartBytes>,
    pub notes: Option<Text<String>>,
}

impl PhotoForm {
    fn into_parts(self) -> (Option<PhotoUpload>, Option<String>) {
        let photo = self.photo.map(|f| PhotoUpload {
            filename: f.file_name.clone().unwrap_or_default(),
            content_type: f
                .content_type
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_default(),
            bytes: f.data.to_vec(),
        });
        let notes = self
            .notes
            .map(|t| t.into_inner())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        (photo, notes)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceResponse {
    pub id: u64,
    pub staff_id: u64,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    /// Freshly signed from the stored key on every read; null until the
    /// clock-in photo upload completes.
    pub photo_url: Option<String>,
    pub upload_status: UploadStatus,
    pub clock_out_photo_url: Option<String>,
    pub clock_out_upload_status: Option<UploadStatus>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AttendanceResponse {
    /// Resolves each non-null photo key into a short-lived signed URL.
    /// Resolution is read-time and stateless; nothing survives the response.
    pub fn resolve(record: Attendance, storage: &dyn ObjectStorage, ttl_secs: u64) -> Self {
        let photo_url = record
            .photo_key
            .as_deref()
            .map(|key| storage.signed_url(key, ttl_secs));
        let clock_out_photo_url = record
            .clock_out_photo_key
            .as_deref()
            .map(|key| storage.signed_url(key, ttl_secs));

        Self {
            id: record.id,
            staff_id: record.staff_id,
            clock_in: record.clock_in,
            clock_out: record.clock_out,
            photo_url,
            upload_status: record.upload_status,
            clock_out_photo_url,
            clock_out_upload_status: record.clock_out_upload_status,
            notes: record.notes,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AttendancePage {
    pub data: Vec<AttendanceResponse>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 25)]
    pub total: i64,
    #[schema(example = 3)]
    pub total_pages: u32,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[param(example = "2025-06-01")]
    pub start_date: Option<NaiveDate>,
    #[param(example = "2025-06-30")]
    pub end_date: Option<NaiveDate>,
}

/// Clock-in precondition: the staff member has no record still open within
/// the current day bounds.
fn ensure_not_clocked_in(open: Option<&Attendance>) -> Result<(), ApiError> {
    if open.is_some() {
        Err(ApiError::AlreadyClockedIn)
    } else {
        Ok(())
    }
}

/// Clock-out precondition: an open record exists for the current day.
fn require_open_record(open: Option<Attendance>) -> Result<Attendance, ApiError> {
    open.ok_or(ApiError::NoActiveClockIn)
}

/// Clock-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    responses(
        (status = 201, description = "Clocked in; photo upload runs in the background", body = AttendanceResponse),
        (status = 400, description = "Invalid photo or already clocked in today", body = Object, example = json!({
            "message": "You have already clocked in today. Please clock out first."
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_in(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    storage: web::Data<dyn ObjectStorage>,
    dispatcher: web::Data<UploadDispatcher>,
    form: MultipartForm<PhotoForm>,
) -> Result<HttpResponse, ApiError> {
    let (photo, notes) = form.into_inner().into_parts();
    let photo = validate_photo(photo, config.max_upload_bytes)?;

    let now = Utc::now();
    let (from, to) = day_bounds(now, config.day_offset_minutes);

    let open = repo::find_open_for_day(pool.get_ref(), auth.user_id, from, to).await?;
    ensure_not_clocked_in(open.as_ref())?;

    let ip_address = req
        .connection_info()
        .realip_remote_addr()
        .map(str::to_string);
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let record_id = repo::insert_clock_in(
        pool.get_ref(),
        repo::NewClockIn {
            staff_id: auth.user_id,
            clock_in: now,
            notes: notes.as_deref(),
            ip_address: ip_address.as_deref(),
            user_agent: user_agent.as_deref(),
        },
    )
    .await?;

    // Fire-and-forget: the response below does not wait on the transfer.
    dispatcher.dispatch(PhotoUploadJob {
        record_id,
        staff_id: auth.user_id,
        bytes: photo.bytes,
        filename: photo.filename,
        content_type: photo.content_type,
        slot: PhotoSlot::ClockIn,
    });

    let record = repo::find_by_id_for_staff(pool.get_ref(), record_id, auth.user_id)
        .await?
        .ok_or(ApiError::NotFound("Attendance record"))?;

    info!(record_id, staff_id = auth.user_id, "Clock-in recorded");

    Ok(HttpResponse::Created().json(AttendanceResponse::resolve(
        record,
        storage.get_ref(),
        config.signed_url_ttl_secs,
    )))
}

/// Clock-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    responses(
        (status = 200, description = "Clocked out; photo upload runs in the background", body = AttendanceResponse),
        (status = 400, description = "Invalid photo or no active clock-in", body = Object, example = json!({
            "message": "No active clock-in found for today. Please clock in first."
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    storage: web::Data<dyn ObjectStorage>,
    dispatcher: web::Data<UploadDispatcher>,
    form: MultipartForm<PhotoForm>,
) -> Result<HttpResponse, ApiError> {
    let (photo, notes) = form.into_inner().into_parts();
    let photo = validate_photo(photo, config.max_upload_bytes)?;

    let now = Utc::now();
    let (from, to) = day_bounds(now, config.day_offset_minutes);

    let open = require_open_record(
        repo::find_open_for_day(pool.get_ref(), auth.user_id, from, to).await?,
    )?;

    let merged_notes = append_notes(open.notes.as_deref(), notes.as_deref());
    repo::apply_clock_out(pool.get_ref(), open.id, now, merged_notes.as_deref()).await?;

    dispatcher.dispatch(PhotoUploadJob {
        record_id: open.id,
        staff_id: auth.user_id,
        bytes: photo.bytes,
        filename: photo.filename,
        content_type: photo.content_type,
        slot: PhotoSlot::ClockOut,
    });

    let record = repo::find_by_id_for_staff(pool.get_ref(), open.id, auth.user_id)
        .await?
        .ok_or(ApiError::NotFound("Attendance record"))?;

    info!(record_id = open.id, staff_id = auth.user_id, "Clock-out recorded");

    Ok(HttpResponse::Ok().json(AttendanceResponse::resolve(
        record,
        storage.get_ref(),
        config.signed_url_ttl_secs,
    )))
}

/// Today's attendance (null if the staff member has not clocked in yet)
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record, or null when not clocked in", body = AttendanceResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    storage: web::Data<dyn ObjectStorage>,
) -> Result<HttpResponse, ApiError> {
    let (from, to) = day_bounds(Utc::now(), config.day_offset_minutes);

    let record = repo::find_today(pool.get_ref(), auth.user_id, from, to).await?;
    let response = record.map(|r| {
        AttendanceResponse::resolve(r, storage.get_ref(), config.signed_url_ttl_secs)
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Paginated attendance history for the authenticated staff member
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Paginated attendance history", body = AttendancePage),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    storage: web::Data<dyn ObjectStorage>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = page_offset(page, per_page);

    let from = query
        .start_date
        .map(|d| day_start(d, config.day_offset_minutes));
    // End date is inclusive: filter on the start of the following day.
    let to = query
        .end_date
        .map(|d| day_start(d + Duration::days(1), config.day_offset_minutes));

    let total = repo::count_history(pool.get_ref(), auth.user_id, from, to).await?;
    let records =
        repo::list_history(pool.get_ref(), auth.user_id, from, to, per_page, offset).await?;

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

/// Single attendance record, scoped to the authenticated staff member
#[utoipa::path(
    get,
    path = "/api/attendance/{id}",
    params(
        ("id" = u64, Path, description = "Attendance record ID")
    ),
    responses(
        (status = 200, description = "Attendance record", body = AttendanceResponse),
        (status = 404, description = "Attendance record not found", body = Object, example = json!({
            "message": "Attendance record not found"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_by_id(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    storage: web::Data<dyn ObjectStorage>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let record_id = path.into_inner();

    let record = repo::find_by_id_for_staff(pool.get_ref(), record_id, auth.user_id)
        .await?
        .ok_or(ApiError::NotFound("Attendance record"))?;

    Ok(HttpResponse::Ok().json(AttendanceResponse::resolve(
        record,
        storage.get_ref(),
        config.signed_url_ttl_secs,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_record() -> Attendance {
        Attendance {
            id: 1,
            staff_id: 42,
            clock_in: Utc::now(),
            clock_out: None,
            photo_key: None,
            photo_url: None,
            upload_status: UploadStatus::Pending,
            clock_out_photo_key: None,
            clock_out_photo_url: None,
            clock_out_upload_status: None,
            notes: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn second_clock_in_same_day_is_rejected() {
        assert!(ensure_not_clocked_in(None).is_ok());
        assert!(matches!(
            ensure_not_clocked_in(Some(&open_record())),
            Err(ApiError::AlreadyClockedIn)
        ));
    }

    #[test]
    fn clock_out_requires_an_open_record() {
        assert!(matches!(
            require_open_record(None),
            Err(ApiError::NoActiveClockIn)
        ));
        let record = require_open_record(Some(open_record())).unwrap();
        assert_eq!(record.id, 1);
    }
}
