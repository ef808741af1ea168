use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Lifecycle of one photo upload.
///
/// `PENDING → UPLOADING → COMPLETED | FAILED`. Terminal states have no
/// exits; a failed upload is never retried automatically. Only the
/// background worker moves a slot into `UPLOADING`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    Display,
    EnumString,
    ToSchema,
)]
#[sqlx(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

/// Which of the record's two photo field groups a mutation targets.
///
/// Each slot owns its own status/key/url column triple and transitions
/// independently of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoSlot {
    ClockIn,
    ClockOut,
}

impl PhotoSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoSlot::ClockIn => "clock-in",
            PhotoSlot::ClockOut => "clock-out",
        }
    }

    pub fn status_column(&self) -> &'static str {
        match self {
            PhotoSlot::ClockIn => "upload_status",
            PhotoSlot::ClockOut => "clock_out_upload_status",
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            PhotoSlot::ClockIn => "photo_key",
            PhotoSlot::ClockOut => "clock_out_photo_key",
        }
    }

    pub fn url_column(&self) -> &'static str {
        match self {
            PhotoSlot::ClockIn => "photo_url",
            PhotoSlot::ClockOut => "clock_out_photo_url",
        }
    }
}

/// One staff member's workday attendance row.
///
/// The stored `photo_url`/`clock_out_photo_url` values are a cache of the
/// last-known URL, not source of truth; read paths re-sign from the key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    pub id: u64,
    pub staff_id: u64,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    pub photo_key: Option<String>,
    pub photo_url: Option<String>,
    pub upload_status: UploadStatus,
    pub clock_out_photo_key: Option<String>,
    pub clock_out_photo_url: Option<String>,
    pub clock_out_upload_status: Option<UploadStatus>,
    pub notes: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn tz(offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

/// UTC instant at which `date` starts in the deployment timezone.
pub fn day_start(date: NaiveDate, offset_minutes: i32) -> DateTime<Utc> {
    let tz = tz(offset_minutes);
    date.and_hms_opt(0, 0, 0)
        .unwrap()
        .and_local_timezone(tz)
        .unwrap()
        .with_timezone(&Utc)
}

/// Half-open `[start, end)` UTC bounds of the calendar day containing `now`.
pub fn day_bounds(now: DateTime<Utc>, offset_minutes: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_date = now.with_timezone(&tz(offset_minutes)).date_naive();
    let start = day_start(local_date, offset_minutes);
    (start, start + Duration::days(1))
}

/// Appends clock-out notes to existing notes, newline-joined and trimmed.
/// Empty or whitespace-only additions leave the original notes unchanged.
pub fn append_notes(existing: Option<&str>, added: Option<&str>) -> Option<String> {
    let added = added.map(str::trim).filter(|s| !s.is_empty());
    match (existing, added) {
        (old, None) => old.map(str::to_string),
        (None, Some(new)) => Some(new.to_string()),
        (Some(old), Some(new)) => Some(format!("{}\n{}", old, new).trim().to_string()),
    }
}

/// Row offset for a 1-based page. Saturates so an absurd `page` clamps to
/// the end instead of overflowing.
pub fn page_offset(page: u32, per_page: u32) -> u32 {
    page.saturating_sub(1).saturating_mul(per_page)
}

pub fn total_pages(total: i64, per_page: u32) -> u32 {
    if total <= 0 {
        return 0;
    }
    ((total as u64).div_ceil(per_page as u64)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slot_columns_are_disjoint() {
        let a = PhotoSlot::ClockIn;
        let b = PhotoSlot::ClockOut;
        assert_ne!(a.status_column(), b.status_column());
        assert_ne!(a.key_column(), b.key_column());
        assert_ne!(a.url_column(), b.url_column());
    }

    #[test]
    fn upload_status_round_trips_as_uppercase_string() {
        use std::str::FromStr;
        assert_eq!(UploadStatus::Pending.to_string(), "PENDING");
        assert_eq!(UploadStatus::Uploading.to_string(), "UPLOADING");
        assert_eq!(
            UploadStatus::from_str("COMPLETED").unwrap(),
            UploadStatus::Completed
        );
        assert_eq!(
            UploadStatus::from_str("FAILED").unwrap(),
            UploadStatus::Failed
        );
    }

    #[test]
    fn append_notes_joins_with_newline() {
        assert_eq!(append_notes(Some("A"), Some("B")).as_deref(), Some("A\nB"));
    }

    #[test]
    fn append_notes_keeps_existing_when_added_is_empty() {
        assert_eq!(append_notes(Some("A"), None).as_deref(), Some("A"));
        assert_eq!(append_notes(Some("A"), Some("   ")).as_deref(), Some("A"));
    }

    #[test]
    fn append_notes_without_existing_uses_added_only() {
        assert_eq!(append_notes(None, Some(" B ")).as_deref(), Some("B"));
        assert_eq!(append_notes(None, None), None);
    }

    #[test]
    fn day_bounds_utc() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 13, 45, 0).unwrap();
        let (start, end) = day_bounds(now, 0);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn day_bounds_respect_positive_offset() {
        // 23:30 UTC is already the next day at UTC+7.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 23, 30, 0).unwrap();
        let (start, end) = day_bounds(now, 7 * 60);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 15, 17, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 6, 16, 17, 0, 0).unwrap());
    }

    #[test]
    fn page_offset_saturates_instead_of_overflowing() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(0, 10), 0);
        assert_eq!(page_offset(u32::MAX, 100), u32::MAX);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(30, 10), 3);
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
    }
}
