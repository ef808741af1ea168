use crate::model::attendance::{Attendance, PhotoSlot, UploadStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

/// Write seam used by the background worker for photo-slot status
/// transitions. Every mutation is a precise field-level UPDATE scoped to
/// one slot's columns, never a full-record overwrite.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn mark_slot_uploading(&self, record_id: u64, slot: PhotoSlot) -> anyhow::Result<()>;

    async fn complete_slot_upload(
        &self,
        record_id: u64,
        slot: PhotoSlot,
        key: &str,
        url: &str,
    ) -> anyhow::Result<()>;

    async fn fail_slot_upload(&self, record_id: u64, slot: PhotoSlot) -> anyhow::Result<()>;
}

#[async_trait]
impl AttendanceStore for MySqlPool {
    async fn mark_slot_uploading(&self, record_id: u64, slot: PhotoSlot) -> anyhow::Result<()> {
        let sql = format!(
            "UPDATE attendance SET {} = ? WHERE id = ?",
            slot.status_column()
        );
        let result = sqlx::query(&sql)
            .bind(UploadStatus::Uploading)
            .bind(record_id)
            .execute(self)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("attendance record {} not found", record_id);
        }
        Ok(())
    }

    async fn complete_slot_upload(
        &self,
        record_id: u64,
        slot: PhotoSlot,
        key: &str,
        url: &str,
    ) -> anyhow::Result<()> {
        let sql = format!(
            "UPDATE attendance SET {} = ?, {} = ?, {} = ? WHERE id = ?",
            slot.status_column(),
            slot.key_column(),
            slot.url_column()
        );
        sqlx::query(&sql)
            .bind(UploadStatus::Completed)
            .bind(key)
            .bind(url)
            .bind(record_id)
            .execute(self)
            .await?;
        Ok(())
    }

    async fn fail_slot_upload(&self, record_id: u64, slot: PhotoSlot) -> anyhow::Result<()> {
        let sql = format!(
            "UPDATE attendance SET {} = ? WHERE id = ?",
            slot.status_column()
        );
        sqlx::query(&sql)
            .bind(UploadStatus::Failed)
            .bind(record_id)
            .execute(self)
            .await?;
        Ok(())
    }
}

pub struct NewClockIn<'a> {
    pub staff_id: u64,
    pub clock_in: DateTime<Utc>,
    pub notes: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// The clock-in guard lookup: the staff member's still-open record (if any)
/// whose clock-in falls inside `[from, to)`.
pub async fn find_open_for_day(
    pool: &MySqlPool,
    staff_id: u64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(
        r#"
        SELECT * FROM attendance
        WHERE staff_id = ? AND clock_in >= ? AND clock_in < ? AND clock_out IS NULL
        ORDER BY clock_in DESC
        LIMIT 1
        "#,
    )
    .bind(staff_id)
    .bind(from)
    .bind(to)
    .fetch_optional(pool)
    .await
}

pub async fn insert_clock_in(
    pool: &MySqlPool,
    new: NewClockIn<'_>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance (staff_id, clock_in, upload_status, notes, ip_address, user_agent)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.staff_id)
    .bind(new.clock_in)
    .bind(UploadStatus::Pending)
    .bind(new.notes)
    .bind(new.ip_address)
    .bind(new.user_agent)
    .execute(pool)
    .await?;
    Ok(result.last_insert_id())
}

/// Seeds the clock-out slot PENDING alongside the clock-out timestamp and
/// the already-appended notes.
pub async fn apply_clock_out(
    pool: &MySqlPool,
    record_id: u64,
    clock_out: DateTime<Utc>,
    notes: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE attendance
        SET clock_out = ?, clock_out_upload_status = ?, notes = ?
        WHERE id = ?
        "#,
    )
    .bind(clock_out)
    .bind(UploadStatus::Pending)
    .bind(notes)
    .bind(record_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_id_for_staff(
    pool: &MySqlPool,
    record_id: u64,
    staff_id: u64,
) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>("SELECT * FROM attendance WHERE id = ? AND staff_id = ?")
        .bind(record_id)
        .bind(staff_id)
        .fetch_optional(pool)
        .await
}

/// Latest record (open or closed) whose clock-in falls inside `[from, to)`.
pub async fn find_today(
    pool: &MySqlPool,
    staff_id: u64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(
        r#"
        SELECT * FROM attendance
        WHERE staff_id = ? AND clock_in >= ? AND clock_in < ?
        ORDER BY clock_in DESC
        LIMIT 1
        "#,
    )
    .bind(staff_id)
    .bind(from)
    .bind(to)
    .fetch_optional(pool)
    .await
}

fn history_where(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> String {
    let mut sql = String::from("WHERE staff_id = ?");
    if from.is_some() {
        sql.push_str(" AND clock_in >= ?");
    }
    if to.is_some() {
        sql.push_str(" AND clock_in < ?");
    }
    sql
}

pub async fn count_history(
    pool: &MySqlPool,
    staff_id: u64,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<i64, sqlx::Error> {
    let sql = format!(
        "SELECT COUNT(*) FROM attendance {}",
        history_where(from, to)
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(staff_id);
    if let Some(from) = from {
        query = query.bind(from);
    }
    if let Some(to) = to {
        query = query.bind(to);
    }
    query.fetch_one(pool).await
}

pub async fn list_history(
    pool: &MySqlPool,
    staff_id: u64,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: u32,
    offset: u32,
) -> Result<Vec<Attendance>, sqlx::Error> {
    let sql = format!(
        "SELECT * FROM attendance {} ORDER BY clock_in DESC LIMIT ? OFFSET ?",
        history_where(from, to)
    );
    let mut query = sqlx::query_as::<_, Attendance>(&sql).bind(staff_id);
    if let Some(from) = from {
        query = query.bind(from);
    }
    if let Some(to) = to {
        query = query.bind(to);
    }
    query
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(pool)
        .await
}

/// Admin listing filters. Date bounds are half-open UTC instants already
/// derived from the deployment timezone by the handler.
#[derive(Debug, Default)]
pub struct AdminFilter {
    pub staff_ids: Vec<u64>,
    pub clock_in_from: Option<DateTime<Utc>>,
    pub clock_in_to: Option<DateTime<Utc>>,
    pub clock_out_from: Option<DateTime<Utc>>,
    pub clock_out_to: Option<DateTime<Utc>>,
}

fn admin_where(filter: &AdminFilter) -> String {
    let mut conditions: Vec<String> = Vec::new();

    if !filter.staff_ids.is_empty() {
        let placeholders = vec!["?"; filter.staff_ids.len()].join(", ");
        conditions.push(format!("staff_id IN ({})", placeholders));
    }
    if filter.clock_in_from.is_some() {
        conditions.push("clock_in >= ?".into());
    }
    if filter.clock_in_to.is_some() {
        conditions.push("clock_in < ?".into());
    }
    if filter.clock_out_from.is_some() {
        conditions.push("clock_out >= ?".into());
    }
    if filter.clock_out_to.is_some() {
        conditions.push("clock_out < ?".into());
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

pub async fn count_all(pool: &MySqlPool, filter: &AdminFilter) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM attendance {}", admin_where(filter));
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for staff_id in &filter.staff_ids {
        query = query.bind(*staff_id);
    }
    if let Some(v) = filter.clock_in_from {
        query = query.bind(v);
    }
    if let Some(v) = filter.clock_in_to {
        query = query.bind(v);
    }
    if let Some(v) = filter.clock_out_from {
        query = query.bind(v);
    }
    if let Some(v) = filter.clock_out_to {
        query = query.bind(v);
    }
    query.fetch_one(pool).await
}

/// `sort_column` and `sort_dir` must come from the handler's allow-list;
/// they are interpolated, not bound.
pub async fn list_all(
    pool: &MySqlPool,
    filter: &AdminFilter,
    sort_column: &str,
    sort_dir: &str,
    limit: u32,
    offset: u32,
) -> Result<Vec<Attendance>, sqlx::Error> {
    let sql = format!(
        "SELECT * FROM attendance {} ORDER BY {} {} LIMIT ? OFFSET ?",
        admin_where(filter),
        sort_column,
        sort_dir
    );
    let mut query = sqlx::query_as::<_, Attendance>(&sql);
    for staff_id in &filter.staff_ids {
        query = query.bind(*staff_id);
    }
    if let Some(v) = filter.clock_in_from {
        query = query.bind(v);
    }
    if let Some(v) = filter.clock_in_to {
        query = query.bind(v);
    }
    if let Some(v) = filter.clock_out_from {
        query = query.bind(v);
    }
    if let Some(v) = filter.clock_out_to {
        query = query.bind(v);
    }
    query
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_where_empty_filter_has_no_clause() {
        assert_eq!(admin_where(&AdminFilter::default()), "");
    }

    #[test]
    fn admin_where_builds_in_list_and_ranges() {
        let filter = AdminFilter {
            staff_ids: vec![1, 2, 3],
            clock_in_from: Some(Utc::now()),
            clock_out_to: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(
            admin_where(&filter),
            "WHERE staff_id IN (?, ?, ?) AND clock_in >= ? AND clock_out < ?"
        );
    }

    #[test]
    fn history_where_appends_range_conditions() {
        assert_eq!(history_where(None, None), "WHERE staff_id = ?");
        assert_eq!(
            history_where(Some(Utc::now()), Some(Utc::now())),
            "WHERE staff_id = ? AND clock_in >= ? AND clock_in < ?"
        );
    }
}
