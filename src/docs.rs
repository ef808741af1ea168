use crate::api::attendance::{AttendancePage, AttendanceResponse};
use crate::model::attendance::{Attendance, UploadStatus};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "WFH Attendance API",
        version = "1.0.0",
        description = r#"
## Work-From-Home Attendance Tracker

Staff clock in and out with a proof photo; an admin role queries aggregated
records.

### 🔹 Key Features
- **Clock-in / Clock-out**
  - One open record per staff member per calendar day
  - Proof photo uploaded asynchronously in the background
- **Upload Status Tracking**
  - Each photo slot moves through `PENDING → UPLOADING → COMPLETED | FAILED`
  - Status is observable on every read; failed uploads are never retried
- **History & Reporting**
  - Paginated personal history with date filters
  - Admin-wide listing with multi-staff filters and sorting
- **Signed Photo URLs**
  - Photo links are time-limited and re-signed on every response

### 🔐 Security
All attendance endpoints require **JWT Bearer authentication**.
The aggregated listing requires the **Admin** role.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::get_today,
        crate::api::attendance::get_history,
        crate::api::attendance::get_by_id,

        crate::api::admin::list_attendance,
    ),
    components(
        schemas(
            Attendance,
            AttendanceResponse,
            AttendancePage,
            UploadStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Clock-in/out and personal history APIs"),
        (name = "Admin", description = "Aggregated attendance reporting APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
