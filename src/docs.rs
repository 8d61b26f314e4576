use crate::api::announcement::{CreateAnnouncement, UpdateAnnouncement};
use crate::api::attendance_request::CreateAttendanceRequest;
use crate::api::employee::{CreateEmployee, LinkAccount, UpdateEmployee};
use crate::api::event::{CreateEvent, UpdateEvent};
use crate::api::feedback::{RespondFeedback, SubmitFeedback};
use crate::api::leave_request::CreateLeave;
use crate::api::permission::GrantChange;
use crate::api::profile::{ChangePassword, UpdateContact};
use crate::api::project::{AddMember, CreateProject, UpdateProject};
use crate::auth::permissions::Permission;
use crate::error::FieldError;
use crate::listing::{ListQuery, Pagination};
use crate::model::announcement::{Announcement, AnnouncementCategory};
use crate::model::attendance::{Attendance, AttendanceRequest, RequestStatus};
use crate::model::employee::{Employee, EmployeeStatus, Profile};
use crate::model::event::{Event, EventType};
use crate::model::feedback::{Feedback, FeedbackCategory, FeedbackStatus};
use crate::model::leave_request::{LeaveRequest, LeaveType};
use crate::model::project::{Project, ProjectDetail, ProjectMember, ProjectStatus};
use crate::model::role::Role;
use crate::models::{MessageResponse, ReviewDecision};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

pub struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
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

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Portal API",
        version = "1.0.0",
        description = r#"
## HR Portal

Backend for an HR portal whose screens are paginated, searchable and filterable tables.

### Key Features
- **Employees**: directory with search and status/department filters
- **Attendance**: daily check-in/check-out and correction requests
- **Leave**: apply, cancel, approve and reject
- **Announcements and Events**: company-wide notices and calendar
- **Projects**: projects and their members
- **Feedback**: optionally anonymous feedback with HR responses
- **Permissions**: role to permission grants

### List endpoints
Every list accepts `page`, `limit` (max 100), `search` and comma separated facet values,
and answers `{ "data": [...], "pagination": { "page", "limit", "totalPages", "totalCount" } }`.

### Security
Endpoints are protected with **JWT Bearer authentication**; obtain tokens from `/api/auth/login`.

### Errors
Failures answer `{ "message" }`, validation failures add `errors: [{ "field", "message" }]`.
"#,
    ),
    paths(
        crate::api::profile::get_profile,
        crate::api::profile::update_profile,
        crate::api::profile::change_password,

        crate::api::employee::list_employees,
        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::link_account,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::my_attendance,
        crate::api::attendance_request::create_request,
        crate::api::attendance_request::my_requests,
        crate::api::attendance_request::list_requests,
        crate::api::attendance_request::approve_request,
        crate::api::attendance_request::reject_request,

        crate::api::leave_request::apply_leave,
        crate::api::leave_request::my_leaves,
        crate::api::leave_request::cancel_leave,
        crate::api::leave_request::list_leaves,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,

        crate::api::announcement::list_announcements,
        crate::api::announcement::get_announcement,
        crate::api::announcement::create_announcement,
        crate::api::announcement::update_announcement,
        crate::api::announcement::delete_announcement,

        crate::api::event::list_events,
        crate::api::event::get_event,
        crate::api::event::create_event,
        crate::api::event::update_event,
        crate::api::event::delete_event,

        crate::api::project::list_projects,
        crate::api::project::get_project,
        crate::api::project::create_project,
        crate::api::project::update_project,
        crate::api::project::delete_project,
        crate::api::project::add_member,
        crate::api::project::remove_member,

        crate::api::feedback::submit_feedback,
        crate::api::feedback::my_feedback,
        crate::api::feedback::list_feedback,
        crate::api::feedback::respond_feedback,

        crate::api::permission::permission_matrix,
        crate::api::permission::grant_permission,
        crate::api::permission::revoke_permission
    ),
    components(
        schemas(
            ListQuery,
            Pagination,
            FieldError,
            MessageResponse,
            ReviewDecision,
            Role,
            Permission,
            GrantChange,
            Profile,
            UpdateContact,
            ChangePassword,
            Employee,
            EmployeeStatus,
            CreateEmployee,
            UpdateEmployee,
            LinkAccount,
            Attendance,
            AttendanceRequest,
            RequestStatus,
            CreateAttendanceRequest,
            LeaveRequest,
            LeaveType,
            CreateLeave,
            Announcement,
            AnnouncementCategory,
            CreateAnnouncement,
            UpdateAnnouncement,
            Event,
            EventType,
            CreateEvent,
            UpdateEvent,
            Project,
            ProjectStatus,
            ProjectMember,
            ProjectDetail,
            CreateProject,
            UpdateProject,
            AddMember,
            Feedback,
            FeedbackCategory,
            FeedbackStatus,
            SubmitFeedback,
            RespondFeedback
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Profile", description = "Self-service profile APIs"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Attendance", description = "Attendance and correction request APIs"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Announcement", description = "Announcement APIs"),
        (name = "Event", description = "Event calendar APIs"),
        (name = "Project", description = "Project and membership APIs"),
        (name = "Feedback", description = "Feedback APIs"),
        (name = "Permission", description = "Role permission APIs"),
    )
)]
pub struct ApiDoc;
