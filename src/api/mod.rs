pub mod announcement;
pub mod attendance;
pub mod attendance_request;
pub mod employee;
pub mod event;
pub mod feedback;
pub mod leave_request;
pub mod permission;
pub mod profile;
pub mod project;

use crate::{auth::auth::AuthUser, error::ApiError};

/// Reviewers may not decide on their own requests.
pub(crate) fn ensure_not_own(reviewer: &AuthUser, owner_employee_id: u64) -> Result<(), ApiError> {
    if reviewer.employee_id == Some(owner_employee_id) {
        return Err(ApiError::Forbidden(
            "You cannot review your own request".to_string(),
        ));
    }
    Ok(())
}

/// Owner of a pending request the reviewer may decide on.
///
/// `owner` is `None` when no pending row matched.
pub(crate) fn reviewable(
    reviewer: &AuthUser,
    owner: Option<u64>,
    what: &str,
) -> Result<u64, ApiError> {
    let owner = owner.ok_or_else(|| ApiError::already_processed(what))?;
    ensure_not_own(reviewer, owner)?;
    Ok(owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn reviewer(employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 3,
            username: "hr".into(),
            role: Role::Hr,
            employee_id,
        }
    }

    #[test]
    fn own_requests_cannot_be_reviewed() {
        assert!(matches!(
            ensure_not_own(&reviewer(Some(7)), 7),
            Err(ApiError::Forbidden(_))
        ));
        assert!(ensure_not_own(&reviewer(Some(7)), 8).is_ok());
        assert!(ensure_not_own(&reviewer(None), 7).is_ok());
    }

    #[test]
    fn self_review_is_forbidden_before_status_is_considered() {
        let hr = reviewer(Some(7));
        assert!(matches!(
            reviewable(&hr, Some(7), "Attendance request"),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            reviewable(&hr, None, "Attendance request"),
            Err(ApiError::Conflict(msg)) if msg == "Attendance request not found or already processed"
        ));
        assert_eq!(reviewable(&hr, Some(8), "Attendance request").unwrap(), 8);
    }
}
