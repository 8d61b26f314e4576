use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A list-bearing resource. Mutations announce the resource whose lists changed.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resource {
    Employees,
    Attendance,
    AttendanceRequests,
    Leave,
    Announcements,
    Events,
    Projects,
    Feedback,
    Permissions,
}

impl Resource {
    /// Lists that embed rows of this resource (employee names in review queues).
    pub fn dependents(self) -> &'static [Resource] {
        match self {
            Resource::Employees => &[
                Resource::AttendanceRequests,
                Resource::Leave,
                Resource::Feedback,
            ],
            _ => &[],
        }
    }

    /// Whether a change to `changed` makes lists of `self` stale.
    pub fn affected_by(self, changed: Resource) -> bool {
        self == changed || changed.dependents().contains(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_changes_reach_lists_showing_employee_names() {
        assert!(Resource::Leave.affected_by(Resource::Employees));
        assert!(Resource::Feedback.affected_by(Resource::Employees));
        assert!(Resource::AttendanceRequests.affected_by(Resource::Employees));
        assert!(Resource::Employees.affected_by(Resource::Employees));
        assert!(!Resource::Events.affected_by(Resource::Employees));
        assert!(!Resource::Employees.affected_by(Resource::Leave));
    }
}
