pub mod announcement;
pub mod attendance;
pub mod employee;
pub mod event;
pub mod feedback;
pub mod leave_request;
pub mod project;
pub mod resource;
pub mod role;
pub mod user;
