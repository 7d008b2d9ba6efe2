//! Lab allocation portal business logic
//!
//! This crate owns the SQLite schema and every operation of the portal: student
//! records, courses and their lab sessions, teaching preferences, special requests,
//! allocation runs and manual edits, exports, the notification outbox and the
//! semester reset. It is consumed by the gslas-api HTTP service but can also be used
//! by CLI commands or background workers.

pub mod allocation;
pub mod course;
pub mod db;
pub mod error;
pub mod export;
pub mod notification;
pub mod portal;
pub mod preference;
pub mod semester;
pub mod special_request;
pub mod student;
pub mod weights;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use allocation::{
    AllocationRun, AllocationSummary, AssignedSession, CourseAllocation, DashboardStatistics,
    GroupAllocation, GroupSession, PenaltyScore, StudentAllocation, StudentAllocations,
};
pub use course::{Course, CourseRequest, Lab, LabInput, TimetableImport, UpdateCourseRequest};
pub use error::{OrchestratorError, Result};
pub use notification::{
    Attachment, BroadcastRequest, ContactRequest, NewMail, NotificationReceipt, OutboxMessage,
};
pub use portal::Portal;
pub use preference::{PreferenceEntry, TeachingPreference};
pub use semester::ResetSummary;
pub use special_request::{ReviewOutcome, ReviewRequest, SpecialRequest, SpecialRequestSubmission};
pub use student::{RegisterStudentRequest, SemesterInfoRequest, Student, UpdateProfileRequest};
pub use weights::AllocationWeights;
