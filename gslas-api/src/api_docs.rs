use crate::routes::allocation::{AllocationOverview, AssignGroupRequest, RunAllocationRequest};
use crate::routes::communications::ResetRequest;
use gslas_orchestrator::{
    AllocationRun, AllocationSummary, AllocationWeights, AssignedSession, Attachment,
    BroadcastRequest, ContactRequest, Course, CourseAllocation, CourseRequest,
    DashboardStatistics, GroupAllocation, GroupSession, Lab, LabInput, NotificationReceipt,
    OutboxMessage, PenaltyScore, PreferenceEntry, RegisterStudentRequest, ResetSummary,
    ReviewOutcome, ReviewRequest, SemesterInfoRequest, SpecialRequest, SpecialRequestSubmission,
    Student, StudentAllocation, StudentAllocations, TeachingPreference, TimetableImport,
    UpdateCourseRequest, UpdateProfileRequest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::portal::list_courses,
        crate::routes::portal::list_allocations,
        crate::routes::me::get_me,
        crate::routes::me::update_profile,
        crate::routes::me::submit_semester_info,
        crate::routes::me::get_preferences,
        crate::routes::me::submit_preferences,
        crate::routes::me::get_special_request,
        crate::routes::me::submit_special_request,
        crate::routes::me::my_allocations,
        crate::routes::me::contact_student,
        crate::routes::students::list_students,
        crate::routes::students::register_student,
        crate::routes::students::delete_student,
        crate::routes::courses::list_courses,
        crate::routes::courses::create_course,
        crate::routes::courses::get_course,
        crate::routes::courses::update_course,
        crate::routes::courses::delete_course,
        crate::routes::courses::list_labs,
        crate::routes::courses::replace_labs,
        crate::routes::courses::import_timetable,
        crate::routes::special_requests::list_special_requests,
        crate::routes::special_requests::review_special_request,
        crate::routes::allocation::allocation_overview,
        crate::routes::allocation::clear_allocations,
        crate::routes::allocation::run_allocation,
        crate::routes::allocation::list_runs,
        crate::routes::allocation::get_weights,
        crate::routes::allocation::update_weights,
        crate::routes::allocation::course_allocation,
        crate::routes::allocation::set_group_assignment,
        crate::routes::allocation::export_allocations,
        crate::routes::allocation::confirm_allocations,
        crate::routes::communications::list_outbox,
        crate::routes::communications::broadcast,
        crate::routes::communications::reset_semester,
    ),
    components(
        schemas(
            Student,
            RegisterStudentRequest,
            UpdateProfileRequest,
            SemesterInfoRequest,
            Course,
            CourseRequest,
            UpdateCourseRequest,
            Lab,
            LabInput,
            TimetableImport,
            PreferenceEntry,
            TeachingPreference,
            SpecialRequest,
            SpecialRequestSubmission,
            ReviewRequest,
            ReviewOutcome,
            AllocationWeights,
            AllocationSummary,
            AllocationRun,
            AllocationOverview,
            RunAllocationRequest,
            AssignGroupRequest,
            DashboardStatistics,
            PenaltyScore,
            AssignedSession,
            StudentAllocation,
            StudentAllocations,
            CourseAllocation,
            GroupAllocation,
            GroupSession,
            Attachment,
            OutboxMessage,
            NotificationReceipt,
            ContactRequest,
            BroadcastRequest,
            ResetRequest,
            ResetSummary
        )
    ),
    tags(
        (name = "gslas-api", description = "Graduate student lab allocation portal"),
        (name = "health", description = "Liveness and readiness"),
        (name = "portal", description = "Views for every signed-in user"),
        (name = "student", description = "Own record, preferences and requests"),
        (name = "admin", description = "Students, courses, requests and mail"),
        (name = "allocation", description = "Allocation runs and manual edits")
    )
)]
pub struct ApiDoc;
