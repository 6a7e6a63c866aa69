pub mod enrollment;

pub use enrollment::{EnrollmentService, enrollment_window};
