pub mod course;
pub mod enrollment;

use serde::{Deserialize, Deserializer, Serialize};

pub use course::{Course, CoursePatch, CourseReplacement, NewCourse};
pub use enrollment::{EnrollRequest, Enrollment, NewEnrollment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count {
    pub count: u64,
}

/// Distinguishes `"prop": null` (outer `Some(None)`) from an absent property.
/// Pair with `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
