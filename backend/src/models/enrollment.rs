use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::{Entity, SqlValue};
use crate::error::AppError;
use crate::validation::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub start_date: DateTime<Utc>,
    pub finish_date: DateTime<Utc>,
    pub approbed_sections: i64,
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub student_id: String,
    pub course_id: String,
    pub start_date: DateTime<Utc>,
    pub finish_date: DateTime<Utc>,
    pub approbed_sections: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnrollRequest {
    pub student_id: String,
    pub course_id: String,
}

impl Validate for EnrollRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.student_id.trim().is_empty() {
            return Err(AppError::Validation("studentId must not be blank".to_string()));
        }
        if self.course_id.trim().is_empty() {
            return Err(AppError::Validation("courseId must not be blank".to_string()));
        }
        Ok(())
    }
}

impl Entity for Enrollment {
    type New = NewEnrollment;

    const NAME: &'static str = "Enrollment";
    const TABLE: &'static str = "enrollments";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "student_id",
        "course_id",
        "start_date",
        "finish_date",
        "approbed_sections",
    ];

    fn column(property: &str) -> Option<&'static str> {
        match property {
            "id" => Some("id"),
            "studentId" => Some("student_id"),
            "courseId" => Some("course_id"),
            "startDate" => Some("start_date"),
            "finishDate" => Some("finish_date"),
            "approbedSections" => Some("approbed_sections"),
            _ => None,
        }
    }

    fn insert_values(new: NewEnrollment) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("student_id", new.student_id.into()),
            ("course_id", new.course_id.into()),
            ("start_date", new.start_date.into()),
            ("finish_date", new.finish_date.into()),
            ("approbed_sections", new.approbed_sections.into()),
        ]
    }
}
