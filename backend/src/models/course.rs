use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::{Entity, MutableEntity, SqlValue};
use crate::error::AppError;
use crate::validation::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Length of the course in weeks.
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCourse {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
}

/// Partial update. An absent property is left alone; `null` clears a nullable one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoursePatch {
    #[serde(default, deserialize_with = "super::nullable")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub duration: Option<Option<i64>>,
}

/// Full replacement body. `id` may be echoed back but must match the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CourseReplacement {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
}

impl CourseReplacement {
    pub fn into_new_course(self, path_id: &str) -> Result<NewCourse, AppError> {
        if let Some(id) = &self.id {
            if id != path_id {
                return Err(AppError::BadRequest(format!(
                    "id property ({}) cannot be changed to {}",
                    path_id, id
                )));
            }
        }
        Ok(NewCourse {
            name: self.name,
            description: self.description,
            duration: self.duration,
        })
    }
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name must not be blank".to_string()));
    }
    Ok(())
}

fn validate_duration(duration: Option<i64>) -> Result<(), AppError> {
    match duration {
        Some(weeks) if weeks < 0 => Err(AppError::Validation(format!(
            "duration must be a non-negative number of weeks, got {}",
            weeks
        ))),
        _ => Ok(()),
    }
}

impl Validate for NewCourse {
    fn validate(&self) -> Result<(), AppError> {
        validate_name(&self.name)?;
        validate_duration(self.duration)
    }
}

impl Validate for CoursePatch {
    fn validate(&self) -> Result<(), AppError> {
        match &self.name {
            Some(Some(name)) => validate_name(name)?,
            Some(None) => return Err(AppError::Validation("name must not be null".to_string())),
            None => {}
        }
        validate_duration(self.duration.flatten())
    }
}

impl Validate for CourseReplacement {
    fn validate(&self) -> Result<(), AppError> {
        validate_name(&self.name)?;
        validate_duration(self.duration)
    }
}

impl Entity for Course {
    type New = NewCourse;

    const NAME: &'static str = "Course";
    const TABLE: &'static str = "courses";
    const COLUMNS: &'static [&'static str] = &["id", "name", "description", "duration"];

    fn column(property: &str) -> Option<&'static str> {
        match property {
            "id" => Some("id"),
            "name" => Some("name"),
            "description" => Some("description"),
            "duration" => Some("duration"),
            _ => None,
        }
    }

    fn insert_values(new: NewCourse) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("name", new.name.into()),
            ("description", new.description.into()),
            ("duration", new.duration.into()),
        ]
    }
}

impl MutableEntity for Course {
    type Patch = CoursePatch;

    fn patch_values(patch: &CoursePatch) -> Vec<(&'static str, SqlValue)> {
        let mut values: Vec<(&'static str, SqlValue)> = Vec::new();
        if let Some(Some(name)) = &patch.name {
            values.push(("name", name.clone().into()));
        }
        if let Some(description) = &patch.description {
            values.push(("description", description.clone().into()));
        }
        if let Some(duration) = patch.duration {
            values.push(("duration", duration.into()));
        }
        values
    }
}
