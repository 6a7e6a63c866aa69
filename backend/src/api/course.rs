use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::info;

use crate::db::filter::{parse_filter_param, parse_where_param};
use crate::error::AppError;
use crate::models::{Count, Course, CoursePatch, CourseReplacement, NewCourse};
use crate::state::AppState;
use crate::validation::ValidatedJson;

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WhereParams {
    #[serde(rename = "where")]
    where_clause: Option<String>,
}

pub async fn create_course(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<NewCourse>,
) -> Result<Json<Course>, AppError> {
    let course = state.courses.create(req).await?;
    info!("created course {}", course.id);
    Ok(Json(course))
}

pub async fn count_courses(
    State(state): State<AppState>,
    Query(params): Query<WhereParams>,
) -> Result<Json<Count>, AppError> {
    let where_clause = parse_where_param(params.where_clause.as_deref())?;
    let count = state.courses.count(where_clause.as_ref()).await?;
    Ok(Json(Count { count }))
}

pub async fn find_courses(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let filter = parse_filter_param(params.filter.as_deref())?;
    let courses = state.courses.find(&filter).await?;
    Ok(Json(courses))
}

pub async fn update_all_courses(
    State(state): State<AppState>,
    Query(params): Query<WhereParams>,
    ValidatedJson(patch): ValidatedJson<CoursePatch>,
) -> Result<Json<Count>, AppError> {
    let where_clause = parse_where_param(params.where_clause.as_deref())?;
    let count = state.courses.update_all(&patch, where_clause.as_ref()).await?;
    info!("bulk-updated {} courses", count);
    Ok(Json(Count { count }))
}

pub async fn find_course_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Course>, AppError> {
    let filter = parse_filter_param(params.filter.as_deref())?;
    if filter.where_clause.is_some() {
        return Err(AppError::BadRequest(
            "Invalid filter: where is not allowed when finding by id".to_string(),
        ));
    }
    let course = state
        .courses
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::EntityNotFound { entity: "Course", id: id.clone() })?;
    Ok(Json(course))
}

pub async fn update_course_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(patch): ValidatedJson<CoursePatch>,
) -> Result<StatusCode, AppError> {
    state.courses.update_by_id(&id, &patch).await?;
    info!("updated course {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace_course_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<CourseReplacement>,
) -> Result<StatusCode, AppError> {
    let course = body.into_new_course(&id)?;
    state.courses.replace_by_id(&id, course).await?;
    info!("replaced course {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_course_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.courses.delete_by_id(&id).await?;
    info!("deleted course {}", id);
    Ok(StatusCode::NO_CONTENT)
}
