pub mod course;
pub mod enrollment;

use axum::middleware;
use axum::routing::{patch, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};

use crate::auth::{require_admin, require_student};
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let admin = middleware::from_fn_with_state(state.auth.clone(), require_admin);
    let student = middleware::from_fn_with_state(state.auth.clone(), require_student);

    Router::new()
        .route("/health", get(health))
        .route(
            "/course",
            get(course::find_courses).merge(
                post(course::create_course)
                    .patch(course::update_all_courses)
                    .route_layer(admin.clone()),
            ),
        )
        .route("/course/count", get(course::count_courses))
        .route(
            "/course/{id}",
            get(course::find_course_by_id).merge(
                patch(course::update_course_by_id)
                    .put(course::replace_course_by_id)
                    .delete(course::delete_course_by_id)
                    .route_layer(admin),
            ),
        )
        .route(
            "/course-enrollment",
            post(enrollment::enroll).route_layer(student),
        )
        .fallback(fallback)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn fallback() -> AppError {
    AppError::NotFound
}
