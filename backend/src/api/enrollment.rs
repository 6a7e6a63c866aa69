use axum::extract::State;
use axum::{Extension, Json};
use tracing::debug;

use crate::auth::Principal;
use crate::error::AppError;
use crate::models::EnrollRequest;
use crate::state::AppState;
use crate::validation::ValidatedJson;

pub async fn enroll(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ValidatedJson(req): ValidatedJson<EnrollRequest>,
) -> Result<Json<bool>, AppError> {
    debug!(
        "{} requested enrollment of student {} in course {}",
        principal.subject, req.student_id, req.course_id
    );
    let enrolled = state.enrollments.enroll(req).await?;
    Ok(Json(enrolled))
}
