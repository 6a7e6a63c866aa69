use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::AuthStrategies;
use crate::db::{CourseStore, SqliteRepository};
use crate::models::{Course, Enrollment};
use crate::services::EnrollmentService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub courses: Arc<dyn CourseStore>,
    pub enrollments: Arc<EnrollmentService>,
    pub auth: AuthStrategies,
}

impl AppState {
    pub fn new(db: SqlitePool, auth: AuthStrategies) -> Self {
        let enrollments = EnrollmentService::new(
            Arc::new(SqliteRepository::<Course>::new(db.clone())),
            Arc::new(SqliteRepository::<Enrollment>::new(db.clone())),
        );
        Self {
            courses: Arc::new(SqliteRepository::<Course>::new(db.clone())),
            enrollments: Arc::new(enrollments),
            auth,
            db,
        }
    }
}
