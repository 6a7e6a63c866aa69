use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::db::{EnrollmentStore, ReadRepository, Where};
use crate::error::AppError;
use crate::models::{Course, EnrollRequest, NewEnrollment};

pub const MISSING_COURSE_MESSAGE: &str = "This course does not exists!";

const DAYS_PER_WEEK: i64 = 7;

pub struct EnrollmentService {
    courses: Arc<dyn ReadRepository<Course>>,
    enrollments: Arc<dyn EnrollmentStore>,
}

impl EnrollmentService {
    pub fn new(
        courses: Arc<dyn ReadRepository<Course>>,
        enrollments: Arc<dyn EnrollmentStore>,
    ) -> Self {
        Self { courses, enrollments }
    }

    /// Enrolls a student. `Ok(false)` means the student was already enrolled.
    pub async fn enroll(&self, req: EnrollRequest) -> Result<bool, AppError> {
        self.enroll_at(req, Utc::now()).await
    }

    pub async fn enroll_at(&self, req: EnrollRequest, now: DateTime<Utc>) -> Result<bool, AppError> {
        let course = self
            .courses
            .find_by_id(&req.course_id)
            .await?
            .ok_or_else(|| AppError::Forbidden(MISSING_COURSE_MESSAGE.to_string()))?;

        let pair = Where::And(vec![
            Where::eq("courseId", req.course_id.as_str()),
            Where::eq("studentId", req.student_id.as_str()),
        ]);
        if self.enrollments.find_one(&pair).await?.is_some() {
            info!("student {} already enrolled in course {}", req.student_id, req.course_id);
            return Ok(false);
        }

        let (start_date, finish_date) = enrollment_window(now, course.duration)?;
        let new = NewEnrollment {
            student_id: req.student_id,
            course_id: req.course_id,
            start_date,
            finish_date,
            approbed_sections: 0,
        };

        // The unique (student_id, course_id) index settles racing requests.
        match self.enrollments.create_if_absent(new).await? {
            Some(enrollment) => {
                info!(
                    "enrolled student {} in course {} until {}",
                    enrollment.student_id, enrollment.course_id, enrollment.finish_date
                );
                Ok(true)
            }
            None => {
                warn!("concurrent enrollment detected for course {}", course.id);
                Ok(false)
            }
        }
    }
}

/// Start and finish of an enrollment: `duration` weeks from `now`, zero when unset.
pub fn enrollment_window(
    now: DateTime<Utc>,
    duration_weeks: Option<i64>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let weeks = duration_weeks.unwrap_or(0);
    let finish = weeks
        .checked_mul(DAYS_PER_WEEK)
        .and_then(Duration::try_days)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| {
            AppError::BadRequest(format!("course duration of {} weeks is out of range", weeks))
        })?;
    Ok((now, finish))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateRepository, Filter, SqliteRepository, connect_in_memory, migrate};
    use crate::models::{Enrollment, NewCourse};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sees no existing enrollment, then loses the insert to another request.
    #[derive(Default)]
    struct RacedEnrollments {
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl ReadRepository<Enrollment> for RacedEnrollments {
        async fn find_by_id(&self, _id: &str) -> Result<Option<Enrollment>, AppError> {
            Ok(None)
        }

        async fn find(&self, _filter: &Filter) -> Result<Vec<Enrollment>, AppError> {
            Ok(Vec::new())
        }

        async fn find_one(&self, _where_clause: &Where) -> Result<Option<Enrollment>, AppError> {
            Ok(None)
        }

        async fn count(&self, _where_clause: Option<&Where>) -> Result<u64, AppError> {
            Ok(1)
        }
    }

    #[async_trait]
    impl CreateRepository<Enrollment> for RacedEnrollments {
        async fn create(&self, _new: NewEnrollment) -> Result<Enrollment, AppError> {
            Err(AppError::Conflict("Enrollment already exists".to_string()))
        }

        async fn create_if_absent(&self, _new: NewEnrollment) -> Result<Option<Enrollment>, AppError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    async fn setup_test_db() -> SqlitePool {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        migrate(&pool).await.expect("Failed to run migrations");
        pool
    }

    fn service(pool: &SqlitePool) -> EnrollmentService {
        EnrollmentService::new(
            Arc::new(SqliteRepository::<Course>::new(pool.clone())),
            Arc::new(SqliteRepository::<Enrollment>::new(pool.clone())),
        )
    }

    async fn course_with(pool: &SqlitePool, duration: Option<i64>) -> Course {
        SqliteRepository::<Course>::new(pool.clone())
            .create(NewCourse { name: "Compilers".to_string(), description: None, duration })
            .await
            .expect("Failed to create course")
    }

    fn request(student_id: &str, course_id: &str) -> EnrollRequest {
        EnrollRequest { student_id: student_id.to_string(), course_id: course_id.to_string() }
    }

    #[test]
    fn test_window_in_weeks() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let (start, finish) = enrollment_window(now, Some(3)).unwrap();
        assert_eq!(start, now);
        assert_eq!(finish, Utc.with_ymd_and_hms(2026, 3, 22, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_window_without_duration_is_empty() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let (start, finish) = enrollment_window(now, None).unwrap();
        assert_eq!(start, finish);
    }

    #[test]
    fn test_window_overflow_is_rejected() {
        let now = Utc::now();
        assert!(matches!(enrollment_window(now, Some(i64::MAX)), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_enroll_missing_course_is_forbidden() {
        let pool = setup_test_db().await;
        let err = service(&pool).enroll(request("s1", "missing")).await.unwrap_err();
        match err {
            AppError::Forbidden(msg) => assert_eq!(msg, MISSING_COURSE_MESSAGE),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enroll_twice_returns_true_then_false() {
        let pool = setup_test_db().await;
        let course = course_with(&pool, Some(4)).await;
        let svc = service(&pool);

        assert!(svc.enroll(request("s1", &course.id)).await.unwrap());
        assert!(!svc.enroll(request("s1", &course.id)).await.unwrap());
        assert!(svc.enroll(request("s2", &course.id)).await.unwrap());

        let enrollments = SqliteRepository::<Enrollment>::new(pool.clone());
        assert_eq!(enrollments.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_enroll_losing_insert_race_returns_false() {
        let pool = setup_test_db().await;
        let course = course_with(&pool, Some(1)).await;
        let enrollments = Arc::new(RacedEnrollments::default());
        let svc = EnrollmentService::new(
            Arc::new(SqliteRepository::<Course>::new(pool.clone())),
            enrollments.clone(),
        );

        assert!(!svc.enroll(request("s1", &course.id)).await.unwrap());
        assert_eq!(enrollments.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enrollment_record() {
        let pool = setup_test_db().await;
        let course = course_with(&pool, Some(2)).await;
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 8, 15, 0).unwrap();

        assert!(service(&pool).enroll_at(request("s1", &course.id), now).await.unwrap());

        let stored = SqliteRepository::<Enrollment>::new(pool.clone())
            .find(&Filter::matching(Where::eq("studentId", "s1")))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        let enrollment = &stored[0];
        assert_eq!(enrollment.course_id, course.id);
        assert_eq!(enrollment.approbed_sections, 0);
        assert_eq!(enrollment.start_date, now);
        assert_eq!(enrollment.finish_date - enrollment.start_date, Duration::weeks(2));
    }

    #[tokio::test]
    async fn test_enrollment_without_duration_finishes_immediately() {
        let pool = setup_test_db().await;
        let course = course_with(&pool, None).await;

        assert!(service(&pool).enroll(request("s1", &course.id)).await.unwrap());

        let enrollment = SqliteRepository::<Enrollment>::new(pool.clone())
            .find_one(&Where::eq("courseId", course.id.as_str()))
            .await
            .unwrap()
            .expect("enrollment stored");
        assert_eq!(enrollment.finish_date, enrollment.start_date);
    }
}
