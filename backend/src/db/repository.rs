use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::filter::{Filter, Where, push_order, push_where, push_window};
use crate::db::{SqlValue, push_value};
use crate::error::AppError;
use crate::models::{Course, Enrollment};

/// A record type stored in its own table with a server-generated text `id`.
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {
    type New: Send + 'static;

    const NAME: &'static str;
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn column(property: &str) -> Option<&'static str>;

    /// Non-id column values of a new record, every column present.
    fn insert_values(new: Self::New) -> Vec<(&'static str, SqlValue)>;
}

pub trait MutableEntity: Entity {
    type Patch: Send + Sync + 'static;

    fn patch_values(patch: &Self::Patch) -> Vec<(&'static str, SqlValue)>;
}

#[async_trait]
pub trait ReadRepository<E: Entity>: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<E>, AppError>;
    async fn find(&self, filter: &Filter) -> Result<Vec<E>, AppError>;
    async fn find_one(&self, where_clause: &Where) -> Result<Option<E>, AppError>;
    async fn count(&self, where_clause: Option<&Where>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait CreateRepository<E: Entity>: Send + Sync {
    async fn create(&self, new: E::New) -> Result<E, AppError>;

    /// `None` when a uniqueness constraint already holds a matching record.
    async fn create_if_absent(&self, new: E::New) -> Result<Option<E>, AppError>;
}

#[async_trait]
pub trait WriteRepository<E: MutableEntity>: Send + Sync {
    async fn update_all(&self, patch: &E::Patch, where_clause: Option<&Where>) -> Result<u64, AppError>;
    async fn update_by_id(&self, id: &str, patch: &E::Patch) -> Result<(), AppError>;
    async fn replace_by_id(&self, id: &str, new: E::New) -> Result<(), AppError>;
    async fn delete_by_id(&self, id: &str) -> Result<(), AppError>;
}

pub trait CourseStore: ReadRepository<Course> + CreateRepository<Course> + WriteRepository<Course> {}

impl<T> CourseStore for T where
    T: ReadRepository<Course> + CreateRepository<Course> + WriteRepository<Course>
{
}

pub trait EnrollmentStore: ReadRepository<Enrollment> + CreateRepository<Enrollment> {}

impl<T> EnrollmentStore for T where T: ReadRepository<Enrollment> + CreateRepository<Enrollment> {}

pub struct SqliteRepository<E> {
    db: SqlitePool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for SqliteRepository<E> {
    fn clone(&self) -> Self {
        Self::new(self.db.clone())
    }
}

impl<E> SqliteRepository<E> {
    pub fn new(db: SqlitePool) -> Self {
        Self { db, _entity: PhantomData }
    }
}

impl<E: Entity> SqliteRepository<E> {
    fn select() -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!("SELECT {} FROM {}", E::COLUMNS.join(", "), E::TABLE))
    }

    fn insert(id: &str, values: Vec<(&'static str, SqlValue)>) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(format!("INSERT INTO {} (id", E::TABLE));
        for (column, _) in &values {
            qb.push(", ").push(*column);
        }
        qb.push(") VALUES (");
        push_value(&mut qb, SqlValue::Text(id.to_string()));
        for (_, value) in values {
            qb.push(", ");
            push_value(&mut qb, value);
        }
        qb.push(")");
        qb
    }

    fn update(values: Vec<(&'static str, SqlValue)>) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
        for (i, (column, value)) in values.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(column).push(" = ");
            push_value(&mut qb, value);
        }
        qb
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<E>, AppError> {
        let mut qb = Self::select();
        qb.push(" WHERE id = ");
        push_value(&mut qb, SqlValue::Text(id.to_string()));
        Ok(qb.build_query_as::<E>().fetch_optional(&self.db).await?)
    }

    async fn fetch_created(&self, id: &str) -> Result<E, AppError> {
        self.fetch_by_id(id)
            .await?
            .ok_or(AppError::Database(sqlx::Error::RowNotFound))
    }

    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }

    fn not_found(id: &str) -> AppError {
        AppError::EntityNotFound { entity: E::NAME, id: id.to_string() }
    }
}

#[async_trait]
impl<E: Entity> ReadRepository<E> for SqliteRepository<E> {
    async fn find_by_id(&self, id: &str) -> Result<Option<E>, AppError> {
        self.fetch_by_id(id).await
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<E>, AppError> {
        let mut qb = Self::select();
        if let Some(clause) = &filter.where_clause {
            qb.push(" WHERE ");
            push_where::<E>(&mut qb, clause)?;
        }
        if let Some(order) = &filter.order {
            push_order::<E>(&mut qb, order)?;
        }
        push_window(&mut qb, filter);
        Ok(qb.build_query_as::<E>().fetch_all(&self.db).await?)
    }

    async fn find_one(&self, where_clause: &Where) -> Result<Option<E>, AppError> {
        let mut qb = Self::select();
        qb.push(" WHERE ");
        push_where::<E>(&mut qb, where_clause)?;
        qb.push(" LIMIT 1");
        Ok(qb.build_query_as::<E>().fetch_optional(&self.db).await?)
    }

    async fn count(&self, where_clause: Option<&Where>) -> Result<u64, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
        if let Some(clause) = where_clause {
            qb.push(" WHERE ");
            push_where::<E>(&mut qb, clause)?;
        }
        let count: i64 = qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl<E: Entity> CreateRepository<E> for SqliteRepository<E> {
    async fn create(&self, new: E::New) -> Result<E, AppError> {
        let id = Uuid::new_v4().to_string();
        let mut qb = Self::insert(&id, E::insert_values(new));
        qb.build()
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_insert(e, E::NAME))?;
        self.fetch_created(&id).await
    }

    async fn create_if_absent(&self, new: E::New) -> Result<Option<E>, AppError> {
        let id = Uuid::new_v4().to_string();
        let mut qb = Self::insert(&id, E::insert_values(new));
        qb.push(" ON CONFLICT DO NOTHING");
        let inserted = qb.build().execute(&self.db).await?.rows_affected();
        if inserted == 0 {
            return Ok(None);
        }
        self.fetch_created(&id).await.map(Some)
    }
}

#[async_trait]
impl<E: MutableEntity> WriteRepository<E> for SqliteRepository<E> {
    async fn update_all(&self, patch: &E::Patch, where_clause: Option<&Where>) -> Result<u64, AppError> {
        let values = E::patch_values(patch);
        if values.is_empty() {
            return self.count(where_clause).await;
        }
        let mut qb = Self::update(values);
        if let Some(clause) = where_clause {
            qb.push(" WHERE ");
            push_where::<E>(&mut qb, clause)?;
        }
        let result = qb
            .build()
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_insert(e, E::NAME))?;
        Ok(result.rows_affected())
    }

    async fn update_by_id(&self, id: &str, patch: &E::Patch) -> Result<(), AppError> {
        let values = E::patch_values(patch);
        if values.is_empty() {
            return if self.exists(id).await? { Ok(()) } else { Err(Self::not_found(id)) };
        }
        let mut qb = Self::update(values);
        qb.push(" WHERE id = ");
        push_value(&mut qb, SqlValue::Text(id.to_string()));
        let updated = qb
            .build()
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_insert(e, E::NAME))?
            .rows_affected();
        if updated == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn replace_by_id(&self, id: &str, new: E::New) -> Result<(), AppError> {
        let mut qb = Self::update(E::insert_values(new));
        qb.push(" WHERE id = ");
        push_value(&mut qb, SqlValue::Text(id.to_string()));
        let replaced = qb
            .build()
            .execute(&self.db)
            .await
            .map_err(|e| AppError::from_insert(e, E::NAME))?
            .rows_affected();
        if replaced == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), AppError> {
        let deleted = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", E::TABLE))
            .bind(id)
            .execute(&self.db)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, migrate};
    use crate::models::{CoursePatch, NewCourse, NewEnrollment};
    use chrono::Utc;

    async fn setup_test_db() -> SqlitePool {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        migrate(&pool).await.expect("Failed to run migrations");
        pool
    }

    fn new_course(name: &str, duration: Option<i64>) -> NewCourse {
        NewCourse {
            name: name.to_string(),
            description: None,
            duration,
        }
    }

    fn new_enrollment(student_id: &str, course_id: &str) -> NewEnrollment {
        let now = Utc::now();
        NewEnrollment {
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            start_date: now,
            finish_date: now,
            approbed_sections: 0,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_course() {
        let repo = SqliteRepository::<Course>::new(setup_test_db().await);

        let course = repo
            .create(new_course("Rust for Systems", Some(6)))
            .await
            .expect("Failed to create course");
        assert!(!course.id.is_empty());
        assert_eq!(course.duration, Some(6));

        let found = repo
            .find_by_id(&course.id)
            .await
            .expect("Failed to find course")
            .expect("Course not found");
        assert_eq!(found, course);

        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_with_filter() {
        let repo = SqliteRepository::<Course>::new(setup_test_db().await);
        for (name, duration) in [("A", Some(1)), ("B", Some(4)), ("C", Some(8)), ("D", None)] {
            repo.create(new_course(name, duration)).await.unwrap();
        }

        let filter = Filter::parse(r#"{"where":{"duration":{"gte":4}},"order":"duration DESC"}"#).unwrap();
        let names: Vec<String> = repo
            .find(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["C", "B"]);

        let filter = Filter::parse(r#"{"order":"name ASC","limit":2,"skip":1}"#).unwrap();
        let names: Vec<String> = repo.find(&filter).await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["B", "C"]);

        let unset = Where::eq("duration", serde_json::Value::Null);
        assert_eq!(repo.count(Some(&unset)).await.unwrap(), 1);
        assert_eq!(repo.count(None).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_unknown_property_is_bad_request() {
        let repo = SqliteRepository::<Course>::new(setup_test_db().await);
        let err = repo.count(Some(&Where::eq("secret", 1))).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_update_by_id_and_replace() {
        let repo = SqliteRepository::<Course>::new(setup_test_db().await);
        let course = repo
            .create(NewCourse {
                name: "Databases".to_string(),
                description: Some("SQL basics".to_string()),
                duration: Some(3),
            })
            .await
            .unwrap();

        let patch = CoursePatch {
            duration: Some(Some(5)),
            ..CoursePatch::default()
        };
        repo.update_by_id(&course.id, &patch).await.unwrap();
        let updated = repo.find_by_id(&course.id).await.unwrap().unwrap();
        assert_eq!(updated.duration, Some(5));
        assert_eq!(updated.description.as_deref(), Some("SQL basics"));

        repo.replace_by_id(&course.id, new_course("Databases II", None)).await.unwrap();
        let replaced = repo.find_by_id(&course.id).await.unwrap().unwrap();
        assert_eq!(replaced.name, "Databases II");
        assert_eq!(replaced.description, None);
        assert_eq!(replaced.duration, None);
    }

    #[tokio::test]
    async fn test_missing_id_is_entity_not_found() {
        let repo = SqliteRepository::<Course>::new(setup_test_db().await);

        let err = repo.update_by_id("nope", &CoursePatch::default()).await.unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound { entity: "Course", .. }));

        let err = repo.replace_by_id("nope", new_course("X", None)).await.unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound { .. }));

        let err = repo.delete_by_id("nope").await.unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_all_and_delete() {
        let repo = SqliteRepository::<Course>::new(setup_test_db().await);
        let a = repo.create(new_course("A", None)).await.unwrap();
        repo.create(new_course("B", None)).await.unwrap();
        repo.create(new_course("C", Some(2))).await.unwrap();

        let patch = CoursePatch {
            duration: Some(Some(10)),
            ..CoursePatch::default()
        };
        let unset = Where::eq("duration", serde_json::Value::Null);
        assert_eq!(repo.update_all(&patch, Some(&unset)).await.unwrap(), 2);
        assert_eq!(repo.count(Some(&Where::eq("duration", 10))).await.unwrap(), 2);

        repo.delete_by_id(&a.id).await.unwrap();
        assert!(repo.find_by_id(&a.id).await.unwrap().is_none());
        assert_eq!(repo.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_enrollment_create_if_absent_is_unique_per_pair() {
        let repo = SqliteRepository::<Enrollment>::new(setup_test_db().await);

        let first = repo
            .create_if_absent(new_enrollment("s1", "c1"))
            .await
            .expect("Failed to insert enrollment");
        assert!(first.is_some());

        let again = repo.create_if_absent(new_enrollment("s1", "c1")).await.unwrap();
        assert!(again.is_none());

        let other = repo.create_if_absent(new_enrollment("s2", "c1")).await.unwrap();
        assert!(other.is_some());

        assert_eq!(repo.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_plain_create_reports_conflict() {
        let repo = SqliteRepository::<Enrollment>::new(setup_test_db().await);
        repo.create(new_enrollment("s1", "c1")).await.unwrap();
        let err = repo.create(new_enrollment("s1", "c1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
