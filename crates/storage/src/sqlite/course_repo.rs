use course_core::model::{Course, CourseId};

use super::{
    SqliteRepository,
    mapping::{course_id_to_i64, map_course_row},
};
use crate::repository::{CourseRepository, StorageError};

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO courses (
                id, title, description, mastery_threshold, quiz_pass_threshold, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                -- keep created_at from the original insert; only update mutable fields
                title = excluded.title,
                description = excluded.description,
                mastery_threshold = excluded.mastery_threshold,
                quiz_pass_threshold = excluded.quiz_pass_threshold
            ",
        )
        .bind(course_id_to_i64(course.id())?)
        .bind(course.title().to_owned())
        .bind(course.description().map(ToOwned::to_owned))
        .bind(i64::from(course.settings().mastery_threshold()))
        .bind(i64::from(course.settings().quiz_pass_threshold()))
        .bind(course.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, description, mastery_threshold, quiz_pass_threshold, created_at
            FROM courses
            WHERE id = ?1
            ",
        )
        .bind(course_id_to_i64(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_course_row(&row),
            None => Err(StorageError::NotFound),
        }
    }
}
