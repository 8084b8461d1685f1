use std::collections::HashMap;

use course_core::model::{ConceptId, ConceptProgress, CourseId, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{concept_id_from_i64, concept_id_to_i64, course_id_to_i64, map_progress_row},
};
use crate::repository::{ProgressRecord, ProgressRepository, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(
        &self,
        course_id: CourseId,
        progress: &ConceptProgress,
    ) -> Result<(), StorageError> {
        let record = ProgressRecord::from_progress(course_id, progress);

        sqlx::query(
            r"
            INSERT INTO user_concept_progress (
                user_id, course_id, concept_id, mastery_score, description_read,
                video_watched, quiz_passed, attempts, status, last_accessed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(user_id, concept_id) DO UPDATE SET
                mastery_score = excluded.mastery_score,
                description_read = excluded.description_read,
                video_watched = excluded.video_watched,
                quiz_passed = excluded.quiz_passed,
                attempts = excluded.attempts,
                status = excluded.status,
                last_accessed_at = excluded.last_accessed_at
            ",
        )
        .bind(record.user_id.value().to_string())
        .bind(course_id_to_i64(record.course_id)?)
        .bind(concept_id_to_i64(record.concept_id)?)
        .bind(record.mastery_score.map(i64::from))
        .bind(record.description_read)
        .bind(record.video_watched)
        .bind(record.quiz_passed)
        .bind(i64::from(record.attempts))
        .bind(record.status.as_str())
        .bind(record.last_accessed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        concept_id: ConceptId,
    ) -> Result<Option<ConceptProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, course_id, concept_id, mastery_score, description_read,
                   video_watched, quiz_passed, attempts, status, last_accessed_at
            FROM user_concept_progress
            WHERE user_id = ?1 AND concept_id = ?2
            ",
        )
        .bind(user_id.value().to_string())
        .bind(concept_id_to_i64(concept_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| map_progress_row(&row)?.into_progress().map_err(ser))
            .transpose()
    }

    async fn mastery_map(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<HashMap<ConceptId, u8>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT concept_id, mastery_score
            FROM user_concept_progress
            WHERE user_id = ?1 AND course_id = ?2 AND mastery_score IS NOT NULL
            ",
        )
        .bind(user_id.value().to_string())
        .bind(course_id_to_i64(course_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in &rows {
            let concept_id = concept_id_from_i64(row.try_get("concept_id").map_err(ser)?)?;
            let score_i64: i64 = row.try_get("mastery_score").map_err(ser)?;
            let score = u8::try_from(score_i64)
                .map_err(|_| StorageError::Serialization(format!("invalid mastery_score: {score_i64}")))?;
            map.insert(concept_id, score);
        }
        Ok(map)
    }

    async fn list_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Vec<ConceptProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, course_id, concept_id, mastery_score, description_read,
                   video_watched, quiz_passed, attempts, status, last_accessed_at
            FROM user_concept_progress
            WHERE user_id = ?1 AND course_id = ?2
            ORDER BY concept_id
            ",
        )
        .bind(user_id.value().to_string())
        .bind(course_id_to_i64(course_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| map_progress_row(row)?.into_progress().map_err(ser))
            .collect()
    }
}
