use course_core::model::{
    CompletionStatus, Concept, ConceptContent, ConceptId, Course, CourseId, CourseSettings, Quiz,
    UserId,
};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::{ProgressRecord, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn concept_id_from_i64(v: i64) -> Result<ConceptId, StorageError> {
    Ok(ConceptId::new(i64_to_u64("concept_id", v)?))
}

pub(crate) fn course_id_to_i64(id: CourseId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("course_id overflow".into()))
}

pub(crate) fn concept_id_to_i64(id: ConceptId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("concept_id overflow".into()))
}

pub(crate) fn user_id_from_str(s: &str) -> Result<UserId, StorageError> {
    let uuid = Uuid::parse_str(s)
        .map_err(|_| StorageError::Serialization(format!("invalid user_id: {s}")))?;
    Ok(UserId::new(uuid))
}

fn threshold_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_course_row(row: &sqlx::sqlite::SqliteRow) -> Result<Course, StorageError> {
    let id = course_id_from_i64(row.try_get("id").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let description: Option<String> = row.try_get("description").map_err(ser)?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(ser)?;

    let settings = CourseSettings::new(
        threshold_from_i64("mastery_threshold", row.try_get("mastery_threshold").map_err(ser)?)?,
        threshold_from_i64(
            "quiz_pass_threshold",
            row.try_get("quiz_pass_threshold").map_err(ser)?,
        )?,
    )
    .map_err(ser)?;

    Course::new(id, title, description, settings, created_at).map_err(ser)
}

pub(crate) fn map_concept_row(
    row: &sqlx::sqlite::SqliteRow,
    prerequisites: Vec<ConceptId>,
) -> Result<Concept, StorageError> {
    let id = concept_id_from_i64(row.try_get("id").map_err(ser)?)?;
    let course_id = course_id_from_i64(row.try_get("course_id").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let description: Option<String> = row.try_get("description").map_err(ser)?;

    let complexity_i64: i64 = row.try_get("complexity").map_err(ser)?;
    let complexity = u8::try_from(complexity_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid complexity: {complexity_i64}")))?;

    let est_learning_hours_f64: f64 = row.try_get("est_learning_hours").map_err(ser)?;
    #[allow(clippy::cast_possible_truncation)]
    let est_learning_hours = est_learning_hours_f64 as f32;

    let position_i64: i64 = row.try_get("position").map_err(ser)?;
    let position = u32::try_from(position_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid position: {position_i64}")))?;

    let content: Option<ConceptContent> = row
        .try_get::<Option<String>, _>("content")
        .map_err(ser)?
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(ser)?;

    let quiz: Option<Quiz> = row
        .try_get::<Option<String>, _>("quiz")
        .map_err(ser)?
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(ser)?;

    Concept::new(
        id,
        course_id,
        title,
        description,
        complexity,
        est_learning_hours,
        position,
        prerequisites,
        content,
        quiz,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ProgressRecord, StorageError> {
    let user_id = user_id_from_str(row.try_get::<String, _>("user_id").map_err(ser)?.as_str())?;
    let course_id = course_id_from_i64(row.try_get("course_id").map_err(ser)?)?;
    let concept_id = concept_id_from_i64(row.try_get("concept_id").map_err(ser)?)?;

    let mastery_score = row
        .try_get::<Option<i64>, _>("mastery_score")
        .map_err(ser)?
        .map(|v| {
            u8::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("invalid mastery_score: {v}")))
        })
        .transpose()?;

    let attempts_i64: i64 = row.try_get("attempts").map_err(ser)?;
    let attempts = u32::try_from(attempts_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid attempts: {attempts_i64}")))?;

    let status_str: String = row.try_get("status").map_err(ser)?;
    let status = CompletionStatus::parse(&status_str).map_err(ser)?;

    Ok(ProgressRecord {
        user_id,
        course_id,
        concept_id,
        mastery_score,
        description_read: row.try_get::<bool, _>("description_read").map_err(ser)?,
        video_watched: row.try_get::<bool, _>("video_watched").map_err(ser)?,
        quiz_passed: row.try_get::<bool, _>("quiz_passed").map_err(ser)?,
        attempts,
        status,
        last_accessed_at: row.try_get("last_accessed_at").map_err(ser)?,
    })
}
