use std::collections::HashMap;

use course_core::model::{Concept, ConceptId, CourseId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{concept_id_from_i64, concept_id_to_i64, course_id_to_i64, map_concept_row},
};
use crate::repository::{ConceptRepository, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn json<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

impl SqliteRepository {
    async fn prerequisites_for(
        &self,
        course_id: CourseId,
        concept_id: ConceptId,
    ) -> Result<Vec<ConceptId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT prerequisite_id
            FROM concept_prerequisites
            WHERE course_id = ?1 AND concept_id = ?2
            ORDER BY ordinal
            ",
        )
        .bind(course_id_to_i64(course_id)?)
        .bind(concept_id_to_i64(concept_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| concept_id_from_i64(row.try_get("prerequisite_id").map_err(json)?))
            .collect()
    }

    /// All prerequisite edges of a course, grouped by dependent concept.
    async fn prerequisites_by_concept(
        &self,
        course_id: CourseId,
    ) -> Result<HashMap<ConceptId, Vec<ConceptId>>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT concept_id, prerequisite_id
            FROM concept_prerequisites
            WHERE course_id = ?1
            ORDER BY concept_id, ordinal
            ",
        )
        .bind(course_id_to_i64(course_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut grouped: HashMap<ConceptId, Vec<ConceptId>> = HashMap::new();
        for row in &rows {
            let concept = concept_id_from_i64(row.try_get("concept_id").map_err(json)?)?;
            let prereq = concept_id_from_i64(row.try_get("prerequisite_id").map_err(json)?)?;
            grouped.entry(concept).or_default().push(prereq);
        }
        Ok(grouped)
    }
}

#[async_trait::async_trait]
impl ConceptRepository for SqliteRepository {
    async fn upsert_concept(&self, concept: &Concept) -> Result<(), StorageError> {
        let content_json = concept
            .content()
            .map(serde_json::to_string)
            .transpose()
            .map_err(json)?;
        let quiz_json = concept
            .quiz()
            .map(serde_json::to_string)
            .transpose()
            .map_err(json)?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO concepts (
                id, course_id, title, description, complexity,
                est_learning_hours, position, content, quiz
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id, course_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                complexity = excluded.complexity,
                est_learning_hours = excluded.est_learning_hours,
                position = excluded.position,
                content = excluded.content,
                quiz = excluded.quiz
            ",
        )
        .bind(concept_id_to_i64(concept.id())?)
        .bind(course_id_to_i64(concept.course_id())?)
        .bind(concept.title().to_owned())
        .bind(concept.description().map(ToOwned::to_owned))
        .bind(i64::from(concept.complexity()))
        .bind(f64::from(concept.est_learning_hours()))
        .bind(i64::from(concept.position()))
        .bind(content_json)
        .bind(quiz_json)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // replace the edge list wholesale; it is tiny and ordered
        sqlx::query(
            r"
            DELETE FROM concept_prerequisites
            WHERE course_id = ?1 AND concept_id = ?2
            ",
        )
        .bind(course_id_to_i64(concept.course_id())?)
        .bind(concept_id_to_i64(concept.id())?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for (ordinal, prereq) in concept.prerequisites().iter().enumerate() {
            let ordinal = i64::try_from(ordinal)
                .map_err(|_| StorageError::Serialization("ordinal overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO concept_prerequisites (course_id, concept_id, prerequisite_id, ordinal)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(course_id_to_i64(concept.course_id())?)
            .bind(concept_id_to_i64(concept.id())?)
            .bind(concept_id_to_i64(*prereq)?)
            .bind(ordinal)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn list_concepts(&self, course_id: CourseId) -> Result<Vec<Concept>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, course_id, title, description, complexity,
                   est_learning_hours, position, content, quiz
            FROM concepts
            WHERE course_id = ?1
            ORDER BY position, id
            ",
        )
        .bind(course_id_to_i64(course_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut edges = self.prerequisites_by_concept(course_id).await?;

        let mut concepts = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = concept_id_from_i64(row.try_get("id").map_err(json)?)?;
            let prereqs = edges.remove(&id).unwrap_or_default();
            concepts.push(map_concept_row(row, prereqs)?);
        }
        Ok(concepts)
    }

    async fn get_concepts(
        &self,
        course_id: CourseId,
        ids: &[ConceptId],
    ) -> Result<Vec<Concept>, StorageError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                r"
                SELECT id, course_id, title, description, complexity,
                       est_learning_hours, position, content, quiz
                FROM concepts
                WHERE course_id = ?1 AND id = ?2
                ",
            )
            .bind(course_id_to_i64(course_id)?)
            .bind(concept_id_to_i64(*id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

            let prereqs = self.prerequisites_for(course_id, *id).await?;
            found.push(map_concept_row(&row, prereqs)?);
        }
        Ok(found)
    }
}
