use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema: courses, concepts (with quiz/content JSON),
/// the prerequisite edge table, per-user progress, and indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS courses (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    mastery_threshold INTEGER NOT NULL
                        CHECK (mastery_threshold BETWEEN 1 AND 100),
                    quiz_pass_threshold INTEGER NOT NULL
                        CHECK (quiz_pass_threshold BETWEEN 1 AND 100),
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS concepts (
                    id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    complexity INTEGER NOT NULL CHECK (complexity >= 1),
                    est_learning_hours REAL NOT NULL CHECK (est_learning_hours > 0),
                    position INTEGER NOT NULL CHECK (position >= 0),
                    content TEXT,
                    quiz TEXT,
                    PRIMARY KEY (id, course_id),
                    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS concept_prerequisites (
                    course_id INTEGER NOT NULL,
                    concept_id INTEGER NOT NULL,
                    prerequisite_id INTEGER NOT NULL,
                    ordinal INTEGER NOT NULL CHECK (ordinal >= 0),
                    PRIMARY KEY (course_id, concept_id, prerequisite_id),
                    FOREIGN KEY (concept_id, course_id)
                        REFERENCES concepts(id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS user_concept_progress (
                    user_id TEXT NOT NULL,
                    course_id INTEGER NOT NULL,
                    concept_id INTEGER NOT NULL,
                    mastery_score INTEGER CHECK (mastery_score BETWEEN 0 AND 100),
                    description_read INTEGER NOT NULL CHECK (description_read IN (0, 1)),
                    video_watched INTEGER NOT NULL CHECK (video_watched IN (0, 1)),
                    quiz_passed INTEGER NOT NULL CHECK (quiz_passed IN (0, 1)),
                    attempts INTEGER NOT NULL CHECK (attempts >= 0),
                    status TEXT NOT NULL,
                    last_accessed_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, concept_id),
                    FOREIGN KEY (concept_id, course_id)
                        REFERENCES concepts(id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_concepts_course_position
                    ON concepts(course_id, position, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_prereqs_course_concept
                    ON concept_prerequisites(course_id, concept_id, ordinal);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_user_course
                    ON user_concept_progress(user_id, course_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
