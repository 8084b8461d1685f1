use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors raised while defining or scoring a quiz.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz must contain at least one question")]
    NoQuestions,

    #[error("question {index} needs at least two options")]
    TooFewOptions { index: usize },

    #[error("question {index} answer {answer} is out of range for {options} options")]
    AnswerOutOfRange {
        index: usize,
        answer: usize,
        options: usize,
    },

    #[error("submission has {got} answers but the quiz has {expected} questions")]
    AnswerCountMismatch { expected: usize, got: usize },
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question.
///
/// `answer` is the index of the correct option. The optional explanation
/// is shown to the learner during post-quiz review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// The gate at the end of a concept: an ordered list of questions.
///
/// Construction validates the definition once; scoring afterwards can
/// only fail on a malformed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    questions: Vec<QuizQuestion>,
}

impl Quiz {
    /// Validates a quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if there are no questions, a question has
    /// fewer than two options, or a correct-answer index is out of range.
    pub fn new(questions: Vec<QuizQuestion>) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        for (index, q) in questions.iter().enumerate() {
            if q.options.len() < 2 {
                return Err(QuizError::TooFewOptions { index });
            }
            if q.answer >= q.options.len() {
                return Err(QuizError::AnswerOutOfRange {
                    index,
                    answer: q.answer,
                    options: q.options.len(),
                });
            }
        }
        Ok(Self { questions })
    }

    #[must_use]
    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Scores a submission against this quiz.
    ///
    /// An out-of-range selected option is counted as incorrect, not
    /// rejected; the learner did answer, just wrongly.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AnswerCountMismatch` when the submission
    /// length differs from the question count. A mismatched submission
    /// is unscoreable and must not count against the learner.
    pub fn score(&self, answers: &[usize]) -> Result<QuizScore, QuizError> {
        if answers.len() != self.questions.len() {
            return Err(QuizError::AnswerCountMismatch {
                expected: self.questions.len(),
                got: answers.len(),
            });
        }

        let correct = self
            .questions
            .iter()
            .zip(answers)
            .filter(|&(ref q, &a)| q.answer == a)
            .count();

        Ok(QuizScore {
            correct,
            total: self.questions.len(),
        })
    }
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Outcome of scoring one quiz submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizScore {
    pub correct: usize,
    pub total: usize,
}

impl QuizScore {
    /// Percentage of correct answers, 0.0–100.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.correct as f64 / self.total as f64) * 100.0
    }

    /// Percentage rounded to the nearest whole point, as shown to
    /// learners and recorded as a mastery score.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rounded_percent(&self) -> u8 {
        self.percent().round() as u8
    }

    /// Whether this score clears the given pass threshold (percent).
    #[must_use]
    pub fn passes(&self, threshold: u8) -> bool {
        self.percent() >= f64::from(threshold)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
