//! The tutoring conversation engine and its collaborators.

mod content;
mod engine;
mod phase;
mod step;

pub use content::{CourseFile, Lesson, Question, QuestionPool};
pub use engine::{ConversationEngine, SessionContext};
pub use phase::{Difficulty, Phase};
pub use step::{TutorStep, AUTO_ADVANCE_PAUSE};

use crate::error::{Result, VocoachError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Outcome of grading one spoken answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradedAttempt {
    pub question_id: String,
    /// 0-100.
    pub score: u32,
    /// Rubric points the answer missed.
    pub unmet_points: Vec<String>,
}

/// Grades a transcript against a question. External collaborator; the
/// conversation engine only consumes the result.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, question: &Question, answer: &str) -> Result<GradedAttempt>;
}

/// Grader backed by the speech-understanding sidecar's grading endpoint.
pub struct HttpGrader {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Deserialize)]
struct GradeResponse {
    score: u32,
    #[serde(default)]
    unmet_points: Vec<String>,
}

impl HttpGrader {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}:{}", host, port),
        }
    }
}

#[async_trait]
impl Grader for HttpGrader {
    async fn grade(&self, question: &Question, answer: &str) -> Result<GradedAttempt> {
        let response = self
            .client
            .post(format!("{}/grade", self.base_url))
            .json(&serde_json::json!({
                "question": question.text,
                "concept": question.concept,
                "answer": answer,
            }))
            .timeout(crate::defaults::TRANSCRIPTION_TIMEOUT)
            .send()
            .await
            .map_err(|e| VocoachError::Other(format!("grading request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(VocoachError::Other(format!(
                "grader returned {}",
                response.status()
            )));
        }
        let body: GradeResponse = response
            .json()
            .await
            .map_err(|e| VocoachError::Other(format!("grading response malformed: {e}")))?;
        Ok(GradedAttempt {
            question_id: question.id.clone(),
            score: body.score.min(100),
            unmet_points: body.unmet_points,
        })
    }
}

/// Scripted grader for tests.
pub struct MockGrader {
    results: Mutex<VecDeque<Result<GradedAttempt>>>,
}

impl MockGrader {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_score(self, score: u32, unmet_points: &[&str]) -> Self {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(GradedAttempt {
                question_id: String::new(),
                score,
                unmet_points: unmet_points.iter().map(|p| p.to_string()).collect(),
            }));
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(VocoachError::Other(message.to_string())));
        self
    }
}

impl Default for MockGrader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Grader for MockGrader {
    async fn grade(&self, question: &Question, _answer: &str) -> Result<GradedAttempt> {
        let next = self
            .results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Ok(mut attempt)) => {
                attempt.question_id = question.id.clone();
                Ok(attempt)
            }
            Some(Err(e)) => Err(e),
            None => Err(VocoachError::Other("no scripted grade".to_string())),
        }
    }
}
