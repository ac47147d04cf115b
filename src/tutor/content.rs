//! Lesson and question content, with pattern-based question selection.

use crate::tutor::phase::Difficulty;
use serde::Deserialize;
use std::path::Path;

/// One teachable unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Lesson {
    pub concept: String,
    pub text: String,
}

impl Lesson {
    pub fn new(concept: &str, text: &str) -> Self {
        Self {
            concept: concept.to_string(),
            text: text.to_string(),
        }
    }
}

/// One question, tied to a concept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Question {
    pub id: String,
    pub concept: String,
    pub text: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl Question {
    pub fn new(id: &str, concept: &str, text: &str, difficulty: Difficulty) -> Self {
        Self {
            id: id.to_string(),
            concept: concept.to_string(),
            text: text.to_string(),
            difficulty,
        }
    }
}

/// Phrase markers of recall/definition questions, preferred for Check.
const RECALL_PATTERNS: &[&str] = &["what is", "define", "recall", "name the", "list the"];

/// Phrase markers of application/comparison questions, preferred for
/// Challenge.
const APPLICATION_PATTERNS: &[&str] = &[
    "how would",
    "apply",
    "compare",
    "difference between",
    "why does",
    "when would",
];

fn matches_any(text: &str, patterns: &[&str]) -> bool {
    let lower = text.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

/// The session's question bank.
#[derive(Debug, Clone, Default)]
pub struct QuestionPool {
    questions: Vec<Question>,
}

impl QuestionPool {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Pick a Check question: recall/definition preferred, falling back
    /// to the unfiltered pool. Questions already asked are skipped when
    /// unasked ones remain.
    pub fn pick_check(&self, difficulty: Difficulty, asked: &[String]) -> Option<&Question> {
        self.pick(difficulty, asked, RECALL_PATTERNS)
    }

    /// Pick a Challenge question: application/comparison preferred.
    pub fn pick_challenge(&self, difficulty: Difficulty, asked: &[String]) -> Option<&Question> {
        self.pick(difficulty, asked, APPLICATION_PATTERNS)
    }

    fn pick(&self, difficulty: Difficulty, asked: &[String], patterns: &[&str]) -> Option<&Question> {
        let fresh = |q: &&Question| !asked.contains(&q.id);
        let at_level = |q: &&Question| q.difficulty == difficulty;
        let preferred = |q: &&Question| matches_any(&q.text, patterns);

        // Narrowest cut first, widening until something matches. The
        // unfiltered pool is the last resort before "no content".
        self.questions
            .iter()
            .find(|q| fresh(q) && at_level(q) && preferred(q))
            .or_else(|| self.questions.iter().find(|q| fresh(q) && preferred(q)))
            .or_else(|| self.questions.iter().find(fresh))
            .or_else(|| self.questions.first())
    }
}

/// Course material as stored on disk: a name, ordered lessons, and the
/// question bank.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseFile {
    pub course: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl CourseFile {
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}
