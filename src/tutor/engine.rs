//! The conversation state machine.
//!
//! Drives the teach / check / challenge / grade / adapt cycle. All
//! transitions are synchronous and deterministic: given the same score
//! history, `advance()` always lands on the same phase. The engine owns
//! no I/O, which is what keeps the whole graph testable without audio
//! or network.

use crate::defaults;
use crate::error::{Result, VocoachError};
use crate::tutor::content::{Lesson, QuestionPool};
use crate::tutor::phase::{Difficulty, Phase};
use crate::tutor::step::TutorStep;
use crate::tutor::GradedAttempt;

/// Context for a course session; its presence decides whether the first
/// advance runs an intro.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub course: String,
}

pub struct ConversationEngine {
    phase: Phase,
    /// Where an aborted step resumes from.
    prior_stable: Phase,
    difficulty: Difficulty,
    session: Option<SessionContext>,
    lessons: Vec<Lesson>,
    lesson_cursor: usize,
    pool: QuestionPool,
    active_question: Option<String>,
    asked: Vec<String>,
    scores: Vec<u32>,
    weak_concepts: Vec<String>,
    adapt_counter: u32,
}

impl ConversationEngine {
    pub fn new(lessons: Vec<Lesson>, pool: QuestionPool) -> Self {
        Self {
            phase: Phase::Idle,
            prior_stable: Phase::Idle,
            difficulty: Difficulty::default(),
            session: None,
            lessons,
            lesson_cursor: 0,
            pool,
            active_question: None,
            asked: Vec::new(),
            scores: Vec::new(),
            weak_concepts: Vec::new(),
            adapt_counter: 0,
        }
    }

    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn last_score(&self) -> Option<u32> {
        self.scores.last().copied()
    }

    pub fn weak_concepts(&self) -> &[String] {
        &self.weak_concepts
    }

    pub fn active_question(&self) -> Option<&str> {
        self.active_question.as_deref()
    }

    /// Move to the next phase and produce the step for it.
    pub fn advance(&mut self) -> TutorStep {
        match self.phase {
            Phase::Idle => match &self.session {
                Some(session) => {
                    let text = format!(
                        "Welcome back. Today we continue with {}.",
                        session.course
                    );
                    self.enter(Phase::Intro);
                    TutorStep::teach(text)
                }
                None => {
                    self.enter(Phase::Teach);
                    self.teach_step()
                }
            },
            Phase::Intro => {
                self.enter(Phase::Teach);
                self.teach_step()
            }
            Phase::Teach => self.check_step(),
            Phase::Check | Phase::Challenge => {
                // Waiting on an answer; advancing changes nothing.
                TutorStep::status("waiting for your answer")
            }
            Phase::Grade => {
                self.enter(Phase::Adapt);
                let score = self.last_score().unwrap_or(0);
                // Must keep the cycle moving: Adapt only runs on the next
                // advance, so the feedback step carries the auto-advance
                // pause rather than waiting for outside input.
                TutorStep::progress(format!("scored {score} out of 100"))
            }
            Phase::Adapt => self.adapt(),
            Phase::Spaced => self.check_step(),
        }
    }

    /// Record a graded answer for the active question.
    ///
    /// Only valid while a question is waiting; moves the cycle to Grade.
    pub fn record_attempt(&mut self, attempt: GradedAttempt) -> Result<()> {
        if !self.phase.awaits_answer() {
            return Err(VocoachError::Other(format!(
                "no question is waiting in phase {}",
                self.phase
            )));
        }
        let Some(question_id) = self.active_question.take() else {
            return Err(VocoachError::Other("no active question".to_string()));
        };
        if attempt.question_id != question_id {
            self.active_question = Some(question_id);
            return Err(VocoachError::Other(format!(
                "attempt answers {}, but {} is active",
                attempt.question_id,
                self.active_question.as_deref().unwrap_or("none")
            )));
        }

        if attempt.score < defaults::SCORE_WEAK && !attempt.unmet_points.is_empty() {
            if let Some(question) = self.pool.by_id(&question_id) {
                if !self.weak_concepts.contains(&question.concept) {
                    self.weak_concepts.push(question.concept.clone());
                }
            }
        }
        self.scores.push(attempt.score);
        self.enter(Phase::Grade);
        Ok(())
    }

    /// Abort the current step (timeout, grading failure) and fall back to
    /// the prior stable phase with a user-visible status.
    pub fn step_failed(&mut self, reason: &str) -> TutorStep {
        self.active_question = None;
        let resume = self.prior_stable;
        self.phase = resume;
        TutorStep::status(format!("{reason}; picking up again from {resume}"))
    }

    fn enter(&mut self, next: Phase) {
        if self.phase.is_stable() {
            self.prior_stable = self.phase;
        }
        self.phase = next;
    }

    fn adapt(&mut self) -> TutorStep {
        self.adapt_counter += 1;
        let mut spaced_due = false;
        if self.adapt_counter >= defaults::SPACED_REVIEW_EVERY {
            self.adapt_counter = 0;
            spaced_due = !self.weak_concepts.is_empty();
        }

        if spaced_due {
            let concepts = std::mem::take(&mut self.weak_concepts);
            self.enter(Phase::Spaced);
            return TutorStep::teach(format!(
                "Before anything new, a quick review of {}.",
                concepts.join(", ")
            ));
        }

        let score = self.last_score().unwrap_or(0);
        if score >= defaults::SCORE_ESCALATE {
            self.difficulty = self.difficulty.escalate();
            self.enter(Phase::Challenge);
            self.challenge_question()
        } else if score < defaults::SCORE_SIMPLIFY {
            self.difficulty = self.difficulty.simplify();
            self.enter(Phase::Teach);
            self.teach_step()
        } else {
            // Middling score: same difficulty, ask again.
            self.check_step()
        }
    }

    fn teach_step(&mut self) -> TutorStep {
        if self.lessons.is_empty() {
            return TutorStep::status("no lessons available for this course");
        }
        let lesson = &self.lessons[self.lesson_cursor % self.lessons.len()];
        self.lesson_cursor += 1;
        TutorStep::teach(lesson.text.clone())
    }

    fn check_step(&mut self) -> TutorStep {
        match self.pool.pick_check(self.difficulty, &self.asked) {
            Some(question) => {
                let step = TutorStep::ask(question.text.clone(), question.id.clone());
                self.active_question = Some(question.id.clone());
                self.asked.push(question.id.clone());
                self.enter(Phase::Check);
                step
            }
            None => TutorStep::status("no questions available for this topic yet"),
        }
    }

    fn challenge_question(&mut self) -> TutorStep {
        match self.pool.pick_challenge(self.difficulty, &self.asked) {
            Some(question) => {
                let step = TutorStep::ask(question.text.clone(), question.id.clone());
                self.active_question = Some(question.id.clone());
                self.asked.push(question.id.clone());
                step
            }
            None => {
                // Entered Challenge already; fall back to stable ground.
                self.phase = self.prior_stable;
                TutorStep::status("no challenge questions available yet")
            }
        }
    }

    #[cfg(test)]
    fn force_adapt_state(&mut self, counter: u32, last_score: u32) {
        self.phase = Phase::Adapt;
        self.adapt_counter = counter;
        self.scores.push(last_score);
    }
}
