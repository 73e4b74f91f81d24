use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::quiz::score::{self, FeedbackItem};
use crate::quiz::{Question, QuizError};

/// Lifecycle of one quiz attempt.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub enum Phase {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// What the caller gets back from a submission, ready to persist or display.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttemptSummary {
    pub score: usize,
    pub total_questions: usize,
    pub duration_seconds: f64,
    pub feedback: Vec<FeedbackItem>,
}

/// One quiz attempt from start to submission. The caller owns the value (the
/// bot keeps it inside the per-chat dialogue state); nothing here is shared
/// or global.
///
/// Option order is shuffled once per question the first time that question is
/// shown, then frozen for the rest of the attempt, so navigating back and
/// forth never moves the buttons around.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct QuizSession {
    phase: Phase,
    questions: Vec<Question>,
    current_index: usize,
    answers: HashMap<usize, String>,
    shuffled_options: HashMap<usize, Vec<String>>,
    start_time: Option<DateTime<Utc>>,
    feedback: Vec<FeedbackItem>,
    duration_seconds: f64,
    final_score: usize,
}

impl QuizSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_first_question(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_last_question(&self) -> bool {
        !self.questions.is_empty() && self.current_index == self.questions.len() - 1
    }

    pub fn final_score(&self) -> usize {
        self.final_score
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Per-question verdicts from the last submission, in question order.
    pub fn feedback(&self) -> &[FeedbackItem] {
        &self.feedback
    }

    fn expect_phase(&self, wanted: Phase, action: &'static str) -> Result<(), QuizError> {
        if self.phase == wanted {
            Ok(())
        } else {
            Err(QuizError::InvalidTransition {
                action,
                phase: self.phase,
            })
        }
    }

    /// Begins an attempt over `questions`, whose order stays fixed until the
    /// session is restarted. Valid only from `NotStarted`, and only with a
    /// non-empty set.
    pub fn start(&mut self, questions: Vec<Question>) -> Result<(), QuizError> {
        self.expect_phase(Phase::NotStarted, "start")?;
        if questions.is_empty() {
            return Err(QuizError::InvalidTransition {
                action: "start with no questions",
                phase: self.phase,
            });
        }
        self.questions = questions;
        self.current_index = 0;
        self.answers.clear();
        self.shuffled_options.clear();
        self.feedback.clear();
        self.duration_seconds = 0.0;
        self.final_score = 0;
        self.start_time = Some(Utc::now());
        self.phase = Phase::InProgress;
        Ok(())
    }

    pub fn current_question(&self) -> Result<&Question, QuizError> {
        self.expect_phase(Phase::InProgress, "show a question")?;
        Ok(&self.questions[self.current_index])
    }

    /// The displayed option order for the current question, shuffling and
    /// caching it on first sight.
    pub fn options_for_current(&mut self) -> Result<Vec<String>, QuizError> {
        self.expect_phase(Phase::InProgress, "show options")?;
        let index = self.current_index;
        if !self.shuffled_options.contains_key(&index) {
            let mut options = self.questions[index].options.to_vec();
            options.shuffle(&mut thread_rng());
            self.shuffled_options.insert(index, options);
        }
        Ok(self.shuffled_options[&index].clone())
    }

    /// Records `option` as the answer to the current question, overwriting
    /// any earlier choice. Free-typed text that matches none of the
    /// question's options is rejected.
    pub fn select_answer(&mut self, option: &str) -> Result<(), QuizError> {
        self.expect_phase(Phase::InProgress, "answer")?;
        let index = self.current_index;
        if !self.questions[index].options.iter().any(|o| o == option) {
            return Err(QuizError::UnknownOption {
                index,
                option: option.to_string(),
            });
        }
        self.answers.insert(index, option.to_string());
        Ok(())
    }

    pub fn answer_for_current(&self) -> Option<&str> {
        self.answers.get(&self.current_index).map(String::as_str)
    }

    pub fn go_next(&mut self) -> Result<(), QuizError> {
        self.expect_phase(Phase::InProgress, "go forward")?;
        if self.current_index + 1 >= self.questions.len() {
            return Err(QuizError::InvalidTransition {
                action: "go past the last question",
                phase: self.phase,
            });
        }
        self.current_index += 1;
        Ok(())
    }

    pub fn go_previous(&mut self) -> Result<(), QuizError> {
        self.expect_phase(Phase::InProgress, "go back")?;
        if self.current_index == 0 {
            return Err(QuizError::InvalidTransition {
                action: "go before the first question",
                phase: self.phase,
            });
        }
        self.current_index -= 1;
        Ok(())
    }

    /// Scores the attempt and completes the session. Allowed only from the
    /// last question, mirroring the submit button being offered only there.
    /// Unanswered questions count as incorrect rather than blocking the
    /// submission.
    pub fn submit(&mut self) -> Result<AttemptSummary, QuizError> {
        self.expect_phase(Phase::InProgress, "submit")?;
        if !self.is_last_question() {
            return Err(QuizError::InvalidTransition {
                action: "submit before the last question",
                phase: self.phase,
            });
        }

        let (score, feedback) =
            score::score_attempt(&self.questions, &self.answers, &self.shuffled_options);
        let duration_seconds = self
            .start_time
            .map(|started| (Utc::now() - started).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        self.final_score = score;
        self.feedback = feedback.clone();
        self.duration_seconds = duration_seconds;
        self.phase = Phase::Completed;

        Ok(AttemptSummary {
            score,
            total_questions: self.questions.len(),
            duration_seconds,
            feedback,
        })
    }

    /// Back to a clean `NotStarted`; the next `start` brings fresh questions
    /// and fresh shuffles.
    pub fn restart(&mut self) -> Result<(), QuizError> {
        self.expect_phase(Phase::Completed, "restart")?;
        self.questions.clear();
        self.current_index = 0;
        self.answers.clear();
        self.shuffled_options.clear();
        self.feedback.clear();
        self.duration_seconds = 0.0;
        self.final_score = 0;
        self.start_time = None;
        self.phase = Phase::NotStarted;
        Ok(())
    }
}
