//! Quiz session: position, answers and score over a fixed question set

use super::{Quiz, QuizQuestion};
use crate::prompts::QUIZ_OPTION_COUNT;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizSessionError {
    #[error("no question with id {0}")]
    UnknownQuestion(u32),
    #[error("option {0} is out of range")]
    InvalidOption(usize),
    #[error("the quiz is already completed")]
    Completed,
}

/// Result of moving forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizStep {
    Moved { index: usize },
    /// Advanced past the last question
    Finished { score: usize },
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    quiz: Quiz,
    current_index: usize,
    answers: BTreeMap<u32, usize>,
    completed: bool,
}

impl QuizSession {
    pub fn new(quiz: Quiz) -> Self {
        Self {
            quiz,
            current_index: 0,
            answers: BTreeMap::new(),
            completed: false,
        }
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        self.quiz.questions()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Record (or change) the answer to a question
    pub fn select_answer(&mut self, question_id: u32, option: usize) -> Result<(), QuizSessionError> {
        if self.completed {
            return Err(QuizSessionError::Completed);
        }
        if !self.questions().iter().any(|q| q.id == question_id) {
            return Err(QuizSessionError::UnknownQuestion(question_id));
        }
        if option >= QUIZ_OPTION_COUNT {
            return Err(QuizSessionError::InvalidOption(option));
        }
        self.answers.insert(question_id, option);
        Ok(())
    }

    /// Move to the next question, or finish when on the last one
    pub fn next(&mut self) -> Result<QuizStep, QuizSessionError> {
        if self.completed {
            return Err(QuizSessionError::Completed);
        }
        if self.current_index + 1 < self.questions().len() {
            self.current_index += 1;
            Ok(QuizStep::Moved {
                index: self.current_index,
            })
        } else {
            self.completed = true;
            Ok(QuizStep::Finished {
                score: self.score(),
            })
        }
    }

    /// Move back one question. Returns false at the first question.
    pub fn previous(&mut self) -> bool {
        if self.completed || self.current_index == 0 {
            return false;
        }
        self.current_index -= 1;
        true
    }

    /// Questions whose recorded answer matches the key. Unanswered never
    /// matches.
    pub fn score(&self) -> usize {
        self.questions()
            .iter()
            .filter(|q| self.answers.get(&q.id) == Some(&q.correct_option))
            .count()
    }

    pub fn snapshot(&self) -> QuizSnapshot {
        QuizSnapshot {
            questions: self.questions().to_vec(),
            current_index: self.current_index,
            answers: self.answers.clone(),
            completed: self.completed,
            score: self.completed.then(|| self.score()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub questions: Vec<QuizQuestion>,
    pub current_index: usize,
    pub answers: BTreeMap<u32, usize>,
    pub completed: bool,
    /// Set once the quiz is completed
    pub score: Option<usize>,
}
