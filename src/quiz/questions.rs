use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::quiz::{append_csv_row, Question, QuizError};

/// Columns the question table must carry.
const REQUIRED_COLUMNS: [&str; 6] = [
    "question",
    "option1",
    "option2",
    "option3",
    "option4",
    "correct_answer",
];

/// One row of the question table.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct QuestionRow {
    question: String,
    option1: String,
    option2: String,
    option3: String,
    option4: String,
    correct_answer: String,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question::new(
            row.question,
            [row.option1, row.option2, row.option3, row.option4],
            row.correct_answer,
        )
    }
}

impl From<&Question> for QuestionRow {
    fn from(question: &Question) -> Self {
        let [option1, option2, option3, option4] = question.options.clone();
        Self {
            question: question.text.clone(),
            option1,
            option2,
            option3,
            option4,
            correct_answer: question.correct_answer.clone(),
        }
    }
}

/// CSV-backed question table.
#[derive(Debug, Clone)]
pub struct QuestionStore {
    path: PathBuf,
}

impl QuestionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads every question and returns them in a fresh uniformly-random
    /// order. The schema is checked before any row is parsed, and a row
    /// whose correct answer is not among its own options fails the whole
    /// load rather than slipping an unanswerable question into a quiz.
    pub fn load(&self) -> Result<Vec<Question>, QuizError> {
        if !self.path.exists() {
            return Err(QuizError::SourceMissing {
                path: self.path.clone(),
            });
        }

        let read_error = |source: csv::Error| QuizError::ReadError {
            path: self.path.clone(),
            source,
        };

        let mut reader = csv::Reader::from_path(&self.path).map_err(read_error)?;
        let headers = reader.headers().map_err(read_error)?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|header| header == column) {
                return Err(QuizError::SchemaInvalid { column });
            }
        }

        let mut questions = Vec::new();
        for (row_number, row) in reader.deserialize::<QuestionRow>().enumerate() {
            let question = Question::from(row.map_err(read_error)?);
            if !question
                .options
                .iter()
                .any(|option| option == &question.correct_answer)
            {
                return Err(QuizError::CorruptQuestion {
                    // one-based, counting the header line
                    line: row_number as u64 + 2,
                    answer: question.correct_answer,
                });
            }
            questions.push(question);
        }

        questions.shuffle(&mut thread_rng());
        Ok(questions)
    }

    /// Appends one question, writing the column header first when the table
    /// is new or empty.
    pub fn append(&self, question: &Question) -> Result<(), QuizError> {
        append_csv_row(&self.path, &QuestionRow::from(question))
    }
}
