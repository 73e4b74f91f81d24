pub mod questions;
pub mod results;
pub mod score;
pub mod session;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One multiple-choice question: four displayable options, exactly one of
/// which is the correct answer.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub text: String,
    pub options: [String; 4],
    pub correct_answer: String,
}

impl Question {
    pub fn new(text: String, options: [String; 4], correct_answer: String) -> Self {
        Self {
            text,
            options,
            correct_answer,
        }
    }
}

/// Who is taking the quiz. Nothing is authenticated; the bot only insists
/// that both fields are non-empty before a session may start.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: String, email: String) -> Self {
        Self { name, email }
    }
}

/// Everything that can go wrong in the quiz core.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("table not found at {}", .path.display())]
    SourceMissing { path: PathBuf },
    #[error("required column `{column}` is missing from the question table")]
    SchemaInvalid { column: &'static str },
    #[error("question table line {line}: correct answer {answer:?} is not one of the options")]
    CorruptQuestion { line: u64, answer: String },
    #[error("could not read the table at {}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("could not append to the table at {}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{option:?} is not one of the options for question {index}")]
    UnknownOption { index: usize, option: String },
    #[error("cannot {action} while the session is {phase:?}")]
    InvalidTransition {
        action: &'static str,
        phase: session::Phase,
    },
}

/// Appends one serde row to a CSV table, emitting the header first when the
/// file does not exist yet or is empty.
pub(crate) fn append_csv_row<T: serde::Serialize>(path: &Path, row: &T) -> Result<(), QuizError> {
    let write_error = |source: csv::Error| QuizError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let table_is_empty = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len() == 0,
        Err(_) => true,
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| write_error(csv::Error::from(source)))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(table_is_empty)
        .from_writer(file);
    writer.serialize(row).map_err(write_error)?;
    writer
        .flush()
        .map_err(|source| write_error(csv::Error::from(source)))?;
    Ok(())
}
