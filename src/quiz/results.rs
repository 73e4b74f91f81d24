use std::path::PathBuf;

use chrono::Local;

use crate::quiz::score::FeedbackItem;
use crate::quiz::session::AttemptSummary;
use crate::quiz::{append_csv_row, Identity, QuizError};

/// Timestamp format used in the results table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns of the results table, in writing order.
const RESULT_COLUMNS: [&str; 7] = [
    "timestamp",
    "student_name",
    "student_email",
    "score",
    "total_questions",
    "time_seconds",
    "detailed_feedback",
];

/// One row of the results table: a completed attempt.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultRecord {
    pub timestamp: String,
    pub student_name: String,
    pub student_email: String,
    pub score: usize,
    pub total_questions: usize,
    pub time_seconds: i64,
    pub detailed_feedback: String,
}

impl ResultRecord {
    /// Builds the persisted row for a finished attempt. The per-question
    /// feedback is embedded as a JSON blob so the whole attempt can be
    /// reviewed later from the table alone.
    pub fn new(student: &Identity, summary: &AttemptSummary) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            student_name: student.name.clone(),
            student_email: student.email.clone(),
            score: summary.score,
            total_questions: summary.total_questions,
            time_seconds: summary.duration_seconds as i64,
            detailed_feedback: serde_json::to_string(&summary.feedback)
                .unwrap_or_else(|_| "[]".to_string()),
        }
    }

    /// The feedback list parsed back out of the stored blob. An unreadable
    /// blob reads as no feedback.
    pub fn feedback(&self) -> Vec<FeedbackItem> {
        serde_json::from_str(&self.detailed_feedback).unwrap_or_default()
    }
}

/// CSV-backed results table, appended once per completed attempt.
#[derive(Debug, Clone)]
pub struct ResultsStore {
    path: PathBuf,
}

impl ResultsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one attempt. The header goes in only when the table is new or
    /// empty. Appends are not serialized against other processes; a single
    /// bot process funnels them through one handler at a time.
    pub fn append(&self, record: &ResultRecord) -> Result<(), QuizError> {
        append_csv_row(&self.path, record)
    }

    /// Every stored attempt, oldest first. A missing table is reported as
    /// `SourceMissing` so callers can show an empty state instead of a
    /// failure.
    pub fn load_all(&self) -> Result<Vec<ResultRecord>, QuizError> {
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
        let mut records = Vec::new();
        for record in reader.deserialize::<ResultRecord>() {
            records.push(record.map_err(read_error)?);
        }
        Ok(records)
    }

    /// The whole table re-serialized as CSV, header included, ready to send
    /// as a downloadable file.
    pub fn export(&self) -> Result<String, QuizError> {
        let records = self.load_all()?;

        let write_error = |source: csv::Error| QuizError::WriteError {
            path: self.path.clone(),
            source,
        };

        let mut buffer = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut buffer);
            if records.is_empty() {
                writer.write_record(RESULT_COLUMNS).map_err(write_error)?;
            }
            for record in &records {
                writer.serialize(record).map_err(write_error)?;
            }
            writer
                .flush()
                .map_err(|source| write_error(csv::Error::from(source)))?;
        }

        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::session::QuizSession;
    use crate::quiz::Question;

    fn temp_table(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("quizzy-{}-{}.csv", name, rand::random::<u32>()))
    }

    fn sample_summary() -> AttemptSummary {
        AttemptSummary {
            score: 2,
            total_questions: 3,
            duration_seconds: 95.4,
            feedback: vec![FeedbackItem {
                question: "What is 2 + 2?".to_string(),
                user_answer: "4".to_string(),
                correct_answer: "4".to_string(),
                correct: true,
            }],
        }
    }

    fn sample_student() -> Identity {
        Identity::new("Ada Lovelace".to_string(), "ada@example.com".to_string())
    }

    #[test]
    fn missing_table_is_its_own_error() {
        let store = ResultsStore::new(temp_table("missing"));
        let err = store.load_all().unwrap_err();
        assert!(matches!(err, QuizError::SourceMissing { .. }));
    }

    #[test]
    fn append_then_load_round_trips_the_record() {
        let path = temp_table("roundtrip");
        let store = ResultsStore::new(&path);

        let record = ResultRecord::new(&sample_student(), &sample_summary());
        store.append(&record).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![record.clone()]);
        assert_eq!(loaded[0].time_seconds, 95);
        assert_eq!(record.feedback(), sample_summary().feedback);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn repeated_appends_share_one_header_and_keep_order() {
        let path = temp_table("appends");
        let store = ResultsStore::new(&path);

        let mut first = ResultRecord::new(&sample_student(), &sample_summary());
        first.student_name = "First Student".to_string();
        let mut second = ResultRecord::new(&sample_student(), &sample_summary());
        second.student_name = "Second Student".to_string();

        store.append(&first).unwrap();
        store.append(&second).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let header_lines = raw
            .lines()
            .filter(|line| line.starts_with("timestamp,student_name"))
            .count();
        assert_eq!(header_lines, 1);

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].student_name, "First Student");
        assert_eq!(loaded[1].student_name, "Second Student");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn export_reproduces_header_and_rows() {
        let path = temp_table("export");
        let store = ResultsStore::new(&path);

        store
            .append(&ResultRecord::new(&sample_student(), &sample_summary()))
            .unwrap();

        let exported = store.export().unwrap();
        let mut lines = exported.lines();
        assert_eq!(
            lines.next(),
            Some(
                "timestamp,student_name,student_email,score,total_questions,\
                 time_seconds,detailed_feedback"
            )
        );
        assert_eq!(exported.lines().count(), 2);
        assert!(exported.contains("Ada Lovelace"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn completed_attempt_lands_in_the_table_with_its_duration() {
        let path = temp_table("attempt");
        let store = ResultsStore::new(&path);

        let questions = vec![
            Question::new(
                "What is 2 + 2?".to_string(),
                [
                    "3".to_string(),
                    "4".to_string(),
                    "5".to_string(),
                    "22".to_string(),
                ],
                "4".to_string(),
            ),
            Question::new(
                "Which planet is called the Red Planet?".to_string(),
                [
                    "Venus".to_string(),
                    "Mars".to_string(),
                    "Jupiter".to_string(),
                    "Mercury".to_string(),
                ],
                "Mars".to_string(),
            ),
            Question::new(
                "What is the capital of France?".to_string(),
                [
                    "London".to_string(),
                    "Berlin".to_string(),
                    "Paris".to_string(),
                    "Madrid".to_string(),
                ],
                "Paris".to_string(),
            ),
        ];

        let mut session = QuizSession::new();
        session.start(questions).unwrap();
        loop {
            session.options_for_current().unwrap();
            let correct = session.current_question().unwrap().correct_answer.clone();
            session.select_answer(&correct).unwrap();
            if session.is_last_question() {
                break;
            }
            session.go_next().unwrap();
        }

        let mut summary = session.submit().unwrap();
        summary.duration_seconds = 42.0;

        store
            .append(&ResultRecord::new(&sample_student(), &summary))
            .unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].student_email, "ada@example.com");
        assert_eq!(loaded[0].score, 3);
        assert_eq!(loaded[0].total_questions, 3);
        assert_eq!(loaded[0].time_seconds, 42);
        assert!(chrono::NaiveDateTime::parse_from_str(&loaded[0].timestamp, TIMESTAMP_FORMAT)
            .is_ok());

        let feedback = loaded[0].feedback();
        assert_eq!(feedback.len(), 3);
        assert!(feedback.iter().all(|item| item.correct));

        let _ = std::fs::remove_file(&path);
    }
}
