use std::collections::HashMap;

use crate::quiz::Question;

/// Sentinel recorded in feedback and in the results table for questions the
/// user never answered.
pub const NOT_ANSWERED: &str = "Not answered";

/// Per-question verdict produced at submission time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeedbackItem {
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub correct: bool,
}

/// Scores one attempt. Feedback comes back in original question order and
/// the score is the number of correct items.
///
/// A question whose correct answer never made it into its frozen option set
/// (missing or tampered shuffle cache) counts as incorrect no matter what was
/// selected.
pub fn score_attempt(
    questions: &[Question],
    answers: &HashMap<usize, String>,
    shuffled_options: &HashMap<usize, Vec<String>>,
) -> (usize, Vec<FeedbackItem>) {
    let mut feedback = Vec::with_capacity(questions.len());

    for (index, question) in questions.iter().enumerate() {
        let user_answer = answers
            .get(&index)
            .map(String::as_str)
            .unwrap_or(NOT_ANSWERED);
        let correct_answer = question.correct_answer.as_str();

        let correct_was_shown = shuffled_options
            .get(&index)
            .map_or(false, |options| options.iter().any(|o| o == correct_answer));

        feedback.push(FeedbackItem {
            question: question.text.clone(),
            user_answer: user_answer.to_string(),
            correct_answer: correct_answer.to_string(),
            correct: correct_was_shown && user_answer == correct_answer,
        });
    }

    let score = feedback.iter().filter(|item| item.correct).count();
    (score, feedback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arithmetic_question() -> Question {
        Question::new(
            "What is 2 + 2?".to_string(),
            [
                "3".to_string(),
                "4".to_string(),
                "5".to_string(),
                "22".to_string(),
            ],
            "4".to_string(),
        )
    }

    fn shown_options(question: &Question) -> Vec<String> {
        question.options.to_vec()
    }

    #[test]
    fn correct_answer_scores_one() {
        let questions = vec![arithmetic_question()];
        let mut answers = HashMap::new();
        answers.insert(0, "4".to_string());
        let mut shuffled = HashMap::new();
        shuffled.insert(0, shown_options(&questions[0]));

        let (score, feedback) = score_attempt(&questions, &answers, &shuffled);

        assert_eq!(score, 1);
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].user_answer, "4");
        assert_eq!(feedback[0].correct_answer, "4");
        assert!(feedback[0].correct);
    }

    #[test]
    fn unanswered_question_uses_sentinel_and_scores_zero() {
        let questions = vec![arithmetic_question()];
        let answers = HashMap::new();
        let mut shuffled = HashMap::new();
        shuffled.insert(0, shown_options(&questions[0]));

        let (score, feedback) = score_attempt(&questions, &answers, &shuffled);

        assert_eq!(score, 0);
        assert_eq!(feedback[0].user_answer, NOT_ANSWERED);
        assert!(!feedback[0].correct);
    }

    #[test]
    fn answer_missing_from_shown_options_is_incorrect() {
        let questions = vec![arithmetic_question()];
        let mut answers = HashMap::new();
        answers.insert(0, "4".to_string());
        // The cached option set somehow lost the correct answer.
        let mut shuffled = HashMap::new();
        shuffled.insert(
            0,
            vec!["3".to_string(), "5".to_string(), "22".to_string()],
        );

        let (score, feedback) = score_attempt(&questions, &answers, &shuffled);

        assert_eq!(score, 0);
        assert!(!feedback[0].correct);
    }

    #[test]
    fn missing_shuffle_entry_is_incorrect() {
        let questions = vec![arithmetic_question()];
        let mut answers = HashMap::new();
        answers.insert(0, "4".to_string());
        let shuffled = HashMap::new();

        let (score, feedback) = score_attempt(&questions, &answers, &shuffled);

        assert_eq!(score, 0);
        assert!(!feedback[0].correct);
    }

    #[test]
    fn feedback_preserves_question_order() {
        let mut second = arithmetic_question();
        second.text = "What is 3 + 3?".to_string();
        second.options = [
            "6".to_string(),
            "7".to_string(),
            "8".to_string(),
            "33".to_string(),
        ];
        second.correct_answer = "6".to_string();
        let questions = vec![arithmetic_question(), second];

        let mut answers = HashMap::new();
        answers.insert(0, "3".to_string());
        answers.insert(1, "6".to_string());
        let mut shuffled = HashMap::new();
        shuffled.insert(0, shown_options(&questions[0]));
        shuffled.insert(1, shown_options(&questions[1]));

        let (score, feedback) = score_attempt(&questions, &answers, &shuffled);

        assert_eq!(score, 1);
        assert_eq!(feedback[0].question, "What is 2 + 2?");
        assert_eq!(feedback[1].question, "What is 3 + 3?");
        assert!(!feedback[0].correct);
        assert!(feedback[1].correct);
    }
}
