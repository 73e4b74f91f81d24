mod quiz;

use dotenv::dotenv;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatId, InputFile, KeyboardButton, KeyboardMarkup},
};

use quiz::questions::QuestionStore;
use quiz::results::{ResultRecord, ResultsStore, TIMESTAMP_FORMAT};
use quiz::session::QuizSession;
use quiz::{Identity, Question, QuizError};

type QuizDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const QUESTIONS_FILE: &str = "questions.csv";
const RESULTS_FILE: &str = "quiz_results.csv";

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ChoosingRole,
    ReceiveFullName,
    ReceiveEmail {
        full_name: String,
    },
    Ready {
        student: Identity,
    },
    TakingQuiz {
        student: Identity,
        session: QuizSession,
    },
    QuizFinished {
        student: Identity,
        session: QuizSession,
    },
    ReceiveAdminPassword,
    AdminMenu,
    ReceiveNewQuestionText,
    ReceiveNewOption {
        question: String,
        options: Vec<String>,
    },
    ReceiveCorrectAnswer {
        question: String,
        options: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenv().expect("Failed to load .env file");
    let admin_password = std::env::var("ADMIN_PASSWORD").expect("ADMIN_PASSWORD is not set");

    pretty_env_logger::init();
    log::info!("Starting the quiz bot...");

    let bot = Bot::from_env();

    let question_store = QuestionStore::new(QUESTIONS_FILE);
    let results_store = ResultsStore::new(RESULTS_FILE);

    let question_store_for_quiz = question_store.clone();
    let question_store_for_admin = question_store;
    let results_store_for_submit = results_store.clone();
    let results_store_for_admin = results_store;

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ChoosingRole].endpoint(choose_role))
            .branch(dptree::case![State::ReceiveFullName].endpoint(receive_full_name))
            .branch(dptree::case![State::ReceiveEmail { full_name }].endpoint(receive_email))
            .branch(dptree::case![State::Ready { student }].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, student: Identity, msg: Message| {
                    ready(question_store_for_quiz.clone(), bot, dialogue, student, msg)
                },
            ))
            .branch(dptree::case![State::TakingQuiz { student, session }].endpoint(
                move |bot: Bot,
                      dialogue: QuizDialogue,
                      (student, session): (Identity, QuizSession),
                      msg: Message| {
                    taking_quiz(
                        results_store_for_submit.clone(),
                        bot,
                        dialogue,
                        (student, session),
                        msg,
                    )
                },
            ))
            .branch(dptree::case![State::QuizFinished { student, session }].endpoint(quiz_finished))
            .branch(dptree::case![State::ReceiveAdminPassword].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                    receive_admin_password(admin_password.clone(), bot, dialogue, msg)
                },
            ))
            .branch(dptree::case![State::AdminMenu].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                    admin_menu(results_store_for_admin.clone(), bot, dialogue, msg)
                },
            ))
            .branch(
                dptree::case![State::ReceiveNewQuestionText].endpoint(receive_new_question_text),
            )
            .branch(
                dptree::case![State::ReceiveNewOption { question, options }]
                    .endpoint(receive_new_option),
            )
            .branch(
                dptree::case![State::ReceiveCorrectAnswer { question, options }].endpoint(
                    move |bot: Bot,
                          dialogue: QuizDialogue,
                          (question, options): (String, Vec<String>),
                          msg: Message| {
                        receive_correct_answer(
                            question_store_for_admin.clone(),
                            bot,
                            dialogue,
                            (question, options),
                            msg,
                        )
                    },
                ),
            ),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new()])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const STUDENT_ROLE: &str = "🎓 Take the quiz";
const ADMIN_ROLE: &str = "🔐 Administrator";
const START_QUIZ: &str = "🚀 Start Quiz";
const PREVIOUS: &str = "⬅ Previous";
const NEXT: &str = "Next ➡";
const SUBMIT: &str = "✅ Submit Quiz";
const REVIEW: &str = "🔍 Review Answers";
const RESTART: &str = "🔄 Take Quiz Again";
const ADD_QUESTION: &str = "➕ Add Question";
const VIEW_RESULTS: &str = "📊 View Results";
const DOWNLOAD_RESULTS: &str = "📥 Download Results";
const LOG_OUT: &str = "🚪 Log Out";

fn role_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(STUDENT_ROLE),
        KeyboardButton::new(ADMIN_ROLE),
    ]])
}

fn start_quiz_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(START_QUIZ)]])
}

fn admin_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(ADD_QUESTION),
            KeyboardButton::new(VIEW_RESULTS),
        ],
        vec![
            KeyboardButton::new(DOWNLOAD_RESULTS),
            KeyboardButton::new(LOG_OUT),
        ],
    ])
}

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Welcome to Quizzy! Are you here to take the quiz or to administer it?",
    )
    .reply_markup(role_keyboard())
    .await?;

    dialogue.update(State::ChoosingRole).await?;
    Ok(())
}

async fn choose_role(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    match msg.text() {
        Some(STUDENT_ROLE) => {
            bot.send_message(msg.chat.id, "Great! What is your full name?")
                .await?;
            dialogue.update(State::ReceiveFullName).await?;
        }
        Some(ADMIN_ROLE) => {
            bot.send_message(msg.chat.id, "Please enter the admin password.")
                .await?;
            dialogue.update(State::ReceiveAdminPassword).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options.")
                .reply_markup(role_keyboard())
                .await?;
        }
    }
    Ok(())
}

async fn receive_full_name(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    match msg.text().map(str::trim) {
        Some(full_name) if !full_name.is_empty() => {
            bot.send_message(
                msg.chat.id,
                format!("Nice to meet you, {full_name}! What is your e-mail address?"),
            )
            .await?;
            dialogue
                .update(State::ReceiveEmail {
                    full_name: full_name.to_string(),
                })
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please enter your full name (as text).")
                .await?;
        }
    }
    Ok(())
}

async fn receive_email(
    bot: Bot,
    dialogue: QuizDialogue,
    full_name: String,
    msg: Message,
) -> HandlerResult {
    match msg.text().map(str::trim) {
        Some(email) if !email.is_empty() => {
            let student = Identity::new(full_name, email.to_string());
            bot.send_message(
                msg.chat.id,
                "You're all set! Press the button whenever you are ready.",
            )
            .reply_markup(start_quiz_keyboard())
            .await?;
            dialogue.update(State::Ready { student }).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please enter your e-mail address.")
                .await?;
        }
    }
    Ok(())
}

async fn ready(
    questions: QuestionStore,
    bot: Bot,
    dialogue: QuizDialogue,
    student: Identity,
    msg: Message,
) -> HandlerResult {
    if msg.text() != Some(START_QUIZ) {
        bot.send_message(msg.chat.id, "Press the button to start the quiz.")
            .reply_markup(start_quiz_keyboard())
            .await?;
        return Ok(());
    }

    let question_set = match questions.load() {
        Ok(question_set) => question_set,
        Err(error) => {
            log::warn!("failed to load questions: {error}");
            let text = match error {
                QuizError::SourceMissing { .. } => "Question database not found.",
                _ => "Invalid question format in the question database.",
            };
            bot.send_message(msg.chat.id, text).await?;
            return Ok(());
        }
    };

    let mut session = QuizSession::new();
    if session.start(question_set).is_err() {
        bot.send_message(
            msg.chat.id,
            "The quiz has no questions yet. Please come back later.",
        )
        .await?;
        return Ok(());
    }

    send_question_view(&bot, msg.chat.id, &mut session).await?;
    dialogue
        .update(State::TakingQuiz { student, session })
        .await?;
    Ok(())
}

/// Renders the current question: position, text, the currently selected
/// answer, option buttons two per row, and the navigation row. `Previous` is
/// hidden on the first question; `Next` becomes `Submit Quiz` on the last.
async fn send_question_view(
    bot: &Bot,
    chat_id: ChatId,
    session: &mut QuizSession,
) -> HandlerResult {
    let question_text = session.current_question()?.text.clone();
    let options = session.options_for_current()?;
    let number = session.current_index() + 1;
    let total = session.total_questions();

    let selected = match session.answer_for_current() {
        Some(answer) => format!("Your answer: {answer}"),
        None => "You have not answered this question yet.".to_string(),
    };
    let text = format!("Question {number} of {total}\n\n{question_text}\n\n{selected}");

    let mut rows: Vec<Vec<KeyboardButton>> = options
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|option| KeyboardButton::new(option.clone()))
                .collect()
        })
        .collect();

    let mut navigation = Vec::new();
    if !session.is_first_question() {
        navigation.push(KeyboardButton::new(PREVIOUS));
    }
    if session.is_last_question() {
        navigation.push(KeyboardButton::new(SUBMIT));
    } else {
        navigation.push(KeyboardButton::new(NEXT));
    }
    rows.push(navigation);

    bot.send_message(chat_id, text)
        .reply_markup(KeyboardMarkup::new(rows))
        .await?;
    Ok(())
}

async fn taking_quiz(
    results: ResultsStore,
    bot: Bot,
    dialogue: QuizDialogue,
    (student, mut session): (Identity, QuizSession),
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please answer with the buttons below.")
            .await?;
        return Ok(());
    };

    match text {
        PREVIOUS => {
            if session.go_previous().is_ok() {
                send_question_view(&bot, msg.chat.id, &mut session).await?;
            }
        }
        NEXT => {
            if session.go_next().is_ok() {
                send_question_view(&bot, msg.chat.id, &mut session).await?;
            }
        }
        SUBMIT => {
            let summary = match session.submit() {
                Ok(summary) => summary,
                // The submit button is only shown on the last question, so
                // this is a stale keyboard; just show where they are.
                Err(_) => {
                    send_question_view(&bot, msg.chat.id, &mut session).await?;
                    dialogue
                        .update(State::TakingQuiz { student, session })
                        .await?;
                    return Ok(());
                }
            };

            let record = ResultRecord::new(&student, &summary);
            if let Err(error) = results.append(&record) {
                log::warn!("failed to save the attempt of {}: {error}", student.email);
                bot.send_message(
                    msg.chat.id,
                    "Your score could not be saved, but here it is anyway.",
                )
                .await?;
            }

            let minutes = summary.duration_seconds as i64 / 60;
            let seconds = summary.duration_seconds as i64 % 60;
            let text = format!(
                "📝 Quiz Results Summary\n\n\
                 Student: {}\nEmail: {}\n\
                 Final score: {}/{}\n\
                 Time taken: {minutes} minutes {seconds} seconds",
                student.name, student.email, summary.score, summary.total_questions
            );
            let keyboard = KeyboardMarkup::new(vec![vec![
                KeyboardButton::new(REVIEW),
                KeyboardButton::new(RESTART),
            ]]);
            bot.send_message(msg.chat.id, text)
                .reply_markup(keyboard)
                .await?;

            dialogue
                .update(State::QuizFinished { student, session })
                .await?;
            return Ok(());
        }
        option => match session.select_answer(option) {
            Ok(()) => send_question_view(&bot, msg.chat.id, &mut session).await?,
            Err(QuizError::UnknownOption { .. }) => {
                bot.send_message(msg.chat.id, "Please answer with the buttons below.")
                    .await?;
            }
            Err(error) => return Err(error.into()),
        },
    }

    dialogue
        .update(State::TakingQuiz { student, session })
        .await?;
    Ok(())
}

async fn quiz_finished(
    bot: Bot,
    dialogue: QuizDialogue,
    (student, mut session): (Identity, QuizSession),
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(REVIEW) => {
            let review = session
                .feedback()
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let mark = if item.correct { "✅" } else { "❌" };
                    format!(
                        "Question {}: {}\nYour answer: {} {mark}\nCorrect answer: {}",
                        index + 1,
                        item.question,
                        item.user_answer,
                        item.correct_answer
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            bot.send_message(msg.chat.id, review).await?;
        }
        Some(RESTART) => {
            session.restart()?;
            bot.send_message(
                msg.chat.id,
                "Ready for another attempt! Press the button whenever you are.",
            )
            .reply_markup(start_quiz_keyboard())
            .await?;
            dialogue.update(State::Ready { student }).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options.")
                .await?;
        }
    }
    Ok(())
}

async fn receive_admin_password(
    admin_password: String,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(attempt) if attempt == admin_password => {
            log::info!("admin logged in");
            bot.send_message(msg.chat.id, "Admin login successful!")
                .reply_markup(admin_keyboard())
                .await?;
            dialogue.update(State::AdminMenu).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Invalid admin credentials.")
                .await?;
        }
    }
    Ok(())
}

async fn admin_menu(
    results: ResultsStore,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(ADD_QUESTION) => {
            bot.send_message(msg.chat.id, "Send the question text.")
                .await?;
            dialogue.update(State::ReceiveNewQuestionText).await?;
        }
        Some(VIEW_RESULTS) => match results.load_all() {
            Ok(records) if records.is_empty() => {
                bot.send_message(msg.chat.id, "No results available yet")
                    .await?;
            }
            Ok(records) => {
                let listing = records
                    .iter()
                    .map(|record| {
                        format!(
                            "{}: {} ({}) scored {}/{} in {}s",
                            display_timestamp(&record.timestamp),
                            record.student_name,
                            record.student_email,
                            record.score,
                            record.total_questions,
                            record.time_seconds
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                bot.send_message(msg.chat.id, format!("📈 All Student Results\n\n{listing}"))
                    .await?;
            }
            Err(QuizError::SourceMissing { .. }) => {
                bot.send_message(msg.chat.id, "No results available yet")
                    .await?;
            }
            Err(error) => {
                log::warn!("failed to load results: {error}");
                bot.send_message(msg.chat.id, "Could not read the results table.")
                    .await?;
            }
        },
        Some(DOWNLOAD_RESULTS) => match results.export() {
            Ok(table) => {
                let document = InputFile::memory(table.into_bytes()).file_name(RESULTS_FILE);
                bot.send_document(msg.chat.id, document).await?;
            }
            Err(QuizError::SourceMissing { .. }) => {
                bot.send_message(msg.chat.id, "No results available yet")
                    .await?;
            }
            Err(error) => {
                log::warn!("failed to export results: {error}");
                bot.send_message(msg.chat.id, "Could not export the results table.")
                    .await?;
            }
        },
        Some(LOG_OUT) => {
            log::info!("admin logged out");
            bot.send_message(msg.chat.id, "Logged out. See you!")
                .reply_markup(role_keyboard())
                .await?;
            dialogue.update(State::ChoosingRole).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the admin tools.")
                .reply_markup(admin_keyboard())
                .await?;
        }
    }
    Ok(())
}

async fn receive_new_question_text(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    match msg.text().map(str::trim) {
        Some(question) if !question.is_empty() => {
            bot.send_message(msg.chat.id, "Send option 1.").await?;
            dialogue
                .update(State::ReceiveNewOption {
                    question: question.to_string(),
                    options: Vec::new(),
                })
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please send the question text.")
                .await?;
        }
    }
    Ok(())
}

async fn receive_new_option(
    bot: Bot,
    dialogue: QuizDialogue,
    (question, mut options): (String, Vec<String>),
    msg: Message,
) -> HandlerResult {
    match msg.text().map(str::trim) {
        Some(option) if !option.is_empty() => {
            options.push(option.to_string());
            if options.len() < 4 {
                bot.send_message(msg.chat.id, format!("Send option {}.", options.len() + 1))
                    .await?;
                dialogue
                    .update(State::ReceiveNewOption { question, options })
                    .await?;
            } else {
                let keyboard = KeyboardMarkup::new(
                    options
                        .iter()
                        .map(|option| vec![KeyboardButton::new(option.clone())])
                        .collect::<Vec<_>>(),
                );
                bot.send_message(msg.chat.id, "Which of these is the correct answer?")
                    .reply_markup(keyboard)
                    .await?;
                dialogue
                    .update(State::ReceiveCorrectAnswer { question, options })
                    .await?;
            }
        }
        _ => {
            bot.send_message(msg.chat.id, "Please send the option as text.")
                .await?;
        }
    }
    Ok(())
}

async fn receive_correct_answer(
    questions: QuestionStore,
    bot: Bot,
    dialogue: QuizDialogue,
    (question, options): (String, Vec<String>),
    msg: Message,
) -> HandlerResult {
    let answer = match msg.text() {
        Some(answer) if options.iter().any(|option| option == answer) => answer.to_string(),
        _ => {
            bot.send_message(msg.chat.id, "Please pick the correct answer with the buttons.")
                .await?;
            return Ok(());
        }
    };

    let options: [String; 4] = options
        .try_into()
        .map_err(|_| "expected exactly four options")?;
    let question = Question::new(question, options, answer);

    match questions.append(&question) {
        Ok(()) => {
            log::info!("admin added a question");
            bot.send_message(msg.chat.id, "Question saved successfully!")
                .reply_markup(admin_keyboard())
                .await?;
        }
        Err(error) => {
            log::warn!("failed to save the question: {error}");
            bot.send_message(msg.chat.id, "Could not save the question.")
                .reply_markup(admin_keyboard())
                .await?;
        }
    }

    dialogue.update(State::AdminMenu).await?;
    Ok(())
}

fn display_timestamp(raw: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|parsed| parsed.format("%d %b %Y %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
