//! Quiz questions and the line-oriented text format hosts upload.
//!
//! ```text
//! Q: What is the capital of France?
//! O: Paris
//! O: Lyon
//! A: Paris
//!
//! Q: ...
//! ```
//!
//! Records are separated by blank lines. Incomplete records are dropped
//! silently; only a file without a single usable record is an error.

use thiserror::Error;

const QUESTION_PREFIX: &str = "Q:";
const OPTION_PREFIX: &str = "O:";
const ANSWER_PREFIX: &str = "A:";

/// Smallest number of options a playable question may offer.
pub const MIN_OPTIONS: usize = 2;
/// Largest number of options a playable question may offer.
pub const MAX_OPTIONS: usize = 4;

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Question stem shown to everyone.
    pub text: String,
    /// Options in display order.
    pub options: Vec<String>,
    /// Text of the correct option; always one of `options`.
    pub correct_answer: String,
}

impl Question {
    /// Whether `option` is one of the offered options.
    pub fn offers(&self, option: &str) -> bool {
        self.options.iter().any(|candidate| candidate == option)
    }

    /// Whether `option` is the correct answer.
    pub fn is_correct(&self, option: &str) -> bool {
        self.correct_answer == option
    }
}

/// Raised when an uploaded quiz cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizParseError {
    /// No record survived parsing.
    #[error("invalid format or empty file")]
    NoQuestions,
    /// A parsed record has an unplayable number of options.
    #[error(
        "question {number} (`{text}`) has {count} option(s); between {min} and {max} are required",
        min = MIN_OPTIONS,
        max = MAX_OPTIONS
    )]
    OptionCount {
        /// 1-based position of the question in the file.
        number: usize,
        /// Question stem.
        text: String,
        /// Number of options found.
        count: usize,
    },
}

#[derive(Debug, Default)]
struct PartialRecord {
    text: String,
    options: Vec<String>,
    answer: Option<String>,
}

impl PartialRecord {
    fn complete(self) -> Option<Question> {
        let answer = self.answer?;
        if self.text.is_empty() || self.options.is_empty() {
            return None;
        }
        if !self.options.iter().any(|option| *option == answer) {
            return None;
        }
        Some(Question {
            text: self.text,
            options: self.options,
            correct_answer: answer,
        })
    }
}

/// Parse quiz text into questions, dropping every incomplete record.
///
/// Returns an empty vector when nothing usable was found.
pub fn parse_questions(text: &str) -> Vec<Question> {
    let mut questions = Vec::new();
    let mut current: Option<PartialRecord> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if let Some(record) = current.take() {
                questions.extend(record.complete());
            }
            continue;
        }

        if let Some(stem) = line.strip_prefix(QUESTION_PREFIX) {
            // A second `Q:` inside an open record is ignored.
            if current.is_none() {
                current = Some(PartialRecord {
                    text: stem.trim().to_owned(),
                    ..PartialRecord::default()
                });
            }
        } else if let Some(option) = line.strip_prefix(OPTION_PREFIX) {
            if let Some(record) = current.as_mut() {
                let option = option.trim();
                if !option.is_empty() {
                    record.options.push(option.to_owned());
                }
            }
        } else if let Some(answer) = line.strip_prefix(ANSWER_PREFIX) {
            if let Some(record) = current.as_mut() {
                record.answer = Some(answer.trim().to_owned());
            }
        }
    }

    if let Some(record) = current {
        questions.extend(record.complete());
    }

    questions
}

/// Parse quiz text and reject it when no question survived.
pub fn load_quiz(text: &str) -> Result<Vec<Question>, QuizParseError> {
    let questions = parse_questions(text);
    if questions.is_empty() {
        return Err(QuizParseError::NoQuestions);
    }
    Ok(questions)
}

/// Check that every question offers a playable number of options.
pub fn validate_questions(questions: &[Question]) -> Result<(), QuizParseError> {
    if questions.is_empty() {
        return Err(QuizParseError::NoQuestions);
    }
    for (index, question) in questions.iter().enumerate() {
        let count = question.options.len();
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
            return Err(QuizParseError::OptionCount {
                number: index + 1,
                text: question.text.clone(),
                count,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_QUESTIONS: &str = "\
Q: What is 2 + 2?
O: 3
O: 4
A: 4

Q:   Capital of Italy?
O: Rome
O:  Milan
O: Turin
A: Rome
";

    #[test]
    fn parses_blank_line_delimited_records() {
        let questions = parse_questions(TWO_QUESTIONS);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "What is 2 + 2?");
        assert_eq!(questions[0].options, vec!["3", "4"]);
        assert_eq!(questions[0].correct_answer, "4");
        assert_eq!(questions[1].text, "Capital of Italy?");
        assert_eq!(questions[1].options, vec!["Rome", "Milan", "Turin"]);
    }

    #[test]
    fn last_record_terminated_by_end_of_input() {
        let questions = parse_questions("Q: Sky colour?\nO: Blue\nO: Green\nA: Blue");
        assert_eq!(questions.len(), 1);
    }

    #[test]
    fn windows_line_endings_are_accepted() {
        let questions = parse_questions("Q: One?\r\nO: yes\r\nO: no\r\nA: yes\r\n");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "yes");
    }

    #[test]
    fn incomplete_records_are_dropped() {
        let text = "\
Q: Missing answer
O: a
O: b

Q: No options
A: a

O: orphan option
A: orphan answer

Q: Answer not offered
O: a
O: b
A: c

Q:
O: a
A: a

Q: Kept
O: x
O: y
A: y
";
        let questions = parse_questions(text);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "Kept");
    }

    #[test]
    fn single_option_record_is_parsed_but_rejected_by_validation() {
        let questions = parse_questions("Q: Lonely?\nO: yes\nA: yes\n");
        assert_eq!(questions.len(), 1);
        assert_eq!(
            validate_questions(&questions),
            Err(QuizParseError::OptionCount {
                number: 1,
                text: "Lonely?".into(),
                count: 1
            })
        );
    }

    #[test]
    fn every_parsed_question_is_structurally_complete() {
        for question in parse_questions(TWO_QUESTIONS) {
            assert!(!question.text.is_empty());
            assert!(!question.options.is_empty());
            assert!(question.offers(&question.correct_answer));
        }
    }

    #[test]
    fn empty_or_malformed_input_is_a_failure() {
        assert!(parse_questions("").is_empty());
        assert_eq!(load_quiz(""), Err(QuizParseError::NoQuestions));
        assert_eq!(
            load_quiz("hello\nworld\n\nQ: nope\n"),
            Err(QuizParseError::NoQuestions)
        );
        assert_eq!(
            QuizParseError::NoQuestions.to_string(),
            "invalid format or empty file"
        );
    }

    #[test]
    fn nested_question_line_is_ignored() {
        let questions = parse_questions("Q: First\nQ: Second\nO: a\nO: b\nA: a\n");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "First");
    }
}
