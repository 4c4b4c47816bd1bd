//! Ranking and score finalisation shared by the host and player views.

use std::{cmp::Ordering, collections::BTreeMap};

use indexmap::IndexMap;

use crate::state::{game::PlayerRecord, quiz::Question};

/// One line of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// 1-based rank; unique even when scores tie.
    pub position: usize,
    /// Player name.
    pub name: String,
    /// Player score.
    pub score: u32,
}

/// Order players by score, highest first, earliest joiner first among equals.
///
/// The order is total, so every viewer renders the same list.
pub fn rank(players: &IndexMap<String, PlayerRecord>) -> Vec<Standing> {
    let mut entries: Vec<(&String, &PlayerRecord)> = players.iter().collect();
    entries.sort_by(|(left_name, left), (right_name, right)| {
        compare(left_name, left, right_name, right)
    });

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (name, record))| Standing {
            position: index + 1,
            name: name.clone(),
            score: record.score,
        })
        .collect()
}

fn compare(
    left_name: &str,
    left: &PlayerRecord,
    right_name: &str,
    right: &PlayerRecord,
) -> Ordering {
    right
        .score
        .cmp(&left.score)
        .then(left.join_order.cmp(&right.join_order))
        .then_with(|| left_name.cmp(right_name))
}

/// Count the answers that match the correct option of the same question.
///
/// Indices outside the quiz never count.
pub fn score_answers(questions: &[Question], answers: &BTreeMap<usize, String>) -> u32 {
    answers
        .iter()
        .filter(|(index, option)| {
            questions
                .get(**index)
                .is_some_and(|question| question.is_correct(option))
        })
        .count() as u32
}

/// Recompute every score from the recorded answers.
///
/// Pure function of `answers`: running it again yields the same scores.
pub fn finalize_scores(questions: &[Question], players: &mut IndexMap<String, PlayerRecord>) {
    for record in players.values_mut() {
        record.score = score_answers(questions, &record.answers);
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn player(join_order: u32, score: u32) -> PlayerRecord {
        PlayerRecord {
            score,
            join_order,
            ..PlayerRecord::new(join_order, SystemTime::UNIX_EPOCH)
        }
    }

    fn question(answer: &str) -> Question {
        Question {
            text: format!("pick {answer}"),
            options: vec!["a".into(), "b".into()],
            correct_answer: answer.into(),
        }
    }

    #[test]
    fn higher_scores_rank_first_and_ties_keep_join_order() {
        let mut players = IndexMap::new();
        players.insert("carol".to_string(), player(0, 1));
        players.insert("alice".to_string(), player(1, 3));
        players.insert("bob".to_string(), player(2, 1));

        let standings = rank(&players);
        let names: Vec<_> = standings.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol", "bob"]);
        assert_eq!(
            standings.iter().map(|s| s.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn ranking_ignores_map_order_and_is_repeatable() {
        let mut forward = IndexMap::new();
        forward.insert("x".to_string(), player(0, 2));
        forward.insert("y".to_string(), player(1, 2));

        let mut reversed = IndexMap::new();
        reversed.insert("y".to_string(), player(1, 2));
        reversed.insert("x".to_string(), player(0, 2));

        assert_eq!(rank(&forward), rank(&reversed));
        assert_eq!(rank(&forward), rank(&forward));
    }

    #[test]
    fn empty_leaderboard() {
        assert!(rank(&IndexMap::new()).is_empty());
    }

    #[test]
    fn finalisation_counts_matching_answers_only() {
        let questions = vec![question("a"), question("b"), question("a")];
        let mut players = IndexMap::new();

        let mut dana = player(0, 99);
        dana.answers.insert(0, "a".into());
        dana.answers.insert(1, "a".into());
        dana.answers.insert(2, "a".into());
        dana.answers.insert(7, "a".into());
        players.insert("dana".to_string(), dana);
        players.insert("eve".to_string(), player(1, 5));

        finalize_scores(&questions, &mut players);
        assert_eq!(players["dana"].score, 2);
        assert_eq!(players["eve"].score, 0);
    }

    #[test]
    fn finalisation_is_idempotent() {
        let questions = vec![question("a"), question("b")];
        let mut players = IndexMap::new();
        let mut frank = player(0, 0);
        frank.answers.insert(0, "a".into());
        frank.answers.insert(1, "b".into());
        players.insert("frank".to_string(), frank);

        finalize_scores(&questions, &mut players);
        let first = players.clone();
        finalize_scores(&questions, &mut players);
        assert_eq!(first, players);
        assert_eq!(players["frank"].score, 2);
    }
}
