//! Core engines, kept as pure functions so they are testable in isolation:
//!
//!   - Grading: score an activity against its stored answers
//!   - Rewards: points formula and badge unlock evaluation
//!   - Placement: raw tallies -> normalized per-subject percentages
//!   - Adaptive selection: weighted subject pool and topic picking
//!
//! Randomness is injected (`&mut impl Rng`) so selection is deterministic
//! under test. State mutation lives in `state.rs`; nothing here touches it.

use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::{BADGE_FIRST_ACTIVITY, BADGE_PERFECT_SCORE, BADGE_THREE_COMPLETED};
use crate::domain::{Activity, HubInfo, QuestionKind, Score, Student, StudentAnswer, TopicEntry};

/// The adaptive engine keeps this many uncompleted activities queued.
pub const TARGET_QUEUE_DEPTH: usize = 3;

/// Points granted per correct multiple-choice answer.
const POINTS_PER_CORRECT: u32 = 10;
/// Flat bonus for a perfect score on an auto-gradable activity.
const PERFECT_BONUS: u32 = 50;

/// Auto-grade an activity. Only multiple-choice questions count toward
/// `total`; open-ended questions are never graded. A missing submission at an
/// index is simply incorrect.
pub fn score_activity(activity: &Activity, answer: Option<&StudentAnswer>) -> Score {
  let mut correct = 0;
  let mut total = 0;
  for (index, q) in activity.content.iter().enumerate() {
    if q.kind != QuestionKind::MultipleChoice {
      continue;
    }
    total += 1;
    let given = answer.and_then(|a| a.answers.get(&(index as u32)));
    if let (Some(expected), Some(given)) = (q.correct_answer.as_deref(), given) {
      if given == expected {
        correct += 1;
      }
    }
  }
  Score { correct, total }
}

/// Point payout for a freshly completed activity. An activity with no
/// auto-gradable questions earns nothing and never qualifies for the bonus.
pub fn points_for(score: &Score) -> u32 {
  score.correct * POINTS_PER_CORRECT + if score.is_perfect() { PERFECT_BONUS } else { 0 }
}

/// Is the stored answer record a full submission for this activity?
pub fn is_complete(activity: &Activity, answer: Option<&StudentAnswer>) -> bool {
  answer.map_or(false, |a| a.answers.len() == activity.content.len())
}

/// Normalize raw per-subject placement tallies into 0-100 percentages.
pub fn normalize_placement(raw: &BTreeMap<String, Score>) -> BTreeMap<String, u8> {
  raw
    .iter()
    .map(|(subject, tally)| (subject.clone(), tally.percentage()))
    .collect()
}

/// Badge unlock evaluation. Runs on every reward pass, replayed or not; the
/// completed-activity count is recomputed from the full history each time so
/// it reflects all activities, not just the current one.
pub fn check_new_badges(
  student: &Student,
  activities: &[Activity],
  answers: &[StudentAnswer],
  score: &Score,
) -> Vec<String> {
  let completed = answers
    .iter()
    .filter(|ans| {
      activities
        .iter()
        .find(|act| act.id == ans.activity_id)
        .map_or(false, |act| ans.answers.len() == act.content.len())
    })
    .count();

  let has = |id: &str| student.gamification.badges.iter().any(|b| b == id);
  let mut new_badges = Vec::new();

  if !has(BADGE_FIRST_ACTIVITY) && completed >= 1 {
    new_badges.push(BADGE_FIRST_ACTIVITY.to_string());
  }
  if !has(BADGE_PERFECT_SCORE) && score.is_perfect() {
    new_badges.push(BADGE_PERFECT_SCORE.to_string());
  }
  if !has(BADGE_THREE_COMPLETED) && completed >= 3 {
    new_badges.push(BADGE_THREE_COMPLETED.to_string());
  }

  new_badges
}

/// Build the weighted subject pool from the insights hub: each subject is
/// repeated `level.weight()` times. If every subject is advanced (all weights
/// zero) the pool falls back to one entry per subject, so it is never empty
/// while at least one subject exists.
pub fn build_weighted_pool(hub: &[HubInfo]) -> Vec<String> {
  let mut pool = Vec::new();
  for info in hub {
    for _ in 0..info.level.weight() {
      pool.push(info.subject.clone());
    }
  }
  if pool.is_empty() {
    pool = hub.iter().map(|info| info.subject.clone()).collect();
  }
  pool
}

/// Pick a topic for the chosen subject, preferring topics whose title is not
/// already among the student's uncompleted activities. When the subject has
/// no unused topic left, fall back to a uniform pick over the whole catalog.
pub fn pick_topic<'a>(
  catalog: &'a [TopicEntry],
  subject: &str,
  excluded_titles: &HashSet<String>,
  rng: &mut impl Rng,
) -> Option<&'a TopicEntry> {
  let available: Vec<&TopicEntry> = catalog
    .iter()
    .filter(|t| t.subject == subject && !excluded_titles.contains(&t.topic))
    .collect();
  if available.is_empty() {
    catalog.choose(rng)
  } else {
    available.choose(rng).copied()
  }
}

/// Validation applied before an activity is saved: non-empty content, and for
/// each multiple-choice question a non-empty set of distinct options with the
/// correct answer (when set) among them.
pub fn validate_activity(activity: &Activity) -> Result<(), String> {
  if activity.content.is_empty() {
    return Err("activity must contain at least one question".into());
  }
  for (index, q) in activity.content.iter().enumerate() {
    if q.question.trim().is_empty() {
      return Err(format!("question {} has no text", index + 1));
    }
    if q.kind != QuestionKind::MultipleChoice {
      continue;
    }
    if q.options.is_empty() {
      return Err(format!("question {} has no options", index + 1));
    }
    let mut seen = HashSet::new();
    for opt in &q.options {
      if !seen.insert(opt.as_str()) {
        return Err(format!("question {} has duplicate options", index + 1));
      }
    }
    if let Some(answer) = &q.correct_answer {
      if !q.options.iter().any(|o| o == answer) {
        return Err(format!("question {} marks a correct answer that is not an option", index + 1));
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ActivityKind, Gamification, ProficiencyLevel, Question, SchoolGrade};
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn mc_question(id: &str, correct: &str) -> Question {
    Question {
      id: id.into(),
      question: format!("Pergunta {}", id),
      subject: "Matemática".into(),
      kind: QuestionKind::MultipleChoice,
      options: vec!["a".into(), "b".into(), correct.into()],
      correct_answer: Some(correct.into()),
    }
  }

  fn open_question(id: &str) -> Question {
    Question {
      id: id.into(),
      question: format!("Pergunta {}", id),
      subject: "Português".into(),
      kind: QuestionKind::OpenEnded,
      options: vec![],
      correct_answer: None,
    }
  }

  fn activity(id: &str, content: Vec<Question>) -> Activity {
    Activity {
      id: id.into(),
      title: format!("Atividade {}", id),
      subject: "Matemática".into(),
      kind: ActivityKind::Generated,
      student_id: "s1".into(),
      content,
    }
  }

  fn answer_for(activity_id: &str, entries: &[(u32, &str)]) -> StudentAnswer {
    StudentAnswer {
      activity_id: activity_id.into(),
      answers: entries.iter().map(|(i, v)| (*i, v.to_string())).collect(),
    }
  }

  fn student() -> Student {
    Student {
      id: "s1".into(),
      name: "Ana".into(),
      age: 9,
      grade: SchoolGrade::Ano3,
      nivelamento_completed: true,
      nivelamento_results: None,
      gamification: Gamification::default(),
    }
  }

  fn hub(entries: &[(&str, ProficiencyLevel)]) -> Vec<HubInfo> {
    entries
      .iter()
      .map(|(subject, level)| HubInfo {
        subject: subject.to_string(),
        level: *level,
        summary: String::new(),
        suggestions: String::new(),
      })
      .collect()
  }

  #[test]
  fn open_ended_questions_never_count() {
    let act = activity("a1", vec![mc_question("q1", "c"), open_question("q2"), mc_question("q3", "c")]);
    let ans = answer_for("a1", &[(0, "c"), (1, "um texto livre"), (2, "b")]);
    let score = score_activity(&act, Some(&ans));
    assert_eq!(score, Score { correct: 1, total: 2 });
  }

  #[test]
  fn missing_submissions_are_incorrect_not_errors() {
    let act = activity("a1", vec![mc_question("q1", "c"), mc_question("q2", "c")]);
    let ans = answer_for("a1", &[(0, "c")]);
    assert_eq!(score_activity(&act, Some(&ans)), Score { correct: 1, total: 2 });
    assert_eq!(score_activity(&act, None), Score { correct: 0, total: 2 });
  }

  #[test]
  fn activity_without_gradable_questions_scores_zero_percent() {
    let act = activity("a1", vec![open_question("q1"), open_question("q2")]);
    let ans = answer_for("a1", &[(0, "x"), (1, "y")]);
    let score = score_activity(&act, Some(&ans));
    assert_eq!(score, Score { correct: 0, total: 0 });
    assert_eq!(score.percentage(), 0);
    assert_eq!(points_for(&score), 0);
  }

  #[test]
  fn unset_correct_answer_counts_toward_total_only() {
    let mut q = mc_question("q1", "c");
    q.correct_answer = None;
    let act = activity("a1", vec![q]);
    let ans = answer_for("a1", &[(0, "c")]);
    assert_eq!(score_activity(&act, Some(&ans)), Score { correct: 0, total: 1 });
  }

  #[test]
  fn perfect_score_earns_flat_bonus() {
    assert_eq!(points_for(&Score { correct: 4, total: 4 }), 90);
    assert_eq!(points_for(&Score { correct: 3, total: 3 }), 80);
    assert_eq!(points_for(&Score { correct: 2, total: 4 }), 20);
    assert_eq!(points_for(&Score { correct: 0, total: 0 }), 0);
  }

  #[test]
  fn placement_normalization_rounds_and_guards_zero() {
    let mut raw = BTreeMap::new();
    raw.insert("Matemática".to_string(), Score { correct: 9, total: 12 });
    raw.insert("Lógica".to_string(), Score { correct: 0, total: 0 });
    let normalized = normalize_placement(&raw);
    assert_eq!(normalized["Matemática"], 75);
    assert_eq!(normalized["Lógica"], 0);
  }

  #[test]
  fn first_and_third_completion_unlock_their_badges() {
    let acts: Vec<Activity> = (1..=3)
      .map(|i| activity(&format!("a{}", i), vec![mc_question("q1", "c")]))
      .collect();

    // First completion: only a1 answered.
    let answers = vec![answer_for("a1", &[(0, "b")])];
    let unlocked = check_new_badges(&student(), &acts, &answers, &Score { correct: 0, total: 1 });
    assert_eq!(unlocked, vec![BADGE_FIRST_ACTIVITY.to_string()]);

    // Third completion, imperfect prior scores: three_completed still fires.
    let mut s = student();
    s.gamification.badges = vec![BADGE_FIRST_ACTIVITY.to_string()];
    let answers: Vec<StudentAnswer> =
      (1..=3).map(|i| answer_for(&format!("a{}", i), &[(0, "b")])).collect();
    let unlocked = check_new_badges(&s, &acts, &answers, &Score { correct: 0, total: 1 });
    assert_eq!(unlocked, vec![BADGE_THREE_COMPLETED.to_string()]);
  }

  #[test]
  fn perfect_badge_tracks_the_just_scored_activity() {
    let acts = vec![activity("a1", vec![mc_question("q1", "c")])];
    let answers = vec![answer_for("a1", &[(0, "c")])];
    let unlocked = check_new_badges(&student(), &acts, &answers, &Score { correct: 1, total: 1 });
    assert!(unlocked.contains(&BADGE_PERFECT_SCORE.to_string()));
    assert!(unlocked.contains(&BADGE_FIRST_ACTIVITY.to_string()));
  }

  #[test]
  fn incomplete_answer_records_do_not_count_as_completions() {
    let acts = vec![activity("a1", vec![mc_question("q1", "c"), mc_question("q2", "c")])];
    let answers = vec![answer_for("a1", &[(0, "c")])];
    let unlocked = check_new_badges(&student(), &acts, &answers, &Score { correct: 1, total: 2 });
    assert!(unlocked.is_empty());
  }

  #[test]
  fn weighted_pool_repeats_weak_subjects() {
    let pool = build_weighted_pool(&hub(&[
      ("Matemática", ProficiencyLevel::Iniciante),
      ("Português", ProficiencyLevel::Adequado),
      ("Ciências", ProficiencyLevel::Avancado),
    ]));
    assert_eq!(pool.iter().filter(|s| *s == "Matemática").count(), 4);
    assert_eq!(pool.iter().filter(|s| *s == "Português").count(), 1);
    assert_eq!(pool.iter().filter(|s| *s == "Ciências").count(), 0);
  }

  #[test]
  fn all_advanced_falls_back_to_equal_weights() {
    let pool = build_weighted_pool(&hub(&[
      ("Matemática", ProficiencyLevel::Avancado),
      ("Português", ProficiencyLevel::Avancado),
    ]));
    assert_eq!(pool, vec!["Matemática".to_string(), "Português".to_string()]);
  }

  #[test]
  fn empty_hub_yields_empty_pool() {
    assert!(build_weighted_pool(&[]).is_empty());
  }

  #[test]
  fn topic_pick_avoids_titles_already_queued() {
    let catalog = vec![
      TopicEntry { subject: "Matemática".into(), topic: "Frações".into() },
      TopicEntry { subject: "Matemática".into(), topic: "Área e perímetro".into() },
      TopicEntry { subject: "Português".into(), topic: "Fábulas".into() },
    ];
    let excluded: HashSet<String> = ["Frações".to_string()].into_iter().collect();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
      let picked = pick_topic(&catalog, "Matemática", &excluded, &mut rng).unwrap();
      assert_eq!(picked.topic, "Área e perímetro");
    }
  }

  #[test]
  fn exhausted_subject_falls_back_to_whole_catalog() {
    let catalog = vec![
      TopicEntry { subject: "Matemática".into(), topic: "Frações".into() },
      TopicEntry { subject: "Português".into(), topic: "Fábulas".into() },
    ];
    let excluded: HashSet<String> = ["Frações".to_string()].into_iter().collect();
    let mut rng = StdRng::seed_from_u64(7);
    let mut seen = HashSet::new();
    for _ in 0..40 {
      seen.insert(pick_topic(&catalog, "Matemática", &excluded, &mut rng).unwrap().topic.clone());
    }
    // Any catalog entry may come back, including the excluded one.
    assert!(seen.contains("Fábulas"));
  }

  #[test]
  fn validate_activity_rejects_bad_shapes() {
    let empty = activity("a1", vec![]);
    assert!(validate_activity(&empty).is_err());

    let mut dup = mc_question("q1", "c");
    dup.options = vec!["a".into(), "a".into(), "c".into()];
    assert!(validate_activity(&activity("a2", vec![dup])).is_err());

    let mut stray = mc_question("q1", "c");
    stray.correct_answer = Some("not-an-option".into());
    assert!(validate_activity(&activity("a3", vec![stray])).is_err());

    let mut unset = mc_question("q1", "c");
    unset.correct_answer = None;
    assert!(validate_activity(&activity("a4", vec![unset])).is_ok());
  }
}
