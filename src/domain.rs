//! Domain models used by the backend: students, activities, questions, answers,
//! study goals, badges, and the derived insights report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// School-year labels accepted for a student record (closed set).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchoolGrade {
  #[serde(rename = "Educação Infantil")]
  EducacaoInfantil,
  #[serde(rename = "1º Ano")]
  Ano1,
  #[serde(rename = "2º Ano")]
  Ano2,
  #[serde(rename = "3º Ano")]
  Ano3,
  #[serde(rename = "4º Ano")]
  Ano4,
  #[serde(rename = "5º Ano")]
  Ano5,
  #[serde(rename = "6º Ano")]
  Ano6,
  #[serde(rename = "7º Ano")]
  Ano7,
  #[serde(rename = "8º Ano")]
  Ano8,
  #[serde(rename = "9º Ano")]
  Ano9,
}

impl SchoolGrade {
  pub fn label(&self) -> &'static str {
    match self {
      SchoolGrade::EducacaoInfantil => "Educação Infantil",
      SchoolGrade::Ano1 => "1º Ano",
      SchoolGrade::Ano2 => "2º Ano",
      SchoolGrade::Ano3 => "3º Ano",
      SchoolGrade::Ano4 => "4º Ano",
      SchoolGrade::Ano5 => "5º Ano",
      SchoolGrade::Ano6 => "6º Ano",
      SchoolGrade::Ano7 => "7º Ano",
      SchoolGrade::Ano8 => "8º Ano",
      SchoolGrade::Ano9 => "9º Ano",
    }
  }
}

impl fmt::Display for SchoolGrade {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Per-subject proficiency level reported by the insights analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProficiencyLevel {
  Iniciante,
  #[serde(rename = "Em Desenvolvimento")]
  EmDesenvolvimento,
  Adequado,
  #[serde(rename = "Avançado")]
  Avancado,
}

impl ProficiencyLevel {
  /// How many times a subject at this level is repeated in the weighted
  /// selection pool. Weaker levels are drawn more often; advanced subjects
  /// drop out entirely.
  pub fn weight(&self) -> usize {
    match self {
      ProficiencyLevel::Iniciante => 4,
      ProficiencyLevel::EmDesenvolvimento => 3,
      ProficiencyLevel::Adequado => 1,
      ProficiencyLevel::Avancado => 0,
    }
  }
}

/// How is a question answered and graded?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
  /// One of a fixed set of options; auto-graded against `correct_answer`.
  #[serde(rename = "multiple-choice")]
  MultipleChoice,
  /// Free text; never auto-graded.
  #[serde(rename = "open-ended")]
  OpenEnded,
}

impl Default for QuestionKind {
  fn default() -> Self { QuestionKind::MultipleChoice }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub question: String,
  pub subject: String,
  #[serde(rename = "type", default)]
  pub kind: QuestionKind,
  #[serde(default)]
  pub options: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub correct_answer: Option<String>,
}

/// Where did the activity come from?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
  Manual,     // authored by the tutor in the editor
  SourceText, // derived from an uploaded document
  Generated,  // synthesized by the adaptive engine
}

/// One unit of practice work owned by exactly one student.
/// `content` is non-empty when saved; question order is significant and
/// stable (the position is the answer key).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
  pub id: String,
  pub title: String,
  pub subject: String,
  #[serde(rename = "type")]
  pub kind: ActivityKind,
  pub student_id: String,
  pub content: Vec<Question>,
}

/// Accumulated reward state on a student.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gamification {
  pub points: u32,
  pub badges: Vec<String>,
  /// Activities for which points have already been granted. Presence here is
  /// the sole source of truth for "already rewarded".
  #[serde(default)]
  pub rewarded_activities: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub id: String,
  pub name: String,
  pub age: u8,
  pub grade: SchoolGrade,
  pub nivelamento_completed: bool,
  /// Subject -> normalized percentage (0-100). Written exactly once by the
  /// placement flow, never recomputed.
  pub nivelamento_results: Option<BTreeMap<String, u8>>,
  pub gamification: Gamification,
}

/// At most one per (student, activity) pair, keyed by the activity id.
/// `answers` maps 0-based question index -> submitted text; the activity is
/// complete iff there is one entry per question.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnswer {
  pub activity_id: String,
  pub answers: BTreeMap<u32, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGoal {
  pub id: String,
  pub student_id: String,
  pub description: String,
  pub completed: bool,
}

/// Static catalog entry; the UI maps the id to a presentation asset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Badge {
  pub id: String,
  pub name: String,
  pub description: String,
}

/// One entry of the topic bank the adaptive engine draws from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
  pub subject: String,
  pub topic: String,
}

/// Per-subject slice of the insights report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubInfo {
  pub subject: String,
  pub level: ProficiencyLevel,
  pub summary: String,
  pub suggestions: String,
}

/// Derived per-student report, cached until explicitly recomputed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorInsights {
  pub lesson_suggestions: Vec<String>,
  pub hub_data: Vec<HubInfo>,
}

/// Auto-graded result of one activity: `total` counts only multiple-choice
/// questions. Also reused for the raw per-subject placement tallies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
  pub correct: u32,
  pub total: u32,
}

impl Score {
  pub fn percentage(&self) -> u8 {
    if self.total > 0 {
      ((self.correct as f64 / self.total as f64) * 100.0).round() as u8
    } else {
      0
    }
  }

  pub fn is_perfect(&self) -> bool {
    self.total > 0 && self.correct == self.total
  }
}

/// What one reward pass produced: full badge records for newly unlocked
/// badges plus the points actually granted (0 on a replayed activity).
#[derive(Clone, Debug, Default)]
pub struct RewardOutcome {
  pub new_badges: Vec<Badge>,
  pub awarded_points: u32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn percentage_rounds_and_guards_zero() {
    assert_eq!(Score { correct: 9, total: 12 }.percentage(), 75);
    assert_eq!(Score { correct: 2, total: 3 }.percentage(), 67);
    assert_eq!(Score { correct: 0, total: 0 }.percentage(), 0);
  }

  #[test]
  fn perfect_requires_nonzero_total() {
    assert!(Score { correct: 3, total: 3 }.is_perfect());
    assert!(!Score { correct: 0, total: 0 }.is_perfect());
    assert!(!Score { correct: 2, total: 3 }.is_perfect());
  }

  #[test]
  fn grade_serializes_as_label() {
    let json = serde_json::to_string(&SchoolGrade::Ano3).unwrap();
    assert_eq!(json, "\"3º Ano\"");
    let back: SchoolGrade = serde_json::from_str(&json).unwrap();
    assert_eq!(back, SchoolGrade::Ano3);
  }

  #[test]
  fn proficiency_levels_deserialize_from_labels() {
    let level: ProficiencyLevel = serde_json::from_str("\"Em Desenvolvimento\"").unwrap();
    assert_eq!(level, ProficiencyLevel::EmDesenvolvimento);
    assert_eq!(level.weight(), 3);
    assert_eq!(ProficiencyLevel::Avancado.weight(), 0);
  }

  #[test]
  fn student_answer_round_trips_indexed_map() {
    let mut answers = BTreeMap::new();
    answers.insert(0u32, "a".to_string());
    answers.insert(2u32, "c".to_string());
    let ans = StudentAnswer { activity_id: "act-1".into(), answers };
    let json = serde_json::to_value(&ans).unwrap();
    assert_eq!(json["activityId"], "act-1");
    assert_eq!(json["answers"]["2"], "c");
    let back: StudentAnswer = serde_json::from_value(json).unwrap();
    assert_eq!(back.answers.len(), 2);
  }
}
