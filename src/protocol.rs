//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Activity, ActivityKind, Badge, Question, QuestionKind, SchoolGrade, Score, StudentAnswer,
};
use crate::logic;

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Deserialize)]
pub struct TutorLoginIn {
    pub password: String,
}
#[derive(Serialize)]
pub struct TutorLoginOut {
    pub ok: bool,
    /// True when this call set the shared secret for the first time.
    pub created: bool,
}

#[derive(Deserialize)]
pub struct NewStudentIn {
    pub name: String,
    pub age: u8,
    pub grade: SchoolGrade,
}

/// Raw per-subject tallies collected by the placement quiz.
#[derive(Deserialize)]
pub struct PlacementResultsIn {
    pub results: BTreeMap<String, Score>,
}

/// Activity list plus how many entries this request's replenishment pass
/// appended (0 when the queue was already full or generation is degraded).
#[derive(Serialize)]
pub struct ActivitiesOut {
    pub activities: Vec<Activity>,
    pub generated: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedActivityOut {
    pub activity: Activity,
    pub score: Score,
    pub percentage: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoalIn {
    pub description: String,
}

/// Tutor-authored question as it arrives from the editor (no id yet).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionIn {
    pub question: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivityIn {
    pub student_id: String,
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<ActivityKind>,
    pub content: Vec<QuestionIn>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateActivityIn {
    pub student_id: String,
    pub title: String,
    pub instructions: String,
    #[serde(default)]
    pub source_text: Option<String>,
}

#[derive(Serialize)]
pub struct GeneratedQuestionsOut {
    pub questions: Vec<Question>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteActivityIn {
    pub student_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteActivityOut {
    pub score: Score,
    pub percentage: u8,
    pub awarded_points: u32,
    pub new_badges: Vec<Badge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    pub student_id: String,
    pub activity_id: String,
    pub question_index: u32,
    pub answer: String,
}
#[derive(Serialize)]
pub struct AnswerOut {
    pub ok: bool,
}

/// Per-question slice of the tutor review. `correct` is None for questions
/// that are never auto-graded.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQuestionOut {
    pub question: Question,
    pub given: Option<String>,
    pub correct: Option<bool>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOut {
    pub title: String,
    pub subject: String,
    pub score: Score,
    pub percentage: u8,
    pub questions: Vec<ReviewQuestionOut>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTextIn {
    pub filename: String,
    pub data_base64: String,
}
#[derive(Serialize)]
pub struct ExtractTextOut {
    pub text: String,
}

/// Build the graded review view for an activity and its stored answers.
pub fn to_review(activity: &Activity, answer: Option<&StudentAnswer>) -> ReviewOut {
    let score = logic::score_activity(activity, answer);
    let questions = activity
        .content
        .iter()
        .enumerate()
        .map(|(index, q)| {
            let given = answer.and_then(|a| a.answers.get(&(index as u32)).cloned());
            let correct = match q.kind {
                QuestionKind::MultipleChoice => {
                    Some(given.as_deref().is_some() && given.as_deref() == q.correct_answer.as_deref())
                }
                QuestionKind::OpenEnded => None,
            };
            ReviewQuestionOut { question: q.clone(), given, correct }
        })
        .collect();
    ReviewOut {
        title: activity.title.clone(),
        subject: activity.subject.clone(),
        score,
        percentage: score.percentage(),
        questions,
    }
}

/// Assemble a `Question` from editor input, minting an id and defaulting the
/// subject to the activity-level one.
pub fn to_question(q: QuestionIn, fallback_subject: &str) -> Question {
    Question {
        id: uuid::Uuid::new_v4().to_string(),
        question: q.question,
        subject: q.subject.unwrap_or_else(|| fallback_subject.to_string()),
        kind: q.kind,
        options: q.options,
        correct_answer: q.correct_answer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_activity() -> Activity {
        Activity {
            id: "a1".into(),
            title: "Interpretação de fábulas".into(),
            subject: "Português".into(),
            kind: ActivityKind::Manual,
            student_id: "s1".into(),
            content: vec![
                Question {
                    id: "q1".into(),
                    question: "Qual é a moral da história?".into(),
                    subject: "Português".into(),
                    kind: QuestionKind::MultipleChoice,
                    options: vec!["A".into(), "B".into()],
                    correct_answer: Some("A".into()),
                },
                Question {
                    id: "q2".into(),
                    question: "Reescreva o final.".into(),
                    subject: "Português".into(),
                    kind: QuestionKind::OpenEnded,
                    options: vec![],
                    correct_answer: None,
                },
            ],
        }
    }

    #[test]
    fn review_grades_only_multiple_choice() {
        let activity = sample_activity();
        let answer = StudentAnswer {
            activity_id: "a1".into(),
            answers: [(0u32, "A".to_string()), (1u32, "Era uma vez...".to_string())]
                .into_iter()
                .collect(),
        };
        let review = to_review(&activity, Some(&answer));
        assert_eq!(review.score, Score { correct: 1, total: 1 });
        assert_eq!(review.percentage, 100);
        assert_eq!(review.questions[0].correct, Some(true));
        assert_eq!(review.questions[1].correct, None);
        assert_eq!(review.questions[1].given.as_deref(), Some("Era uma vez..."));
    }

    #[test]
    fn review_of_unanswered_activity_marks_wrong_not_missing() {
        let activity = sample_activity();
        let review = to_review(&activity, None);
        assert_eq!(review.score, Score { correct: 0, total: 1 });
        assert_eq!(review.percentage, 0);
        assert_eq!(review.questions[0].correct, Some(false));
        assert!(review.questions[0].given.is_none());
    }

    #[test]
    fn editor_questions_get_ids_and_fallback_subject() {
        let q = to_question(
            QuestionIn {
                question: "Pergunta?".into(),
                subject: None,
                kind: QuestionKind::MultipleChoice,
                options: vec!["x".into(), "y".into()],
                correct_answer: Some("x".into()),
            },
            "Personalizada",
        );
        assert!(!q.id.is_empty());
        assert_eq!(q.subject, "Personalizada");
    }
}
