//! Minimal Gemini client for our use-cases.
//!
//! We only call models:generateContent and always request a strict JSON
//! payload, deserialized into typed DTOs and structurally validated before
//! being accepted. Calls are instrumented and log model names, latencies, and
//! response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to
//! avoid leaking student data into logs.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::CUSTOM_SUBJECT;
use crate::config::Prompts;
use crate::domain::{Activity, Question, QuestionKind, SchoolGrade, Student, StudentAnswer, TutorInsights};
use crate::util::{fill_template, trunc_for_log};

/// Placement tests carry two questions per placement subject.
const PLACEMENT_QUESTION_COUNT: usize = 12;
/// Generated topic activities carry this many questions.
const ACTIVITY_QUESTION_COUNT: usize = 3;
/// Tutor-authored generation is capped at this many questions.
const CUSTOM_QUESTION_CAP: usize = 5;

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub insights_model: String,
}

/// Shape every generation call asks the model for.
#[derive(Deserialize)]
struct GeneratedQuestion {
  question: String,
  options: Vec<String>,
  #[serde(rename = "correctAnswer")]
  correct_answer: String,
  #[serde(default)]
  subject: String,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok()?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let fast_model =
      std::env::var("GEMINI_FAST_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into());
    let insights_model =
      std::env::var("GEMINI_INSIGHTS_MODEL").unwrap_or_else(|_| "gemini-2.5-pro".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, insights_model })
  }

  /// JSON-mode generateContent call. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn call_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/models/{}:generateContent", self.base_url, model);
    let req = GenerateContentRequest {
      contents: vec![Content { role: Some("user".into()), parts: vec![Part { text: user.into() }] }],
      system_instruction: Some(Content { role: None, parts: vec![Part { text: system.into() }] }),
      generation_config: GenerationConfig {
        response_mime_type: "application/json".into(),
        temperature,
      },
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "edututor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_gemini_error(&body).unwrap_or(body);
      return Err(format!("Gemini HTTP {}: {}", status, msg));
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, candidate_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }
    let text = body
      .candidates
      .into_iter()
      .next()
      .and_then(|c| c.content)
      .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
      .unwrap_or_default();

    serde_json::from_str::<T>(text.trim()).map_err(|e| {
      error!(error = %e, body = %trunc_for_log(text.trim(), 200), "Gemini returned unparseable JSON");
      format!("JSON parse error: {}", e)
    })
  }

  // --- High-level helpers (domain-specialized) ---

  /// Generate the one-time placement test for a grade: 12 multiple-choice
  /// questions, two per placement subject.
  #[instrument(level = "info", skip(self, prompts), fields(%grade, model = %self.fast_model))]
  pub async fn generate_placement_test(
    &self,
    prompts: &Prompts,
    grade: SchoolGrade,
  ) -> Result<Vec<Question>, String> {
    let user = fill_template(
      &prompts.placement_user_template,
      &[("grade", grade.label()), ("curriculum", &prompts.curriculum_reference)],
    );
    let start = std::time::Instant::now();
    let items: Vec<GeneratedQuestion> =
      self.call_json(&self.fast_model, &prompts.placement_system, &user, 0.9).await?;
    info!(elapsed = ?start.elapsed(), count = items.len(), "Placement test generated");

    validate_generated(&items)?;
    if items.len() != PLACEMENT_QUESTION_COUNT {
      warn!(count = items.len(), expected = PLACEMENT_QUESTION_COUNT, "Placement test question count off contract");
    }
    Ok(items.into_iter().map(|g| to_question(g, None)).collect())
  }

  /// Generate a 3-question multiple-choice activity on a topic.
  #[instrument(level = "info", skip(self, prompts), fields(%topic, %subject, %grade, model = %self.fast_model))]
  pub async fn generate_activity(
    &self,
    prompts: &Prompts,
    topic: &str,
    subject: &str,
    grade: SchoolGrade,
  ) -> Result<Vec<Question>, String> {
    let user = fill_template(
      &prompts.activity_user_template,
      &[
        ("topic", topic),
        ("subject", subject),
        ("grade", grade.label()),
        ("curriculum", &prompts.curriculum_reference),
      ],
    );
    let items: Vec<GeneratedQuestion> =
      self.call_json(&self.fast_model, &prompts.activity_system, &user, 0.9).await?;

    validate_generated(&items)?;
    if items.len() != ACTIVITY_QUESTION_COUNT {
      warn!(count = items.len(), expected = ACTIVITY_QUESTION_COUNT, "Generated activity question count off contract");
    }
    Ok(items.into_iter().map(|g| to_question(g, Some(subject))).collect())
  }

  /// Generate up to 5 questions from a tutor's title/instructions and an
  /// optional extracted source text. Subject is inferred by the model or
  /// defaulted to the custom label.
  #[instrument(level = "info", skip(self, prompts, instructions, source_text), fields(%title, %grade, has_source = source_text.is_some(), model = %self.fast_model))]
  pub async fn generate_from_instructions(
    &self,
    prompts: &Prompts,
    title: &str,
    instructions: &str,
    grade: SchoolGrade,
    source_text: Option<&str>,
  ) -> Result<Vec<Question>, String> {
    let source_block = match source_text {
      Some(text) if !text.trim().is_empty() => format!(
        "\nTexto extraído de um documento fornecido pelo tutor (use como base principal):\n---\n{}\n---\n",
        text
      ),
      _ => String::new(),
    };
    let user = fill_template(
      &prompts.custom_user_template,
      &[
        ("title", title),
        ("instructions", instructions),
        ("grade", grade.label()),
        ("source_block", &source_block),
        ("curriculum", &prompts.curriculum_reference),
      ],
    );
    let mut items: Vec<GeneratedQuestion> =
      self.call_json(&self.fast_model, &prompts.custom_system, &user, 0.9).await?;

    validate_generated(&items)?;
    if items.len() > CUSTOM_QUESTION_CAP {
      warn!(count = items.len(), cap = CUSTOM_QUESTION_CAP, "Truncating oversized custom generation");
      items.truncate(CUSTOM_QUESTION_CAP);
    }
    Ok(items.into_iter().map(|g| to_question(g, None)).collect())
  }

  /// Analyze the student's placement + activity history into the insights
  /// report (3 lesson suggestions plus per-subject proficiency records).
  #[instrument(level = "info", skip_all, fields(student_id = %student.id, activity_count = activities.len(), model = %self.insights_model))]
  pub async fn generate_insights(
    &self,
    prompts: &Prompts,
    student: &Student,
    activities: &[Activity],
    answers: &[StudentAnswer],
  ) -> Result<TutorInsights, String> {
    let placement_json = match &student.nivelamento_results {
      Some(results) => serde_json::to_string(results).map_err(|e| e.to_string())?,
      None => "\"Não concluído\"".to_string(),
    };
    let performance = performance_report(activities, answers);
    let performance_json =
      serde_json::to_string_pretty(&performance).map_err(|e| e.to_string())?;

    let user = fill_template(
      &prompts.insights_user_template,
      &[
        ("student_name", &student.name),
        ("grade", student.grade.label()),
        ("placement_json", &placement_json),
        ("performance_json", &performance_json),
      ],
    );

    let start = std::time::Instant::now();
    let insights: TutorInsights =
      self.call_json(&self.insights_model, &prompts.insights_system, &user, 0.3).await?;
    info!(elapsed = ?start.elapsed(), subjects = insights.hub_data.len(), "Insights generated");

    if insights.hub_data.is_empty() {
      return Err("insights report contains no subject data".into());
    }
    Ok(insights)
  }
}

/// Per-activity digest the insights prompt is fed: title, subject, and either
/// "Não iniciada" or a score plus per-question correctness.
fn performance_report(activities: &[Activity], answers: &[StudentAnswer]) -> serde_json::Value {
  let rows: Vec<serde_json::Value> = activities
    .iter()
    .map(|activity| {
      match answers.iter().find(|a| a.activity_id == activity.id) {
        None => json!({
          "title": activity.title,
          "subject": activity.subject,
          "results": "Não iniciada",
        }),
        Some(ans) => {
          let mut correct = 0;
          let details: Vec<serde_json::Value> = activity
            .content
            .iter()
            .enumerate()
            .map(|(index, q)| {
              let is_correct = match (&q.correct_answer, ans.answers.get(&(index as u32))) {
                (Some(expected), Some(given)) => given == expected,
                _ => false,
              };
              if is_correct {
                correct += 1;
              }
              json!({ "question": q.question, "isCorrect": is_correct })
            })
            .collect();
          json!({
            "title": activity.title,
            "subject": activity.subject,
            "score": format!("{}/{}", correct, activity.content.len()),
            "details": details,
          })
        }
      }
    })
    .collect();
  serde_json::Value::Array(rows)
}

/// Structural validation before generated content is accepted: no partial or
/// malformed question set ever reaches the activity collection.
fn validate_generated(items: &[GeneratedQuestion]) -> Result<(), String> {
  if items.is_empty() {
    return Err("model returned no questions".into());
  }
  for (index, item) in items.iter().enumerate() {
    if item.question.trim().is_empty() {
      return Err(format!("generated question {} has no text", index + 1));
    }
    if item.options.len() < 2 {
      return Err(format!("generated question {} has too few options", index + 1));
    }
    if !item.options.iter().any(|o| o == &item.correct_answer) {
      return Err(format!(
        "generated question {} marks a correct answer that is not an option",
        index + 1
      ));
    }
  }
  Ok(())
}

fn to_question(g: GeneratedQuestion, forced_subject: Option<&str>) -> Question {
  let subject = match forced_subject {
    Some(s) => s.to_string(),
    None if g.subject.trim().is_empty() => CUSTOM_SUBJECT.to_string(),
    None => g.subject,
  };
  Question {
    id: Uuid::new_v4().to_string(),
    question: g.question,
    subject,
    kind: QuestionKind::MultipleChoice,
    options: g.options,
    correct_answer: Some(g.correct_answer),
  }
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  system_instruction: Option<Content>,
  generation_config: GenerationConfig,
}
#[derive(Serialize)]
struct Content {
  #[serde(skip_serializing_if = "Option::is_none")]
  role: Option<String>,
  parts: Vec<Part>,
}
#[derive(Serialize)]
struct Part { text: String }
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  response_mime_type: String,
  temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(default)]
  usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<CandidateContent>,
}
#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<CandidatePart>,
}
#[derive(Deserialize)]
struct CandidatePart {
  #[serde(default)]
  text: Option<String>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)]
  prompt_token_count: Option<u32>,
  #[serde(default)]
  candidates_token_count: Option<u32>,
  #[serde(default)]
  total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gen(question: &str, options: &[&str], correct: &str, subject: &str) -> GeneratedQuestion {
    GeneratedQuestion {
      question: question.into(),
      options: options.iter().map(|s| s.to_string()).collect(),
      correct_answer: correct.into(),
      subject: subject.into(),
    }
  }

  #[test]
  fn validation_rejects_partial_payloads() {
    assert!(validate_generated(&[]).is_err());
    assert!(validate_generated(&[gen("", &["a", "b"], "a", "Matemática")]).is_err());
    assert!(validate_generated(&[gen("Quanto é 2+2?", &["4"], "4", "Matemática")]).is_err());
    assert!(validate_generated(&[gen("Quanto é 2+2?", &["3", "4"], "5", "Matemática")]).is_err());
    assert!(validate_generated(&[gen("Quanto é 2+2?", &["3", "4"], "4", "Matemática")]).is_ok());
  }

  #[test]
  fn to_question_defaults_missing_subject_to_custom_label() {
    let q = to_question(gen("Pergunta?", &["a", "b"], "a", "  "), None);
    assert_eq!(q.subject, CUSTOM_SUBJECT);
    assert_eq!(q.kind, QuestionKind::MultipleChoice);
    assert_eq!(q.correct_answer.as_deref(), Some("a"));

    let q = to_question(gen("Pergunta?", &["a", "b"], "a", "História"), Some("Matemática"));
    assert_eq!(q.subject, "Matemática");
  }

  #[test]
  fn gemini_error_bodies_are_unwrapped() {
    let body = r#"{"error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
    assert_eq!(extract_gemini_error(body).as_deref(), Some("Resource exhausted"));
    assert!(extract_gemini_error("plain text").is_none());
  }
}
