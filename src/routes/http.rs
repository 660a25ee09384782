//! HTTP endpoint handlers. These are thin wrappers that forward to the domain
//! store and the content provider; each handler is instrumented and logs
//! parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  response::IntoResponse,
  Json,
};
use base64::Engine;
use tracing::{info, instrument, warn};

use crate::catalog::CUSTOM_SUBJECT;
use crate::domain::{Activity, ActivityKind, Question, Score};
use crate::error::{ApiError, Result};
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;
use crate::util::extract_plain_text;
use uuid::Uuid;

fn provider_unavailable() -> ApiError {
  ApiError::Provider("content provider unavailable (GEMINI_API_KEY not set)".into())
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_tutor_login(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TutorLoginIn>,
) -> Result<impl IntoResponse> {
  let created = state.tutor_login(&body.password).await?;
  Ok(Json(TutorLoginOut { ok: true, created }))
}

// -------- Students --------

#[instrument(level = "info", skip(state))]
pub async fn http_list_students(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.list_students().await)
}

#[instrument(level = "info", skip(state, body), fields(name = %body.name, grade = %body.grade))]
pub async fn http_add_student(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NewStudentIn>,
) -> Result<impl IntoResponse> {
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("student name must not be empty".into()));
  }
  let student = state.add_student(body.name.trim().to_string(), body.age, body.grade).await;
  Ok(Json(student))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_student(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  let student = state
    .get_student(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("unknown student: {}", id)))?;
  Ok(Json(student))
}

/// Generate the one-time placement test for the student's grade.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_placement_test(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  let student = state
    .get_student(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("unknown student: {}", id)))?;
  if student.nivelamento_completed {
    return Err(ApiError::BadRequest("placement already completed".into()));
  }
  let provider = state.provider.as_ref().ok_or_else(provider_unavailable)?;
  let questions = provider
    .generate_placement_test(&state.prompts, student.grade)
    .await
    .map_err(ApiError::Provider)?;
  info!(target: "placement", student = %id, count = questions.len(), "Placement test served");
  Ok(Json(questions))
}

#[instrument(level = "info", skip(state, body), fields(%id, subjects = body.results.len()))]
pub async fn http_complete_placement(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<PlacementResultsIn>,
) -> Result<impl IntoResponse> {
  let student = state.complete_nivelamento(&id, &body.results).await?;
  Ok(Json(student))
}

/// The student's activity queue. Viewing it is the natural trigger for the
/// adaptive engine: a guarded replenishment attempt runs first, and a failed
/// attempt degrades to serving the current list.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_student_activities(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  if state.get_student(&id).await.is_none() {
    return Err(ApiError::NotFound(format!("unknown student: {}", id)));
  }
  let generated = match state.replenish_activities(&id).await {
    Ok(n) => n,
    Err(e) => {
      warn!(target: "activity", student = %id, error = %e, "Replenishment degraded; serving current queue");
      0
    }
  };
  let activities = state.activities_for(&id).await;
  Ok(Json(ActivitiesOut { activities, generated }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_student_completed(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  if state.get_student(&id).await.is_none() {
    return Err(ApiError::NotFound(format!("unknown student: {}", id)));
  }
  let completed: Vec<CompletedActivityOut> = state
    .completed_for(&id)
    .await
    .into_iter()
    .map(|(activity, score)| CompletedActivityOut { activity, score, percentage: score.percentage() })
    .collect();
  Ok(Json(completed))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_student_insights(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  let student = state
    .get_student(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("unknown student: {}", id)))?;
  let insights = state.insights_for(&student).await.map_err(ApiError::Provider)?;
  Ok(Json(insights))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_refresh_insights(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  let student = state
    .get_student(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("unknown student: {}", id)))?;
  let insights = state.refresh_insights(&student).await.map_err(ApiError::Provider)?;
  Ok(Json(insights))
}

// -------- Study goals --------

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_student_goals(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  Json(state.goals_for(&id).await)
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_add_goal(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<NewGoalIn>,
) -> Result<impl IntoResponse> {
  if body.description.trim().is_empty() {
    return Err(ApiError::BadRequest("goal description must not be empty".into()));
  }
  let goal = state.add_goal(&id, body.description.trim().to_string()).await?;
  Ok(Json(goal))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_toggle_goal(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  Ok(Json(state.toggle_goal(&id).await?))
}

// -------- Activities --------

/// Save a tutor-authored activity after the edit pass.
#[instrument(level = "info", skip(state, body), fields(student = %body.student_id, title = %body.title, questions = body.content.len()))]
pub async fn http_add_activity(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NewActivityIn>,
) -> Result<impl IntoResponse> {
  if state.get_student(&body.student_id).await.is_none() {
    return Err(ApiError::NotFound(format!("unknown student: {}", body.student_id)));
  }
  let subject = body
    .subject
    .clone()
    .or_else(|| body.content.first().and_then(|q| q.subject.clone()))
    .unwrap_or_else(|| CUSTOM_SUBJECT.to_string());
  let content: Vec<Question> =
    body.content.into_iter().map(|q| to_question(q, &subject)).collect();
  let activity = Activity {
    id: Uuid::new_v4().to_string(),
    title: body.title,
    subject,
    kind: body.kind.unwrap_or(ActivityKind::Manual),
    student_id: body.student_id,
    content,
  };
  let saved = state.add_activity(activity).await?;
  Ok(Json(saved))
}

/// Ask the provider for editable questions from title/instructions and an
/// optional extracted source text. Nothing is saved here; the tutor reviews
/// and then posts to /activities.
#[instrument(level = "info", skip(state, body), fields(student = %body.student_id, title = %body.title, has_source = body.source_text.is_some()))]
pub async fn http_generate_activity(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateActivityIn>,
) -> Result<impl IntoResponse> {
  if body.title.trim().is_empty() || body.instructions.trim().is_empty() {
    return Err(ApiError::BadRequest("title and instructions are required".into()));
  }
  let student = state
    .get_student(&body.student_id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("unknown student: {}", body.student_id)))?;
  let provider = state.provider.as_ref().ok_or_else(provider_unavailable)?;
  let questions = provider
    .generate_from_instructions(
      &state.prompts,
      &body.title,
      &body.instructions,
      student.grade,
      body.source_text.as_deref(),
    )
    .await
    .map_err(ApiError::Provider)?;
  Ok(Json(GeneratedQuestionsOut { questions }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_activity(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse> {
  let activity = state
    .get_activity(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("unknown activity: {}", id)))?;
  Ok(Json(activity))
}

/// Graded per-question review for the tutor. Unknown activities yield the
/// empty default rather than an error.
#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_review_activity(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> impl IntoResponse {
  match state.get_activity(&id).await {
    Some(activity) => {
      let answer = state.get_answer(&id).await;
      Json(to_review(&activity, answer.as_ref()))
    }
    None => {
      warn!(target: "activity", %id, "Review of unknown activity; serving empty default");
      Json(ReviewOut::default())
    }
  }
}

/// Grade the stored answers and run the reward engine. Unknown students or
/// activities yield the empty default outcome.
#[instrument(level = "info", skip(state, body), fields(%id, student = %body.student_id))]
pub async fn http_complete_activity(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<CompleteActivityIn>,
) -> impl IntoResponse {
  let Some(activity) = state.get_activity(&id).await else {
    warn!(target: "activity", %id, "Completion of unknown activity; serving empty outcome");
    return Json(CompleteActivityOut {
      score: Score::default(),
      percentage: 0,
      awarded_points: 0,
      new_badges: vec![],
    });
  };
  let answer = state.get_answer(&id).await;
  let score = logic::score_activity(&activity, answer.as_ref());
  let outcome = state.award_rewards(&body.student_id, &activity.id, &score).await;
  info!(
    target: "activity",
    %id,
    student = %body.student_id,
    correct = score.correct,
    total = score.total,
    awarded_points = outcome.awarded_points,
    "Activity completion processed"
  );
  Json(CompleteActivityOut {
    score,
    percentage: score.percentage(),
    awarded_points: outcome.awarded_points,
    new_badges: outcome.new_badges,
  })
}

#[instrument(level = "info", skip(state, body), fields(student = %body.student_id, activity = %body.activity_id, index = body.question_index))]
pub async fn http_save_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnswerIn>,
) -> impl IntoResponse {
  let ok = state
    .save_answer(&body.student_id, &body.activity_id, body.question_index, body.answer)
    .await;
  Json(AnswerOut { ok })
}

/// Best-effort text extraction from an uploaded document. Failure is
/// non-fatal: the caller proceeds without source text.
#[instrument(level = "info", skip(body), fields(filename = %body.filename, payload_len = body.data_base64.len()))]
pub async fn http_extract_text(Json(body): Json<ExtractTextIn>) -> impl IntoResponse {
  let bytes = match base64::engine::general_purpose::STANDARD.decode(body.data_base64.as_bytes()) {
    Ok(b) => b,
    Err(e) => {
      warn!(target: "edututor_backend", filename = %body.filename, error = %e, "Document payload not decodable; proceeding without source text");
      return Json(ExtractTextOut { text: String::new() });
    }
  };
  let text = extract_plain_text(&bytes);
  info!(target: "edututor_backend", filename = %body.filename, extracted_len = text.len(), "Document text extracted");
  Json(ExtractTextOut { text })
}
