//! Application state: the in-memory domain store backed 1:1 by the
//! persistence layer, plus prompts, catalogs and the optional Gemini client.
//!
//! This module owns:
//!   - the four entity collections (students, activities, answers, goals)
//!   - the derived insights cache (invalidated only by explicit refresh)
//!   - every domain mutation: placement completion, answer upsert, reward
//!     awarding, adaptive queue replenishment
//!
//! Lock order is students -> activities -> answers; all mutations persist the
//! touched collection before returning, so readers never observe a partially
//! applied change.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::{badge_by_id, default_topics};
use crate::config::{load_app_config_from_env, Prompts};
use crate::domain::{
    Activity, ActivityKind, Gamification, RewardOutcome, SchoolGrade, Score, Student,
    StudentAnswer, StudyGoal, TopicEntry, TutorInsights,
};
use crate::error::{ApiError, Result};
use crate::gemini::Gemini;
use crate::logic;
use crate::store::StateStore;

pub const KEY_STUDENTS: &str = "students";
pub const KEY_ACTIVITIES: &str = "activities";
pub const KEY_ANSWERS: &str = "answers";
pub const KEY_GOALS: &str = "goals";
pub const KEY_INSIGHTS: &str = "tutorInsights";
pub const KEY_TUTOR_PASSWORD: &str = "tutorPassword";

const TUTOR_PASSWORD_MIN_CHARS: usize = 4;

#[derive(Clone)]
pub struct AppState {
    pub students: Arc<RwLock<BTreeMap<String, Student>>>,
    /// Insertion order is significant: the queue view appends.
    pub activities: Arc<RwLock<Vec<Activity>>>,
    /// Keyed by activity id; at most one record per activity.
    pub answers: Arc<RwLock<BTreeMap<String, StudentAnswer>>>,
    pub goals: Arc<RwLock<Vec<StudyGoal>>>,
    pub insights: Arc<RwLock<BTreeMap<String, TutorInsights>>>,
    /// Per-student in-flight guard for queue replenishment.
    replenishing: Arc<StdMutex<HashSet<String>>>,
    pub topics: Vec<TopicEntry>,
    pub provider: Option<Gemini>,
    pub prompts: Prompts,
    store: Arc<dyn StateStore>,
}

impl AppState {
    /// Build state from env: load config, materialize the stored collections,
    /// init the Gemini client.
    #[instrument(level = "info", skip_all)]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default();
        let prompts = cfg.prompts;
        let mut topics = default_topics();
        for entry in cfg.topics {
            if !topics.contains(&entry) {
                topics.push(entry);
            }
        }

        let students: BTreeMap<String, Student> = load_collection(store.as_ref(), KEY_STUDENTS);
        let activities: Vec<Activity> = load_collection(store.as_ref(), KEY_ACTIVITIES);
        let answers: BTreeMap<String, StudentAnswer> = load_collection(store.as_ref(), KEY_ANSWERS);
        let goals: Vec<StudyGoal> = load_collection(store.as_ref(), KEY_GOALS);
        let insights: BTreeMap<String, TutorInsights> = load_collection(store.as_ref(), KEY_INSIGHTS);

        info!(
            target: "edututor_backend",
            students = students.len(),
            activities = activities.len(),
            answers = answers.len(),
            goals = goals.len(),
            cached_insights = insights.len(),
            topics = topics.len(),
            "Startup inventory"
        );

        let provider = Gemini::from_env();
        if let Some(g) = &provider {
            info!(target: "edututor_backend", base_url = %g.base_url, fast_model = %g.fast_model, insights_model = %g.insights_model, "Gemini enabled.");
        } else {
            info!(target: "edututor_backend", "Gemini disabled (no GEMINI_API_KEY). Generation endpoints will report the provider as unavailable.");
        }

        Self {
            students: Arc::new(RwLock::new(students)),
            activities: Arc::new(RwLock::new(activities)),
            answers: Arc::new(RwLock::new(answers)),
            goals: Arc::new(RwLock::new(goals)),
            insights: Arc::new(RwLock::new(insights)),
            replenishing: Arc::new(StdMutex::new(HashSet::new())),
            topics,
            provider,
            prompts,
            store,
        }
    }

    // -------- Cross-session refresh --------

    /// Fold external store writes back into memory. Each collection is
    /// re-read and deep-compared against the current snapshot; only actual
    /// differences are applied, so self-writes and echoes coalesce to no-ops.
    #[instrument(level = "debug", skip(self))]
    pub async fn refresh_from_store(&self) -> bool {
        let mut changed = false;
        changed |= self
            .refresh_collection::<BTreeMap<String, Student>>(KEY_STUDENTS, &self.students)
            .await;
        changed |= self
            .refresh_collection::<Vec<Activity>>(KEY_ACTIVITIES, &self.activities)
            .await;
        changed |= self
            .refresh_collection::<BTreeMap<String, StudentAnswer>>(KEY_ANSWERS, &self.answers)
            .await;
        changed |= self
            .refresh_collection::<Vec<StudyGoal>>(KEY_GOALS, &self.goals)
            .await;
        changed |= self
            .refresh_collection::<BTreeMap<String, TutorInsights>>(KEY_INSIGHTS, &self.insights)
            .await;
        changed
    }

    async fn refresh_collection<T>(&self, key: &str, slot: &RwLock<T>) -> bool
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let current = {
            let guard = slot.read().await;
            serde_json::to_value(&*guard).ok()
        };
        match (current, self.store.get(key)) {
            (Some(cur), Some(inc)) if cur == inc => false,
            (_, Some(inc)) => match serde_json::from_value::<T>(inc) {
                Ok(fresh) => {
                    *slot.write().await = fresh;
                    info!(target: "edututor_backend", %key, "Folded external change into memory");
                    true
                }
                Err(e) => {
                    error!(target: "edututor_backend", %key, error = %e, "External change not deserializable; keeping current state");
                    false
                }
            },
            (Some(cur), None) => {
                let initial = serde_json::to_value(T::default()).ok();
                if Some(cur) == initial {
                    false
                } else {
                    *slot.write().await = T::default();
                    warn!(target: "edututor_backend", %key, "Store key removed; resetting collection");
                    true
                }
            }
            (None, None) => false,
        }
    }

    async fn persist_students(&self) {
        self.persist(KEY_STUDENTS, &*self.students.read().await).await;
    }
    async fn persist_activities(&self) {
        self.persist(KEY_ACTIVITIES, &*self.activities.read().await).await;
    }
    async fn persist_answers(&self) {
        self.persist(KEY_ANSWERS, &*self.answers.read().await).await;
    }
    async fn persist_goals(&self) {
        self.persist(KEY_GOALS, &*self.goals.read().await).await;
    }
    async fn persist_insights(&self) {
        self.persist(KEY_INSIGHTS, &*self.insights.read().await).await;
    }

    async fn persist<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.store.set(key, v),
            Err(e) => error!(target: "edututor_backend", %key, error = %e, "Failed to serialize collection"),
        }
    }

    // -------- Students --------

    #[instrument(level = "info", skip(self), fields(%name, %grade))]
    pub async fn add_student(&self, name: String, age: u8, grade: SchoolGrade) -> Student {
        let student = Student {
            id: Uuid::new_v4().to_string(),
            name,
            age,
            grade,
            nivelamento_completed: false,
            nivelamento_results: None,
            gamification: Gamification::default(),
        };
        self.students.write().await.insert(student.id.clone(), student.clone());
        self.persist_students().await;
        info!(target: "student", id = %student.id, "Student created");
        student
    }

    pub async fn list_students(&self) -> Vec<Student> {
        let mut students: Vec<Student> = self.students.read().await.values().cloned().collect();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        students
    }

    pub async fn get_student(&self, id: &str) -> Option<Student> {
        self.students.read().await.get(id).cloned()
    }

    /// One-shot placement transition: normalize the raw per-subject tallies
    /// and mark the student as placed. There is no way back to NotPlaced, and
    /// a second attempt is rejected rather than recomputed.
    #[instrument(level = "info", skip(self, raw), fields(%student_id, subjects = raw.len()))]
    pub async fn complete_nivelamento(
        &self,
        student_id: &str,
        raw: &BTreeMap<String, Score>,
    ) -> Result<Student> {
        let updated = {
            let mut students = self.students.write().await;
            let student = students
                .get_mut(student_id)
                .ok_or_else(|| ApiError::NotFound(format!("unknown student: {}", student_id)))?;
            if student.nivelamento_completed {
                return Err(ApiError::BadRequest("placement already completed".into()));
            }
            student.nivelamento_results = Some(logic::normalize_placement(raw));
            student.nivelamento_completed = true;
            student.clone()
        };
        self.persist_students().await;
        info!(target: "placement", student = %student_id, "Placement completed");
        Ok(updated)
    }

    // -------- Activities --------

    #[instrument(level = "info", skip(self, activity), fields(id = %activity.id, student = %activity.student_id))]
    pub async fn add_activity(&self, activity: Activity) -> Result<Activity> {
        logic::validate_activity(&activity).map_err(ApiError::BadRequest)?;
        self.activities.write().await.push(activity.clone());
        self.persist_activities().await;
        info!(target: "activity", id = %activity.id, kind = ?activity.kind, "Activity saved");
        Ok(activity)
    }

    pub async fn get_activity(&self, id: &str) -> Option<Activity> {
        self.activities.read().await.iter().find(|a| a.id == id).cloned()
    }

    pub async fn activities_for(&self, student_id: &str) -> Vec<Activity> {
        self.activities
            .read()
            .await
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect()
    }

    /// Activities whose stored answer (if any) covers fewer indices than the
    /// activity has questions.
    pub async fn uncompleted_for(&self, student_id: &str) -> Vec<Activity> {
        let activities = self.activities.read().await;
        let answers = self.answers.read().await;
        activities
            .iter()
            .filter(|a| a.student_id == student_id && !logic::is_complete(a, answers.get(&a.id)))
            .cloned()
            .collect()
    }

    /// Fully answered activities with their auto-graded scores.
    pub async fn completed_for(&self, student_id: &str) -> Vec<(Activity, Score)> {
        let activities = self.activities.read().await;
        let answers = self.answers.read().await;
        activities
            .iter()
            .filter(|a| a.student_id == student_id)
            .filter_map(|a| {
                let ans = answers.get(&a.id);
                if logic::is_complete(a, ans) {
                    Some((a.clone(), logic::score_activity(a, ans)))
                } else {
                    None
                }
            })
            .collect()
    }

    // -------- Answers --------

    pub async fn get_answer(&self, activity_id: &str) -> Option<StudentAnswer> {
        self.answers.read().await.get(activity_id).cloned()
    }

    /// Upsert one submitted answer. Creates the record on first write for the
    /// activity; the last write for a given index wins. Unknown activities
    /// (or a student/activity mismatch) are a logged no-op.
    #[instrument(level = "info", skip(self, answer), fields(%student_id, %activity_id, question_index))]
    pub async fn save_answer(
        &self,
        student_id: &str,
        activity_id: &str,
        question_index: u32,
        answer: String,
    ) -> bool {
        let known = {
            self.activities
                .read()
                .await
                .iter()
                .any(|a| a.id == activity_id && a.student_id == student_id)
        };
        if !known {
            warn!(target: "activity", %activity_id, %student_id, "Ignoring answer for unknown activity");
            return false;
        }
        {
            let mut answers = self.answers.write().await;
            let record = answers.entry(activity_id.to_string()).or_insert_with(|| StudentAnswer {
                activity_id: activity_id.to_string(),
                answers: BTreeMap::new(),
            });
            record.answers.insert(question_index, answer);
        }
        self.persist_answers().await;
        true
    }

    // -------- Rewards --------

    /// Award points and evaluate badge unlocks for a completed activity.
    ///
    /// Points are granted at most once per activity (`rewarded_activities` is
    /// the source of truth); badge evaluation runs on every call regardless,
    /// matching the observed product behavior. Unknown students yield the
    /// empty outcome.
    #[instrument(level = "info", skip(self, score), fields(%student_id, %activity_id, correct = score.correct, total = score.total))]
    pub async fn award_rewards(
        &self,
        student_id: &str,
        activity_id: &str,
        score: &Score,
    ) -> RewardOutcome {
        let mut students = self.students.write().await;
        let Some(student) = students.get_mut(student_id) else {
            warn!(target: "student", %student_id, "Reward pass for unknown student; no-op");
            return RewardOutcome::default();
        };

        let already_rewarded = student
            .gamification
            .rewarded_activities
            .iter()
            .any(|a| a == activity_id);
        let points = if already_rewarded { 0 } else { logic::points_for(score) };

        let (student_activities, student_answers) = {
            let activities = self.activities.read().await;
            let answers = self.answers.read().await;
            let acts: Vec<Activity> = activities
                .iter()
                .filter(|a| a.student_id == student_id)
                .cloned()
                .collect();
            let ans: Vec<StudentAnswer> =
                acts.iter().filter_map(|a| answers.get(&a.id).cloned()).collect();
            (acts, ans)
        };

        let new_badge_ids = logic::check_new_badges(student, &student_activities, &student_answers, score);

        let mutated = points > 0 || !new_badge_ids.is_empty();
        if mutated {
            student.gamification.points += points;
            for id in &new_badge_ids {
                if !student.gamification.badges.contains(id) {
                    student.gamification.badges.push(id.clone());
                }
            }
            // Badge-only unlocks do not mark the activity as rewarded.
            if points > 0 {
                student.gamification.rewarded_activities.push(activity_id.to_string());
            }
        }
        drop(students);
        if mutated {
            self.persist_students().await;
        }

        info!(
            target: "student",
            %student_id,
            %activity_id,
            awarded_points = points,
            new_badges = new_badge_ids.len(),
            already_rewarded,
            "Reward pass finished"
        );

        RewardOutcome {
            new_badges: new_badge_ids.iter().filter_map(|id| badge_by_id(id)).collect(),
            awarded_points: points,
        }
    }

    // -------- Insights --------

    /// Cached-or-computed insights for a student. The cache is only ever
    /// invalidated by `refresh_insights`.
    pub async fn insights_for(&self, student: &Student) -> std::result::Result<TutorInsights, String> {
        if let Some(cached) = self.insights.read().await.get(&student.id) {
            return Ok(cached.clone());
        }
        self.refresh_insights(student).await
    }

    /// Recompute insights via the content provider and replace the cache.
    #[instrument(level = "info", skip(self, student), fields(student_id = %student.id))]
    pub async fn refresh_insights(&self, student: &Student) -> std::result::Result<TutorInsights, String> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| "content provider unavailable (GEMINI_API_KEY not set)".to_string())?;
        let (activities, answers) = {
            let acts = self.activities_for(&student.id).await;
            let answers = self.answers.read().await;
            let ans: Vec<StudentAnswer> =
                acts.iter().filter_map(|a| answers.get(&a.id).cloned()).collect();
            (acts, ans)
        };
        let insights = provider
            .generate_insights(&self.prompts, student, &activities, &answers)
            .await?;
        self.insights.write().await.insert(student.id.clone(), insights.clone());
        self.persist_insights().await;
        Ok(insights)
    }

    // -------- Adaptive replenishment --------

    /// Top the student's queue back up to the target depth with generated
    /// activities, biased toward weak subjects. Skips silently when the
    /// student is unknown, unplaced, already full, or a run is in flight;
    /// fails (abandoning the whole attempt) when the provider or the
    /// proficiency fetch fails. The next natural trigger re-evaluates.
    #[instrument(level = "info", skip(self), fields(%student_id))]
    pub async fn replenish_activities(&self, student_id: &str) -> std::result::Result<usize, String> {
        let Some(student) = self.get_student(student_id).await else {
            return Ok(0);
        };
        if !student.nivelamento_completed {
            return Ok(0);
        }

        let Some(_guard) = ReplenishGuard::acquire(&self.replenishing, student_id) else {
            info!(target: "activity", %student_id, "Replenishment already in flight; skipping");
            return Ok(0);
        };

        let uncompleted = self.uncompleted_for(student_id).await;
        let needed = logic::TARGET_QUEUE_DEPTH.saturating_sub(uncompleted.len());
        if needed == 0 {
            return Ok(0);
        }

        let insights = self.insights_for(&student).await?;
        let pool = logic::build_weighted_pool(&insights.hub_data);
        if pool.is_empty() {
            warn!(target: "activity", %student_id, "Insights carry no subjects; nothing to generate");
            return Ok(0);
        }

        let excluded: HashSet<String> = uncompleted.iter().map(|a| a.title.clone()).collect();
        let mut created = 0;
        for _ in 0..needed {
            let pick = {
                let mut rng = rand::thread_rng();
                pool.choose(&mut rng)
                    .and_then(|subject| logic::pick_topic(&self.topics, subject, &excluded, &mut rng))
                    .cloned()
            };
            let Some(entry) = pick else { break };
            self.add_generated_activity(&student, &entry.subject, &entry.topic).await?;
            created += 1;
        }
        info!(target: "activity", %student_id, created, "Replenished activity queue");
        Ok(created)
    }

    /// Ask the provider for a topic activity and append it to the queue.
    async fn add_generated_activity(
        &self,
        student: &Student,
        subject: &str,
        topic: &str,
    ) -> std::result::Result<Activity, String> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| "content provider unavailable (GEMINI_API_KEY not set)".to_string())?;
        let content = provider
            .generate_activity(&self.prompts, topic, subject, student.grade)
            .await?;
        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            title: topic.to_string(),
            subject: subject.to_string(),
            kind: ActivityKind::Generated,
            student_id: student.id.clone(),
            content,
        };
        self.add_activity(activity.clone()).await.map_err(|e| e.to_string())?;
        Ok(activity)
    }

    // -------- Study goals --------

    #[instrument(level = "info", skip(self, description), fields(%student_id))]
    pub async fn add_goal(&self, student_id: &str, description: String) -> Result<StudyGoal> {
        if self.get_student(student_id).await.is_none() {
            return Err(ApiError::NotFound(format!("unknown student: {}", student_id)));
        }
        let goal = StudyGoal {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            description,
            completed: false,
        };
        self.goals.write().await.push(goal.clone());
        self.persist_goals().await;
        Ok(goal)
    }

    pub async fn goals_for(&self, student_id: &str) -> Vec<StudyGoal> {
        self.goals
            .read()
            .await
            .iter()
            .filter(|g| g.student_id == student_id)
            .cloned()
            .collect()
    }

    pub async fn toggle_goal(&self, goal_id: &str) -> Result<StudyGoal> {
        let updated = {
            let mut goals = self.goals.write().await;
            let goal = goals
                .iter_mut()
                .find(|g| g.id == goal_id)
                .ok_or_else(|| ApiError::NotFound(format!("unknown goal: {}", goal_id)))?;
            goal.completed = !goal.completed;
            goal.clone()
        };
        self.persist_goals().await;
        Ok(updated)
    }

    // -------- Tutor shared secret --------

    /// First call stores the password (min length enforced); later calls
    /// string-compare. Returns whether this call created the secret.
    #[instrument(level = "info", skip_all)]
    pub async fn tutor_login(&self, password: &str) -> Result<bool> {
        let stored = self
            .store
            .get(KEY_TUTOR_PASSWORD)
            .and_then(|v| v.as_str().map(str::to_string));
        match stored {
            Some(expected) => {
                if password == expected {
                    Ok(false)
                } else {
                    Err(ApiError::Unauthorized("senha incorreta".into()))
                }
            }
            None => {
                if password.chars().count() < TUTOR_PASSWORD_MIN_CHARS {
                    return Err(ApiError::BadRequest(
                        "a senha deve ter pelo menos 4 caracteres".into(),
                    ));
                }
                self.store
                    .set(KEY_TUTOR_PASSWORD, serde_json::Value::String(password.to_string()));
                info!(target: "edututor_backend", "Tutor password created");
                Ok(true)
            }
        }
    }
}

fn load_collection<T: DeserializeOwned + Default>(store: &dyn StateStore, key: &str) -> T {
    match store.get(key) {
        Some(v) => match serde_json::from_value(v) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(target: "edututor_backend", %key, error = %e, "Stored collection unreadable; starting empty");
                T::default()
            }
        },
        None => T::default(),
    }
}

/// RAII guard for the per-student replenishment flag: acquire fails while a
/// prior run for the same student is still in flight.
struct ReplenishGuard<'a> {
    set: &'a StdMutex<HashSet<String>>,
    student_id: String,
}

impl<'a> ReplenishGuard<'a> {
    fn acquire(set: &'a StdMutex<HashSet<String>>, student_id: &str) -> Option<Self> {
        let mut in_flight = set.lock().ok()?;
        if !in_flight.insert(student_id.to_string()) {
            return None;
        }
        Some(Self { set, student_id: student_id.to_string() })
    }
}

impl Drop for ReplenishGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.set.lock() {
            in_flight.remove(&self.student_id);
        }
    }
}
