//! Session orchestration: lifecycle, turn sequencing, stopping rules and the
//! terminal transition.
//!
//! `IN_PROGRESS → {COMPLETED, SUBMITTED, FAILED, ABANDONED}`. Sessions are
//! created directly in `IN_PROGRESS`. Each `submit_response` runs under the
//! session's mutex: append the STUDENT turn, score, recompute θ over the whole
//! history, update mastery, then either ask the next question or finalize.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assessor::{ResponseAssessment, ResponseAssessor};
use crate::clock::Clock;
use crate::config::VivaConfig;
use crate::domain::{
    AssignmentConfig, Concept, ConversationTurn, DifficultyTier, FinalAssessment, PendingQuestion, QuestionTemplate,
    Review, Rubric, ScoredResponse, SessionStatus, Speaker, TerminationReason, VivaSession,
};
use crate::error::{VivaError, VivaResult};
use crate::irt::{AbilityEstimate, AbilityEstimator};
use crate::mastery::record_answer;
use crate::notify::{dispatch, FlagAlert, Notifier};
use crate::outcome::OutcomeClassifier;
use crate::review::{apply_review, evaluate_flags, flag_reason_string};
use crate::rubrics::RubricStore;
use crate::selector::select_next;
use crate::store::SessionStore;
use crate::util::trunc_for_log;

/// Question as presented to the student.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskedQuestion {
    pub question_number: u32,
    pub template_id: String,
    pub concept_id: String,
    pub concept_name: String,
    pub text: String,
    pub code_snippet: Option<String>,
    pub tier: DifficultyTier,
}

impl AskedQuestion {
    fn new(number: u32, concept: &Concept, template: &QuestionTemplate) -> Self {
        Self {
            question_number: number,
            template_id: template.id.clone(),
            concept_id: concept.id.clone(),
            concept_name: concept.name.clone(),
            text: template.text.clone(),
            code_snippet: template.code_snippet.clone(),
            tier: template.tier,
        }
    }
}

#[derive(Clone, Debug)]
pub enum NextStep {
    Question(AskedQuestion),
    Finished(FinalAssessment),
}

#[derive(Clone, Debug)]
pub struct ResponseOutcome {
    pub session: VivaSession,
    pub assessment: ResponseAssessment,
    pub next: NextStep,
}

pub struct VivaEngine {
    config: Arc<VivaConfig>,
    rubrics: Arc<RubricStore>,
    store: SessionStore,
    estimator: AbilityEstimator,
    assessor: ResponseAssessor,
    classifier: OutcomeClassifier,
    notifier: Option<Notifier>,
    clock: Arc<dyn Clock>,
}

impl VivaEngine {
    pub fn new(config: VivaConfig, rubrics: Arc<RubricStore>, notifier: Option<Notifier>, clock: Arc<dyn Clock>) -> Self {
        let estimator = AbilityEstimator::new(&config.engine, config.scoring.pass_threshold);
        let assessor = ResponseAssessor::new(config.scoring.clone());
        let classifier = OutcomeClassifier::new(config.outcome.clone(), config.scoring.clone());
        Self {
            config: Arc::new(config),
            rubrics,
            store: SessionStore::new(),
            estimator,
            assessor,
            classifier,
            notifier,
            clock,
        }
    }

    pub fn config(&self) -> &VivaConfig {
        &self.config
    }

    pub fn rubrics(&self) -> &RubricStore {
        &self.rubrics
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn assignment_config(&self, assignment_id: &str) -> AssignmentConfig {
        self.config.assignment(assignment_id)
    }

    /// Start a session using the assignment's configured viva settings.
    pub async fn start_session(&self, assignment_id: &str, student_id: &str) -> VivaResult<(VivaSession, AskedQuestion)> {
        let assignment = self.assignment_config(assignment_id);
        self.start_session_with(assignment, student_id).await
    }

    #[instrument(level = "info", skip(self, assignment), fields(assignment = %assignment.id, %student_id))]
    pub async fn start_session_with(
        &self,
        assignment: AssignmentConfig,
        student_id: &str,
    ) -> VivaResult<(VivaSession, AskedQuestion)> {
        if assignment.id.trim().is_empty() || student_id.trim().is_empty() {
            return Err(VivaError::Validation("assignmentId and studentId must not be empty".into()));
        }
        // A live attempt wins over any configuration problem.
        if let Some(active) = self.store.active_for_pair(student_id, &assignment.id).await {
            return Err(VivaError::Conflict(format!(
                "student {student_id} already has session {active} in progress for assignment {}",
                assignment.id
            )));
        }
        if !assignment.enabled {
            return Err(VivaError::NotConfigured(format!("viva is disabled for assignment {}", assignment.id)));
        }
        let rubric = self
            .rubrics
            .active_for(&assignment.id)
            .await
            .ok_or_else(|| VivaError::NotConfigured(format!("no ACTIVE rubric for assignment {}", assignment.id)))?;
        if rubric.selectable_question_count() == 0 {
            return Err(VivaError::NotConfigured(format!("rubric {} has no selectable questions", rubric.id)));
        }

        let now = self.clock.now();
        let prior = self.estimator.initial();
        let assignment_id = assignment.id.clone();
        let session = self
            .store
            .create(&assignment_id, student_id, |attempt| {
                let mut s = VivaSession {
                    id: Uuid::new_v4().to_string(),
                    assignment_id: assignment.id.clone(),
                    student_id: student_id.to_string(),
                    attempt_number: attempt,
                    status: SessionStatus::InProgress,
                    rubric: rubric.clone(),
                    assignment,
                    started_at: now,
                    completed_at: None,
                    last_activity_at: now,
                    time_spent_secs: 0,
                    theta: prior.theta,
                    standard_error: prior.standard_error,
                    overall_score: None,
                    competency_level: None,
                    passed: None,
                    flagged: false,
                    flag_reason: None,
                    review: Review::default(),
                    termination: None,
                    end_reason: None,
                    turns: vec![],
                    responses: vec![],
                    mastery: Default::default(),
                    assessment: None,
                    pending: None,
                };
                if self.ask_next(&mut s, now).is_none() {
                    return Err(VivaError::NotConfigured(format!("rubric {} has no selectable questions", rubric.id)));
                }
                Ok(s)
            })
            .await?;

        let question = self
            .pending_question(&session)
            .ok_or_else(|| VivaError::InvalidState("new session has no pending question".into()))?;
        info!(target: "viva", session = %session.id, attempt = session.attempt_number, rubric = %session.rubric.id, first = %question.template_id, "Session started");
        Ok((session, question))
    }

    /// Score one answer and advance the session. A second call racing on the
    /// same session fails fast with `ConcurrentModification`.
    #[instrument(level = "info", skip(self, transcript), fields(%session_id, transcript_len = transcript.len()))]
    pub async fn submit_response(
        &self,
        session_id: &str,
        transcript: &str,
        similarity: Option<f64>,
    ) -> VivaResult<ResponseOutcome> {
        let handle = self.store.get(session_id).await?;
        let mut guard = handle
            .try_lock()
            .map_err(|_| VivaError::ConcurrentModification(session_id.to_string()))?;
        let session = &mut *guard;

        if session.status != SessionStatus::InProgress {
            return Err(VivaError::InvalidState(format!(
                "cannot submit a response: session {} is {:?}",
                session.id, session.status
            )));
        }
        if let Some(s) = similarity {
            if !(s.is_finite() && (0.0..=1.0).contains(&s)) {
                return Err(VivaError::Validation(format!("similarity must be within [0, 1], got {s}")));
            }
        }

        let now = self.clock.now();
        let rubric: Arc<Rubric> = session.rubric.clone();
        let asked = session
            .pending
            .clone()
            .and_then(|p| rubric.template(&p.template_id).map(|(c, q)| (p, c, q)));
        let Some((pending, concept, template)) = asked else {
            // The snapshot cannot answer for the pending question: unrecoverable.
            self.finalize(session, SessionStatus::Failed, TerminationReason::Error, Some("pending question unavailable".into()), now);
            self.store.sync(session).await;
            return Err(VivaError::InvalidState(format!("session {} has no answerable question", session.id)));
        };

        let turn_number = session.next_turn_number();
        session.turns.push(ConversationTurn {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            turn_number,
            speaker: Speaker::Student,
            text: transcript.to_string(),
            template_id: Some(template.id.clone()),
            timestamp: now,
        });
        debug!(target: "viva", session = %session.id, turn = turn_number, transcript = %trunc_for_log(transcript, 60), "Student turn appended");

        let assessment = self.assessor.assess(concept, template, transcript, similarity);
        let misconception_ids: Vec<String> = assessment.misconceptions.iter().map(|m| m.id.clone()).collect();
        session.responses.push(ScoredResponse {
            turn_number,
            template_id: template.id.clone(),
            concept_id: concept.id.clone(),
            discrimination: template.discrimination,
            difficulty: template.difficulty,
            correctness: assessment.correctness,
            misconceptions: misconception_ids.clone(),
            latency_secs: (now - pending.asked_at).num_milliseconds() as f64 / 1000.0,
            expected_response_secs: template.expected_response_secs,
        });

        let items = self.estimator.items_from(&session.responses);
        let current = AbilityEstimate { theta: session.theta, standard_error: session.standard_error };
        let estimate = self.estimator.update(current, &items);
        session.theta = estimate.theta;
        session.standard_error = estimate.standard_error;

        record_answer(
            &mut session.mastery,
            &session.id,
            &concept.id,
            template,
            assessment.correctness,
            &misconception_ids,
            &self.config.scoring,
        );
        session.pending = None;
        session.last_activity_at = now;

        info!(target: "viva", session = %session.id, template = %template.id, correctness = %format!("{:.2}", assessment.correctness), theta = %format!("{:.3}", session.theta), se = %format!("{:.3}", session.standard_error), "Response scored");

        let next = match self.stopping_rule(session) {
            Some(reason) => NextStep::Finished(self.finalize(session, SessionStatus::Completed, reason, None, now)),
            None => match self.ask_next(session, now) {
                Some(q) => NextStep::Question(q),
                None => NextStep::Finished(self.finalize(
                    session,
                    SessionStatus::Completed,
                    TerminationReason::ItemPoolExhausted,
                    None,
                    now,
                )),
            },
        };

        self.store.sync(session).await;
        self.alert_if_flagged(session);
        Ok(ResponseOutcome { session: session.clone(), assessment, next })
    }

    /// Force `SUBMITTED` (student ended early) or `ABANDONED`. Waits for any
    /// in-flight scoring on the session before applying the transition.
    #[instrument(level = "info", skip(self, reason), fields(%session_id, abandoned))]
    pub async fn end_session(&self, session_id: &str, reason: Option<String>, abandoned: bool) -> VivaResult<VivaSession> {
        let handle = self.store.get(session_id).await?;
        let mut guard = handle.lock().await;
        let session = &mut *guard;

        if session.status != SessionStatus::InProgress {
            return Err(VivaError::InvalidState(format!(
                "cannot end session {}: it is {:?}",
                session.id, session.status
            )));
        }
        let (status, termination) = if abandoned {
            (SessionStatus::Abandoned, TerminationReason::Abandoned)
        } else {
            (SessionStatus::Submitted, TerminationReason::StudentSubmitted)
        };
        let now = self.clock.now();
        self.finalize(session, status, termination, reason, now);
        self.store.sync(session).await;
        self.alert_if_flagged(session);
        Ok(session.clone())
    }

    /// Instructor review; see `review::apply_review`.
    #[instrument(level = "info", skip(self, override_reason), fields(%session_id, %reviewer_id))]
    pub async fn review_session(
        &self,
        session_id: &str,
        reviewer_id: &str,
        score_override: Option<f64>,
        override_reason: Option<String>,
    ) -> VivaResult<VivaSession> {
        let handle = self.store.get(session_id).await?;
        let mut guard = handle.lock().await;
        let session = &mut *guard;
        apply_review(session, reviewer_id, score_override, override_reason, self.clock.now())?;
        self.store.sync(session).await;
        info!(target: "viva", session = %session.id, %reviewer_id, score_override = ?score_override, "Session reviewed");
        Ok(session.clone())
    }

    /// Last committed state. Never takes the session mutex, so polling does
    /// not collide with a submit in flight.
    pub async fn get_session(&self, session_id: &str) -> VivaResult<VivaSession> {
        self.store.snapshot(session_id).await
    }

    /// End every IN_PROGRESS session idle for longer than the inactivity window.
    /// Returns how many sessions were abandoned.
    pub async fn abandon_inactive(&self) -> usize {
        let window = Duration::minutes(self.config.engine.inactivity_timeout_mins as i64);
        let cutoff = self.clock.now() - window;
        let mut abandoned = 0;
        for id in self.store.inactive_since(cutoff).await {
            let Ok(handle) = self.store.get(&id).await else { continue };
            let mut guard = handle.lock().await;
            let session = &mut *guard;
            // Activity may have landed while we waited for the lock.
            if session.status != SessionStatus::InProgress || session.last_activity_at >= cutoff {
                continue;
            }
            let now = self.clock.now();
            self.finalize(session, SessionStatus::Abandoned, TerminationReason::Abandoned, Some("inactivity timeout".into()), now);
            self.store.sync(session).await;
            self.alert_if_flagged(session);
            abandoned += 1;
        }
        abandoned
    }

    /// Periodically abandon idle sessions.
    pub fn spawn_inactivity_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let every = std::time::Duration::from_secs(self.config.engine.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let n = self.abandon_inactive().await;
                if n > 0 {
                    info!(target: "viva", abandoned = n, "Inactivity sweep");
                }
            }
        })
    }

    // -------- internals --------

    /// Select and ask the next question: appends the AI turn and sets `pending`.
    fn ask_next(&self, session: &mut VivaSession, now: DateTime<Utc>) -> Option<AskedQuestion> {
        let rubric = session.rubric.clone();
        let picked = {
            let asked: HashSet<&str> = session.asked_template_ids().collect();
            select_next(&rubric, session.theta, &asked)
        }?;

        let number = session.questions_answered() as u32 + 1;
        let question = AskedQuestion::new(number, picked.concept, picked.template);
        let turn_number = session.next_turn_number();
        session.turns.push(ConversationTurn {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            turn_number,
            speaker: Speaker::Ai,
            text: picked.template.text.clone(),
            template_id: Some(picked.template.id.clone()),
            timestamp: now,
        });
        session.pending = Some(PendingQuestion {
            template_id: picked.template.id.clone(),
            concept_id: picked.concept.id.clone(),
            asked_at: now,
        });
        session.last_activity_at = now;
        debug!(target: "viva", session = %session.id, template = %picked.template.id, information = %format!("{:.4}", picked.information), "Question selected");
        Some(question)
    }

    fn pending_question(&self, session: &VivaSession) -> Option<AskedQuestion> {
        let pending = session.pending.as_ref()?;
        let (concept, template) = session.rubric.template(&pending.template_id)?;
        Some(AskedQuestion::new(session.questions_answered() as u32 + 1, concept, template))
    }

    /// Fixed-length, precision and content-balancing stopping rules.
    fn stopping_rule(&self, session: &VivaSession) -> Option<TerminationReason> {
        let engine = &self.config.engine;
        let answered = session.questions_answered() as u32;
        if answered >= engine.max_questions {
            return Some(TerminationReason::MaxQuestions);
        }
        if answered < engine.min_questions {
            return None;
        }
        if session.standard_error < engine.precision_threshold {
            return Some(TerminationReason::PrecisionReached);
        }
        let covered = session
            .rubric
            .concepts
            .iter()
            .filter(|c| c.is_selectable())
            .all(|c| session.mastery.contains_key(&c.id));
        if covered {
            return Some(TerminationReason::ContentCovered);
        }
        None
    }

    /// Terminal transition. Always produces an assessment, whatever data exists.
    fn finalize(
        &self,
        session: &mut VivaSession,
        status: SessionStatus,
        termination: TerminationReason,
        end_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> FinalAssessment {
        let assessment = self.classifier.classify(session, now);
        session.status = status;
        session.termination = Some(termination);
        session.end_reason = end_reason;
        session.completed_at = Some(now);
        session.time_spent_secs = (now - session.started_at).num_seconds().max(0);
        session.overall_score = Some(assessment.overall_score);
        session.competency_level = Some(assessment.competency_level);
        session.passed = Some(assessment.passed);
        session.assessment = Some(assessment.clone());
        session.pending = None;
        session.last_activity_at = now;

        let flags = evaluate_flags(session, &self.config.review);
        session.flagged = !flags.is_empty();
        session.flag_reason = flag_reason_string(&flags);

        info!(
            target: "viva",
            session = %session.id,
            status = ?status,
            termination = ?termination,
            questions = session.questions_answered(),
            overall = %format!("{:.3}", assessment.overall_score),
            level = ?assessment.competency_level,
            passed = assessment.passed,
            flagged = session.flagged,
            "Session terminated"
        );
        assessment
    }

    fn alert_if_flagged(&self, session: &VivaSession) {
        let Some(reason) = session.flag_reason.clone() else { return };
        if !session.flagged {
            return;
        }
        warn!(target: "viva", session = %session.id, %reason, "Session flagged for review");
        dispatch(
            self.notifier.as_ref(),
            FlagAlert {
                session_id: session.id.clone(),
                assignment_id: session.assignment_id.clone(),
                student_id: session.student_id.clone(),
                attempt_number: session.attempt_number,
                reason,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::domain::RubricStatus;
    use crate::seeds::{seed_rubric, DEMO_ASSIGNMENT_ID};

    fn engine_with(config: VivaConfig) -> (Arc<VivaEngine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let rubrics = Arc::new(RubricStore::from_bank(&config.rubrics));
        let engine = VivaEngine::new(config, rubrics, None, clock.clone());
        (Arc::new(engine), clock)
    }

    fn engine() -> (Arc<VivaEngine>, Arc<ManualClock>) {
        engine_with(VivaConfig::default())
    }

    fn sample_answer(template_id: &str) -> String {
        seed_rubric().template(template_id).map(|(_, q)| q.sample_answer.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_start_asks_first_question_as_turn_one() {
        let (engine, _) = engine();
        let (session, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.attempt_number, 1);
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.turns[0].turn_number, 1);
        assert_eq!(session.turns[0].speaker, Speaker::Ai);
        assert_eq!(q.question_number, 1);
        // Highest information at θ=0 in the seed rubric.
        assert_eq!(q.template_id, "bor-2");
    }

    #[tokio::test]
    async fn test_second_start_conflicts_while_in_progress() {
        let (engine, _) = engine();
        engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        let err = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap_err();
        assert!(matches!(err, VivaError::Conflict(_)));
        // Other students are unaffected.
        engine.start_session(DEMO_ASSIGNMENT_ID, "bob").await.unwrap();
    }

    #[tokio::test]
    async fn test_not_configured_without_active_rubric_or_when_disabled() {
        let (engine, _) = engine();
        let err = engine.start_session("no-rubric", "alice").await.unwrap_err();
        assert!(matches!(err, VivaError::NotConfigured(_)));

        let disabled = AssignmentConfig { enabled: false, ..AssignmentConfig::default_for(DEMO_ASSIGNMENT_ID) };
        let err = engine.start_session_with(disabled, "alice").await.unwrap_err();
        assert!(matches!(err, VivaError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_loop_terminates_with_alternating_turns() {
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 5, min_questions: 5, precision_threshold: 0.0, ..EngineConfig::default() };
        let (engine, clock) = engine_with(config);
        let (session, mut q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let mut finished = None;
        for i in 0..20 {
            clock.advance(Duration::seconds(45));
            let answer = if i % 2 == 0 { sample_answer(&q.template_id) } else { "I am not sure".to_string() };
            let out = engine.submit_response(&session.id, &answer, None).await.unwrap();
            assert!(out.session.theta.abs() <= 4.0);
            match out.next {
                NextStep::Question(next) => q = next,
                NextStep::Finished(a) => {
                    finished = Some((out.session, a));
                    break;
                }
            }
        }
        let (done, assessment) = finished.expect("session reached a terminal state");
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.termination, Some(TerminationReason::MaxQuestions));
        assert_eq!(done.responses.len(), 5);
        assert_eq!(done.overall_score, Some(assessment.overall_score));

        for (i, turn) in done.turns.iter().enumerate() {
            assert_eq!(turn.turn_number, i as u32 + 1);
            let expected = if i % 2 == 0 { Speaker::Ai } else { Speaker::Student };
            assert_eq!(turn.speaker, expected);
        }
        let asked: HashSet<&str> = done.asked_template_ids().collect();
        assert_eq!(asked.len(), 5);

        let err = engine.submit_response(&done.id, "late", None).await.unwrap_err();
        assert!(matches!(err, VivaError::InvalidState(_)));

        let (next, _) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        assert_eq!(next.attempt_number, 2);
    }

    #[tokio::test]
    async fn test_item_pool_exhaustion_completes_session() {
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 50, min_questions: 50, ..EngineConfig::default() };
        let (engine, _) = engine_with(config);
        let (session, _) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let mut last = None;
        for _ in 0..8 {
            last = Some(engine.submit_response(&session.id, "no idea", None).await.unwrap());
        }
        let out = last.unwrap();
        assert!(matches!(out.next, NextStep::Finished(_)));
        assert_eq!(out.session.termination, Some(TerminationReason::ItemPoolExhausted));
        assert_eq!(out.session.theta, -4.0);
    }

    #[tokio::test]
    async fn test_concurrent_submit_is_rejected() {
        let (engine, _) = engine();
        let (session, _) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        let handle = engine.store().get(&session.id).await.unwrap();
        let _held = handle.lock().await;
        let err = engine.submit_response(&session.id, "answer", None).await.unwrap_err();
        assert!(matches!(err, VivaError::ConcurrentModification(_)));
    }

    #[tokio::test]
    async fn test_end_session_submitted_and_abandoned() {
        let (engine, _) = engine();
        let (s1, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        engine.submit_response(&s1.id, &sample_answer(&q.template_id), None).await.unwrap();
        let ended = engine.end_session(&s1.id, Some("done early".into()), false).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Submitted);
        assert_eq!(ended.end_reason.as_deref(), Some("done early"));
        let a = ended.assessment.unwrap();
        assert_eq!(a.breakdown.len(), 1);
        assert!(a.confidence < 0.5);

        let err = engine.end_session(&s1.id, None, true).await.unwrap_err();
        assert!(matches!(err, VivaError::InvalidState(_)));

        let (s2, _) = engine.start_session(DEMO_ASSIGNMENT_ID, "bob").await.unwrap();
        let ended = engine.end_session(&s2.id, None, true).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Abandoned);
        // No answers at all still yields an assessment.
        assert_eq!(ended.overall_score, Some(0.0));
        assert!(ended.flagged);
    }

    #[tokio::test]
    async fn test_override_keeps_computed_assessment() {
        let (engine, _) = engine();
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        engine.submit_response(&s.id, &sample_answer(&q.template_id), None).await.unwrap();
        let ended = engine.end_session(&s.id, None, false).await.unwrap();
        let original_score = ended.overall_score;
        let original_level = ended.competency_level;

        engine.review_session(&s.id, "prof-x", Some(0.9), Some("strong oral defence".into())).await.unwrap();
        let reviewed = engine.review_session(&s.id, "prof-y", Some(0.4), Some("recheck".into())).await.unwrap();

        assert_eq!(reviewed.overall_score, original_score);
        assert_eq!(reviewed.competency_level, original_level);
        assert_eq!(reviewed.assessment.unwrap().overall_score, original_score.unwrap());
        assert!(reviewed.review.reviewed);
        assert_eq!(reviewed.review.reviewed_by.as_deref(), Some("prof-y"));
        assert_eq!(reviewed.review.score_override, Some(0.4));
        assert_eq!(reviewed.review.override_reason.as_deref(), Some("recheck"));
    }

    #[tokio::test]
    async fn test_inactive_sessions_are_abandoned() {
        let (engine, clock) = engine();
        let (idle, _) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        clock.advance(Duration::minutes(10));
        let (active, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "bob").await.unwrap();
        clock.advance(Duration::minutes(6));
        engine.submit_response(&active.id, &sample_answer(&q.template_id), None).await.unwrap();

        assert_eq!(engine.abandon_inactive().await, 1);
        let idle = engine.get_session(&idle.id).await.unwrap();
        assert_eq!(idle.status, SessionStatus::Abandoned);
        assert_eq!(idle.end_reason.as_deref(), Some("inactivity timeout"));
        assert_eq!(engine.get_session(&active.id).await.unwrap().status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_fast_answer_is_flagged_as_timing_outlier() {
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 1, min_questions: 1, ..EngineConfig::default() };
        config.review.low_confidence_se = 10.0;
        let (engine, clock) = engine_with(config);
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        clock.advance(Duration::seconds(1));
        let out = engine.submit_response(&s.id, &sample_answer(&q.template_id), None).await.unwrap();
        assert_eq!(out.session.status, SessionStatus::Completed);
        assert!(out.session.flagged);
        assert_eq!(out.session.flag_reason.as_deref(), Some("timing_outlier:turn=2"));
    }

    #[tokio::test]
    async fn test_session_keeps_rubric_snapshot_after_republish() {
        let (engine, _) = engine();
        let (s, _) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let mut v2 = seed_rubric();
        v2.id = "rust-fundamentals-v2".into();
        v2.concepts.truncate(1);
        v2.status = RubricStatus::Active;
        engine.rubrics().publish(v2).await.unwrap();

        let out = engine.submit_response(&s.id, "it moved", None).await.unwrap();
        assert_eq!(out.session.rubric.id, "rust-fundamentals-v1");
        assert_eq!(out.session.rubric.concepts.len(), 3);
    }

    #[tokio::test]
    async fn test_similarity_out_of_range_is_rejected_without_side_effects() {
        let (engine, _) = engine();
        let (s, _) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        let err = engine.submit_response(&s.id, "answer", Some(1.5)).await.unwrap_err();
        assert!(matches!(err, VivaError::Validation(_)));
        assert_eq!(engine.get_session(&s.id).await.unwrap().turns.len(), 1);
    }

    async fn answer_until_finished(engine: &VivaEngine, session_id: &str, first: AskedQuestion) -> VivaSession {
        let mut q = first;
        for _ in 0..20 {
            let out = engine.submit_response(session_id, &sample_answer(&q.template_id), None).await.unwrap();
            match out.next {
                NextStep::Question(next) => q = next,
                NextStep::Finished(_) => return out.session,
            }
        }
        panic!("session {session_id} never finished");
    }

    #[tokio::test]
    async fn test_live_session_conflicts_before_configuration_checks() {
        let (engine, _) = engine();
        engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let mut archived = seed_rubric();
        archived.status = RubricStatus::Archived;
        engine.rubrics().publish(archived).await.unwrap();

        let err = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap_err();
        assert!(matches!(err, VivaError::Conflict(_)));
        let disabled = AssignmentConfig { enabled: false, ..AssignmentConfig::default_for(DEMO_ASSIGNMENT_ID) };
        let err = engine.start_session_with(disabled, "alice").await.unwrap_err();
        assert!(matches!(err, VivaError::Conflict(_)));

        // No live attempt: the missing rubric is what gets reported.
        let err = engine.start_session(DEMO_ASSIGNMENT_ID, "bob").await.unwrap_err();
        assert!(matches!(err, VivaError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_precision_rule_waits_for_min_questions() {
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 10, min_questions: 2, precision_threshold: 100.0, ..EngineConfig::default() };
        let (engine, _) = engine_with(config);
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let first = engine.submit_response(&s.id, &sample_answer(&q.template_id), None).await.unwrap();
        assert!(first.session.standard_error < 100.0);
        let NextStep::Question(q) = first.next else { panic!("stopped before min_questions") };

        let second = engine.submit_response(&s.id, &sample_answer(&q.template_id), None).await.unwrap();
        assert!(matches!(second.next, NextStep::Finished(_)));
        assert_eq!(second.session.termination, Some(TerminationReason::PrecisionReached));
        assert_eq!(second.session.responses.len(), 2);
    }

    #[tokio::test]
    async fn test_content_coverage_rule_stops_once_every_concept_is_asked() {
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 10, min_questions: 3, precision_threshold: 0.0, ..EngineConfig::default() };
        let (engine, _) = engine_with(config);
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let done = answer_until_finished(&engine, &s.id, q).await;
        assert_eq!(done.termination, Some(TerminationReason::ContentCovered));
        assert!(done.responses.len() >= 3 && done.responses.len() < 8);
        for concept in ["ownership", "borrowing", "errors"] {
            assert!(done.mastery.contains_key(concept), "{concept} not covered");
        }
        // The last answer is the one that reached the final uncovered concept.
        let last = &done.responses[done.responses.len() - 1].concept_id;
        assert_eq!(done.responses.iter().filter(|r| &r.concept_id == last).count(), 1);
    }

    #[tokio::test]
    async fn test_content_coverage_rule_waits_for_min_questions() {
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 10, min_questions: 8, precision_threshold: 0.0, ..EngineConfig::default() };
        let (engine, _) = engine_with(config);
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let done = answer_until_finished(&engine, &s.id, q).await;
        assert_eq!(done.termination, Some(TerminationReason::ContentCovered));
        assert_eq!(done.responses.len(), 8);
    }

    #[tokio::test]
    async fn test_max_questions_takes_precedence() {
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 2, min_questions: 2, precision_threshold: 100.0, ..EngineConfig::default() };
        let (engine, _) = engine_with(config);
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        let done = answer_until_finished(&engine, &s.id, q).await;
        assert!(done.standard_error < 100.0);
        assert_eq!(done.termination, Some(TerminationReason::MaxQuestions));

        // Single-concept rubric: one answer both covers the content and hits the cap.
        let mut config = VivaConfig::default();
        config.engine = EngineConfig { max_questions: 1, min_questions: 1, precision_threshold: 0.0, ..EngineConfig::default() };
        let (engine, _) = engine_with(config);
        let mut single = seed_rubric();
        single.id = "ownership-only".into();
        single.concepts.truncate(1);
        engine.rubrics().publish(single).await.unwrap();
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();
        let done = answer_until_finished(&engine, &s.id, q).await;
        assert_eq!(done.rubric.id, "ownership-only");
        assert_eq!(done.termination, Some(TerminationReason::MaxQuestions));
    }

    #[tokio::test]
    async fn test_reads_do_not_block_on_the_session_writer() {
        let (engine, _) = engine();
        let (s, q) = engine.start_session(DEMO_ASSIGNMENT_ID, "alice").await.unwrap();

        let handle = engine.store().get(&s.id).await.unwrap();
        {
            let _writer = handle.lock().await;
            let read = tokio::time::timeout(std::time::Duration::from_millis(200), engine.get_session(&s.id))
                .await
                .expect("read served without the session mutex")
                .unwrap();
            assert_eq!(read.turns.len(), 1);
        }

        engine.get_session(&s.id).await.unwrap();
        let out = engine.submit_response(&s.id, &sample_answer(&q.template_id), None).await.unwrap();
        assert_eq!(engine.get_session(&s.id).await.unwrap().turns.len(), out.session.turns.len());
        assert_eq!(out.session.turns.len(), 3);
    }
}
