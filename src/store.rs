//! In-memory session persistence.
//!
//! - every session sits behind its own mutex (single writer per session)
//! - a snapshot of each session is written through on every mutation; reads,
//!   lists and dashboard queries use it and never wait on a session that is
//!   being scored
//! - the (student, assignment) index enforces one non-terminal session per pair
//!
//! Lock order: session mutex, then pair index. `create` takes only the index.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::domain::{CompetencyLevel, SessionStatus, VivaSession};
use crate::error::{VivaError, VivaResult};

pub type SessionHandle = Arc<Mutex<VivaSession>>;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
  pub id: String,
  pub assignment_id: String,
  pub student_id: String,
  pub attempt_number: u32,
  pub status: SessionStatus,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub last_activity_at: DateTime<Utc>,
  pub questions_answered: usize,
  pub theta: f64,
  pub standard_error: f64,
  pub overall_score: Option<f64>,
  pub competency_level: Option<CompetencyLevel>,
  pub passed: Option<bool>,
  pub flagged: bool,
  pub flag_reason: Option<String>,
  pub reviewed: bool,
  pub score_override: Option<f64>,
}

impl SessionSummary {
  pub fn of(s: &VivaSession) -> Self {
    Self {
      id: s.id.clone(),
      assignment_id: s.assignment_id.clone(),
      student_id: s.student_id.clone(),
      attempt_number: s.attempt_number,
      status: s.status,
      started_at: s.started_at,
      completed_at: s.completed_at,
      last_activity_at: s.last_activity_at,
      questions_answered: s.questions_answered(),
      theta: s.theta,
      standard_error: s.standard_error,
      overall_score: s.overall_score,
      competency_level: s.competency_level,
      passed: s.passed,
      flagged: s.flagged,
      flag_reason: s.flag_reason.clone(),
      reviewed: s.review.reviewed,
      score_override: s.review.score_override,
    }
  }
}

#[derive(Default)]
struct PairIndex {
  attempts: u32,
  active: Option<String>,
}

type PairKey = (String, String);

#[derive(Default)]
pub struct SessionStore {
  sessions: RwLock<HashMap<String, SessionHandle>>,
  snapshots: RwLock<HashMap<String, VivaSession>>,
  pairs: Mutex<HashMap<PairKey, PairIndex>>,
}

impl SessionStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Atomically check the single-active-session invariant, number the attempt
  /// and insert the session produced by `build`.
  pub async fn create<F>(&self, assignment_id: &str, student_id: &str, build: F) -> VivaResult<VivaSession>
  where
    F: FnOnce(u32) -> VivaResult<VivaSession>,
  {
    let key = (student_id.to_string(), assignment_id.to_string());
    let mut pairs = self.pairs.lock().await;
    let idx = pairs.entry(key).or_default();
    if let Some(active) = &idx.active {
      return Err(VivaError::Conflict(format!(
        "student {student_id} already has session {active} in progress for assignment {assignment_id}"
      )));
    }

    let session = build(idx.attempts + 1)?;
    idx.attempts += 1;
    idx.active = Some(session.id.clone());

    self.snapshots.write().await.insert(session.id.clone(), session.clone());
    self.sessions
      .write()
      .await
      .insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
    debug!(target: "viva", session = %session.id, attempt = session.attempt_number, "Session stored");
    Ok(session)
  }

  /// Id of the non-terminal session for this pair, if any. Advisory only:
  /// `create` re-checks under the same lock before inserting.
  pub async fn active_for_pair(&self, student_id: &str, assignment_id: &str) -> Option<String> {
    let key = (student_id.to_string(), assignment_id.to_string());
    self.pairs.lock().await.get(&key).and_then(|idx| idx.active.clone())
  }

  /// Last committed state of a session, without touching its mutex.
  pub async fn snapshot(&self, session_id: &str) -> VivaResult<VivaSession> {
    self.snapshots
      .read()
      .await
      .get(session_id)
      .cloned()
      .ok_or_else(|| VivaError::NotFound(format!("session {session_id}")))
  }

  pub async fn get(&self, session_id: &str) -> VivaResult<SessionHandle> {
    self.sessions
      .read()
      .await
      .get(session_id)
      .cloned()
      .ok_or_else(|| VivaError::NotFound(format!("session {session_id}")))
  }

  /// Write the snapshot through and release the pair slot once terminal.
  /// Call while still holding the session's mutex.
  pub async fn sync(&self, session: &VivaSession) {
    self.snapshots.write().await.insert(session.id.clone(), session.clone());
    if session.status.is_terminal() {
      let key = (session.student_id.clone(), session.assignment_id.clone());
      let mut pairs = self.pairs.lock().await;
      if let Some(idx) = pairs.get_mut(&key) {
        if idx.active.as_deref() == Some(session.id.as_str()) {
          idx.active = None;
        }
      }
    }
  }

  pub async fn summaries_for(&self, assignment_id: &str) -> Vec<SessionSummary> {
    self.snapshots
      .read()
      .await
      .values()
      .filter(|s| s.assignment_id == assignment_id)
      .map(SessionSummary::of)
      .collect()
  }

  /// In-progress sessions with no activity since `cutoff`.
  pub async fn inactive_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
    self.snapshots
      .read()
      .await
      .values()
      .filter(|s| s.status == SessionStatus::InProgress && s.last_activity_at < cutoff)
      .map(|s| s.id.clone())
      .collect()
  }
}
