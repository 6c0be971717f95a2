//! Read models derived from session summaries: paginated session lists and the
//! per-assignment dashboard. Nothing here is persisted; in-flight sessions are
//! seen as of their last committed turn.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AssignmentConfig, Rubric, SessionStatus, TriggerType};
use crate::error::{VivaError, VivaResult};
use crate::session::VivaEngine;
use crate::store::SessionSummary;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;
const RECENT_ACTIVITY: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionListQuery {
  pub status: Option<String>,
  pub page: Option<usize>,
  pub size: Option<usize>,
  /// `field[,asc|desc]`, field ∈ startedAt | attemptNumber | overallScore.
  pub sort: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
  pub items: Vec<T>,
  pub page: usize,
  pub size: usize,
  pub total_elements: usize,
  pub total_pages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortField {
  StartedAt,
  AttemptNumber,
  OverallScore,
}

fn parse_sort(raw: Option<&str>) -> VivaResult<(SortField, bool)> {
  let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
    return Ok((SortField::StartedAt, true));
  };
  let mut parts = raw.split(',').map(str::trim);
  let field = match parts.next().unwrap_or_default() {
    "startedAt" => SortField::StartedAt,
    "attemptNumber" => SortField::AttemptNumber,
    "overallScore" => SortField::OverallScore,
    other => return Err(VivaError::Validation(format!("unsupported sort field '{other}'"))),
  };
  let descending = match parts.next().map(|d| d.to_ascii_lowercase()) {
    None => false,
    Some(d) if d == "asc" => false,
    Some(d) if d == "desc" => true,
    Some(d) => return Err(VivaError::Validation(format!("unsupported sort direction '{d}'"))),
  };
  Ok((field, descending))
}

pub fn page_sessions(mut items: Vec<SessionSummary>, q: &SessionListQuery) -> VivaResult<Page<SessionSummary>> {
  if let Some(raw) = q.status.as_deref().filter(|s| !s.is_empty()) {
    let status = SessionStatus::parse(raw).ok_or_else(|| VivaError::Validation(format!("unknown status '{raw}'")))?;
    items.retain(|s| s.status == status);
  }

  let (field, descending) = parse_sort(q.sort.as_deref())?;
  items.sort_by(|a, b| {
    let ord = match field {
      SortField::StartedAt => a.started_at.cmp(&b.started_at),
      SortField::AttemptNumber => a.attempt_number.cmp(&b.attempt_number),
      SortField::OverallScore => a
        .overall_score
        .unwrap_or(-1.0)
        .partial_cmp(&b.overall_score.unwrap_or(-1.0))
        .unwrap_or(Ordering::Equal),
    };
    let ord = if descending { ord.reverse() } else { ord };
    ord.then_with(|| a.id.cmp(&b.id))
  });

  let size = q.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
  let page = q.page.unwrap_or(0);
  let total_elements = items.len();
  let total_pages = total_elements.div_ceil(size);
  let items = items.into_iter().skip(page.saturating_mul(size)).take(size).collect();
  Ok(Page { items, page, size, total_elements, total_pages })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOverview {
  pub total_students: Option<u32>,
  pub not_started: Option<u32>,
  pub in_progress: usize,
  pub completed: usize,
  pub submitted: usize,
  pub failed: usize,
  pub abandoned: usize,
  pub total_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickStats {
  pub students_attempted: usize,
  pub finished_sessions: usize,
  /// Average and pass rate both use the effective score: the instructor
  /// override where one exists, the computed score otherwise. An override
  /// passes when it meets the configured passing percentage.
  pub average_score: Option<f64>,
  pub pass_rate: Option<f64>,
  pub average_theta: Option<f64>,
  pub flagged: usize,
  pub pending_review: usize,
  pub participation_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
  pub enabled: bool,
  pub trigger: TriggerType,
  pub active_rubric_id: Option<String>,
  pub active_rubric_name: Option<String>,
  pub concept_count: usize,
  pub question_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
  pub session_id: String,
  pub student_id: String,
  pub attempt_number: u32,
  pub status: SessionStatus,
  pub at: DateTime<Utc>,
  pub overall_score: Option<f64>,
  pub flagged: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
  pub assignment_id: String,
  pub status_overview: StatusOverview,
  pub quick_stats: QuickStats,
  pub configuration: ConfigurationStatus,
  pub recent_activity: Vec<ActivityItem>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
  let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
  if n == 0 { None } else { Some(sum / n as f64) }
}

fn effective_score(s: &SessionSummary) -> Option<f64> {
  s.score_override.or(s.overall_score)
}

fn effective_pass(s: &SessionSummary, passing_percentage: f64) -> Option<bool> {
  s.score_override.map(|o| o * 100.0 >= passing_percentage).or(s.passed)
}

pub fn build_dashboard(
  assignment: &AssignmentConfig,
  rubric: Option<&Rubric>,
  sessions: &[SessionSummary],
  total_students: Option<u32>,
  passing_percentage: f64,
) -> Dashboard {
  let count = |status: SessionStatus| sessions.iter().filter(|s| s.status == status).count();
  let students: HashSet<&str> = sessions.iter().map(|s| s.student_id.as_str()).collect();
  let finished: Vec<&SessionSummary> = sessions.iter().filter(|s| s.status.is_terminal()).collect();

  let graded: Vec<bool> = finished.iter().filter_map(|s| effective_pass(s, passing_percentage)).collect();
  let pass_rate = if graded.is_empty() {
    None
  } else {
    Some(graded.iter().filter(|p| **p).count() as f64 / graded.len() as f64)
  };

  let participation_rate = total_students
    .filter(|t| *t > 0)
    .map(|t| (students.len() as f64 / t as f64).min(1.0));

  let mut recent: Vec<&SessionSummary> = sessions.iter().collect();
  recent.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at).then_with(|| a.id.cmp(&b.id)));

  Dashboard {
    assignment_id: assignment.id.clone(),
    status_overview: StatusOverview {
      total_students,
      not_started: total_students.map(|t| t.saturating_sub(students.len() as u32)),
      in_progress: count(SessionStatus::InProgress),
      completed: count(SessionStatus::Completed),
      submitted: count(SessionStatus::Submitted),
      failed: count(SessionStatus::Failed),
      abandoned: count(SessionStatus::Abandoned),
      total_sessions: sessions.len(),
    },
    quick_stats: QuickStats {
      students_attempted: students.len(),
      finished_sessions: finished.len(),
      average_score: mean(finished.iter().filter_map(|s| effective_score(s))),
      pass_rate,
      average_theta: mean(finished.iter().map(|s| s.theta)),
      flagged: sessions.iter().filter(|s| s.flagged).count(),
      pending_review: sessions.iter().filter(|s| s.flagged && !s.reviewed).count(),
      participation_rate,
    },
    configuration: ConfigurationStatus {
      enabled: assignment.enabled,
      trigger: assignment.trigger,
      active_rubric_id: rubric.map(|r| r.id.clone()),
      active_rubric_name: rubric.map(|r| r.name.clone()),
      concept_count: rubric.map(|r| r.concepts.len()).unwrap_or(0),
      question_count: rubric.map(|r| r.selectable_question_count()).unwrap_or(0),
    },
    recent_activity: recent
      .into_iter()
      .take(RECENT_ACTIVITY)
      .map(|s| ActivityItem {
        session_id: s.id.clone(),
        student_id: s.student_id.clone(),
        attempt_number: s.attempt_number,
        status: s.status,
        at: s.last_activity_at,
        overall_score: s.overall_score,
        flagged: s.flagged,
      })
      .collect(),
  }
}

impl VivaEngine {
  pub async fn list_sessions(&self, assignment_id: &str, q: &SessionListQuery) -> VivaResult<Page<SessionSummary>> {
    let items = self.store().summaries_for(assignment_id).await;
    page_sessions(items, q)
  }

  pub async fn dashboard(&self, assignment_id: &str, total_students: Option<u32>) -> Dashboard {
    let assignment = self.assignment_config(assignment_id);
    let rubric = self.rubrics().active_for(assignment_id).await;
    let sessions = self.store().summaries_for(assignment_id).await;
    let passing = self.config().outcome.passing_percentage;
    build_dashboard(&assignment, rubric.as_deref(), &sessions, total_students, passing)
  }
}
