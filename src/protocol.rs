//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Internal session state is never serialized directly; everything on the wire
//! goes through these DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessor::{ResponseAssessment, TriggeredMisconception};
use crate::domain::{
    AssignmentConfig, CompetencyLevel, ConceptBreakdown, ConceptMastery, ConversationTurn, FinalAssessment,
    SessionStatus, Speaker, TerminationReason, TriggerType, VivaSession,
};
use crate::session::{AskedQuestion, NextStep, ResponseOutcome};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartSession {
        #[serde(rename = "assignmentId")]
        assignment_id: String,
        #[serde(rename = "studentId")]
        student_id: String,
    },
    SubmitResponse {
        #[serde(rename = "sessionId")]
        session_id: String,
        transcript: String,
        #[serde(default)]
        similarity: Option<f64>,
    },
    EndSession {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        abandoned: bool,
    },
    GetSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    SessionStarted(StartSessionOut),
    ResponseResult(ResponseOut),
    Session {
        session: SessionOut,
    },
    Error {
        code: String,
        message: String,
    },
}

//
// Session views
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOut {
    pub turn_number: u32,
    pub speaker: Speaker,
    pub text: String,
    pub template_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&ConversationTurn> for TurnOut {
    fn from(t: &ConversationTurn) -> Self {
        Self {
            turn_number: t.turn_number,
            speaker: t.speaker,
            text: t.text.clone(),
            template_id: t.template_id.clone(),
            timestamp: t.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryOut {
    pub concept_id: String,
    pub mastery: f64,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub misconceptions: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

impl From<&ConceptMastery> for MasteryOut {
    fn from(m: &ConceptMastery) -> Self {
        Self {
            concept_id: m.concept_id.clone(),
            mastery: m.mastery,
            questions_answered: m.questions_answered,
            correct_answers: m.correct_answers,
            misconceptions: m.misconceptions.clone(),
            strengths: m.strengths.clone(),
            weaknesses: m.weaknesses.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownOut {
    pub concept_id: String,
    pub concept_name: String,
    pub weight: u32,
    pub mastery: f64,
    pub questions_answered: u32,
}

impl From<&ConceptBreakdown> for BreakdownOut {
    fn from(b: &ConceptBreakdown) -> Self {
        Self {
            concept_id: b.concept_id.clone(),
            concept_name: b.concept_name.clone(),
            weight: b.weight,
            mastery: b.mastery,
            questions_answered: b.questions_answered,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentOut {
    pub overall_score: f64,
    pub competency_level: CompetencyLevel,
    pub passed: bool,
    pub theta: f64,
    pub standard_error: f64,
    pub confidence: f64,
    pub breakdown: Vec<BreakdownOut>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl From<&FinalAssessment> for AssessmentOut {
    fn from(a: &FinalAssessment) -> Self {
        Self {
            overall_score: a.overall_score,
            competency_level: a.competency_level,
            passed: a.passed,
            theta: a.theta,
            standard_error: a.standard_error,
            confidence: a.confidence,
            breakdown: a.breakdown.iter().map(BreakdownOut::from).collect(),
            strengths: a.strengths.clone(),
            improvements: a.improvements.clone(),
            computed_at: a.computed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOut {
    pub reviewed: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub score_override: Option<f64>,
    pub override_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub attempt_number: u32,
    pub status: SessionStatus,
    pub rubric_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub time_spent_secs: i64,
    pub theta: f64,
    pub standard_error: f64,
    pub questions_answered: usize,
    pub overall_score: Option<f64>,
    pub competency_level: Option<CompetencyLevel>,
    pub passed: Option<bool>,
    pub flagged: bool,
    pub flag_reason: Option<String>,
    pub termination_reason: Option<TerminationReason>,
    pub end_reason: Option<String>,
    pub review: ReviewOut,
    pub turns: Vec<TurnOut>,
    pub mastery: Vec<MasteryOut>,
    pub assessment: Option<AssessmentOut>,
}

impl From<&VivaSession> for SessionOut {
    fn from(s: &VivaSession) -> Self {
        Self {
            id: s.id.clone(),
            assignment_id: s.assignment_id.clone(),
            student_id: s.student_id.clone(),
            attempt_number: s.attempt_number,
            status: s.status,
            rubric_id: s.rubric.id.clone(),
            started_at: s.started_at,
            completed_at: s.completed_at,
            last_activity_at: s.last_activity_at,
            time_spent_secs: s.time_spent_secs,
            theta: s.theta,
            standard_error: s.standard_error,
            questions_answered: s.questions_answered(),
            overall_score: s.overall_score,
            competency_level: s.competency_level,
            passed: s.passed,
            flagged: s.flagged,
            flag_reason: s.flag_reason.clone(),
            termination_reason: s.termination,
            end_reason: s.end_reason.clone(),
            review: ReviewOut {
                reviewed: s.review.reviewed,
                reviewed_by: s.review.reviewed_by.clone(),
                reviewed_at: s.review.reviewed_at,
                score_override: s.review.score_override,
                override_reason: s.review.override_reason.clone(),
            },
            turns: s.turns.iter().map(TurnOut::from).collect(),
            mastery: s.mastery.values().map(MasteryOut::from).collect(),
            assessment: s.assessment.as_ref().map(AssessmentOut::from),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionOut {
    pub session: SessionOut,
    pub question: AskedQuestion,
}

impl StartSessionOut {
    pub fn new(session: &VivaSession, question: AskedQuestion) -> Self {
        Self { session: SessionOut::from(session), question }
    }
}

/// Per-turn feedback for the student.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOut {
    pub correctness: f64,
    pub matched_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub misconceptions: Vec<TriggeredMisconception>,
}

impl From<&ResponseAssessment> for FeedbackOut {
    fn from(a: &ResponseAssessment) -> Self {
        Self {
            correctness: a.correctness,
            matched_keywords: a.matched_keywords.clone(),
            missing_keywords: a.missing_keywords.clone(),
            misconceptions: a.misconceptions.clone(),
        }
    }
}

/// Either `nextQuestion` or `assessment` is set, never both.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOut {
    pub session_id: String,
    pub status: SessionStatus,
    pub theta: f64,
    pub standard_error: f64,
    pub feedback: FeedbackOut,
    pub next_question: Option<AskedQuestion>,
    pub assessment: Option<AssessmentOut>,
}

impl From<&ResponseOutcome> for ResponseOut {
    fn from(o: &ResponseOutcome) -> Self {
        let (next_question, assessment) = match &o.next {
            NextStep::Question(q) => (Some(q.clone()), None),
            NextStep::Finished(a) => (None, Some(AssessmentOut::from(a))),
        };
        Self {
            session_id: o.session.id.clone(),
            status: o.session.status,
            theta: o.session.theta,
            standard_error: o.session.standard_error,
            feedback: FeedbackOut::from(&o.assessment),
            next_question,
            assessment,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentConfigOut {
    pub assignment_id: String,
    pub enabled: bool,
    pub trigger: TriggerType,
}

impl From<&AssignmentConfig> for AssignmentConfigOut {
    fn from(a: &AssignmentConfig) -> Self {
        Self { assignment_id: a.id.clone(), enabled: a.enabled, trigger: a.trigger }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricPublishedOut {
    pub rubric_id: String,
    pub assignment_id: String,
    pub status: crate::domain::RubricStatus,
    pub selectable_questions: usize,
}

//
// HTTP request DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionIn {
    pub assignment_id: String,
    pub student_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResponseIn {
    pub transcript: String,
    #[serde(default)]
    pub similarity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndSessionIn {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub abandoned: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewIn {
    pub reviewer_id: String,
    #[serde(default)]
    pub score_override: Option<f64>,
    #[serde(default)]
    pub override_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    pub total_students: Option<u32>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_messages_use_camel_case_fields() {
        let msg: ClientWsMessage =
            serde_json::from_str(r#"{"type":"submit_response","sessionId":"s1","transcript":"hi"}"#).unwrap();
        match msg {
            ClientWsMessage::SubmitResponse { session_id, similarity, .. } => {
                assert_eq!(session_id, "s1");
                assert_eq!(similarity, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let out = serde_json::to_value(ServerWsMessage::Error { code: "not_found".into(), message: "x".into() }).unwrap();
        assert_eq!(out["type"], "error");
        assert_eq!(out["code"], "not_found");
    }

    #[test]
    fn test_end_session_body_defaults() {
        let body: EndSessionIn = serde_json::from_str("{}").unwrap();
        assert!(!body.abandoned);
        assert!(body.reason.is_none());
    }
}
