//! Adaptive item selection: maximum Fisher information at the current θ,
//! with content balancing and a deterministic id fallback for ties.

use std::collections::{HashMap, HashSet};

use crate::domain::{Concept, QuestionTemplate, Rubric};
use crate::irt::information;

/// Information values closer than this are treated as a tie.
const INFO_TIE_EPSILON: f64 = 1e-12;

#[derive(Clone, Copy, Debug)]
pub struct Selection<'a> {
  pub concept: &'a Concept,
  pub template: &'a QuestionTemplate,
  pub information: f64,
}

/// Pick the next template for `theta`, skipping inactive, non-positive `a`
/// and already-asked templates. Returns None when the pool is exhausted.
pub fn select_next<'a>(rubric: &'a Rubric, theta: f64, asked: &HashSet<&str>) -> Option<Selection<'a>> {
  let mut asked_per_concept: HashMap<&str, usize> = HashMap::new();
  for concept in &rubric.concepts {
    let n = concept.questions.iter().filter(|q| asked.contains(q.id.as_str())).count();
    asked_per_concept.insert(concept.id.as_str(), n);
  }

  let mut best: Option<(Selection<'a>, usize)> = None;
  for concept in &rubric.concepts {
    let concept_load = asked_per_concept.get(concept.id.as_str()).copied().unwrap_or(0);
    for template in &concept.questions {
      if !template.is_selectable() || asked.contains(template.id.as_str()) {
        continue;
      }
      let info = information(template.discrimination, template.difficulty, theta);
      let candidate = Selection { concept, template, information: info };

      let replace = match &best {
        None => true,
        Some((cur, cur_load)) => {
          if info > cur.information + INFO_TIE_EPSILON {
            true
          } else if info < cur.information - INFO_TIE_EPSILON {
            false
          } else {
            (concept_load, template.id.as_str()) < (*cur_load, cur.template.id.as_str())
          }
        }
      };
      if replace {
        best = Some((candidate, concept_load));
      }
    }
  }
  best.map(|(s, _)| s)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{DifficultyTier, RubricStatus};

  fn q(id: &str, a: f64, b: f64) -> QuestionTemplate {
    QuestionTemplate {
      id: id.into(),
      text: format!("question {id}"),
      code_snippet: None,
      tier: DifficultyTier::Medium,
      discrimination: a,
      difficulty: b,
      expected_keywords: vec![],
      sample_answer: String::new(),
      expected_response_secs: 60,
      active: true,
    }
  }

  fn concept(id: &str, questions: Vec<QuestionTemplate>) -> Concept {
    Concept {
      id: id.into(),
      name: id.to_uppercase(),
      weight: 1,
      order: 0,
      keywords: vec![],
      questions,
      misconceptions: vec![],
    }
  }

  fn rubric(concepts: Vec<Concept>) -> Rubric {
    Rubric {
      id: "r".into(),
      assignment_id: "a".into(),
      name: "R".into(),
      status: RubricStatus::Active,
      competency_bands: None,
      concepts,
    }
  }

  #[test]
  fn test_picks_most_informative_at_theta() {
    let r = rubric(vec![concept("c1", vec![q("easy", 1.0, -2.0), q("mid", 1.0, 0.1), q("hard", 1.0, 2.0)])]);
    let s = select_next(&r, 0.0, &HashSet::new()).unwrap();
    assert_eq!(s.template.id, "mid");
    let s = select_next(&r, 2.0, &HashSet::new()).unwrap();
    assert_eq!(s.template.id, "hard");
  }

  #[test]
  fn test_excludes_asked_and_unselectable() {
    let mut inactive = q("inactive", 2.5, 0.0);
    inactive.active = false;
    let r = rubric(vec![concept("c1", vec![q("zero_a", 0.0, 0.0), inactive, q("ok", 0.5, 0.0), q("asked", 2.0, 0.0)])]);
    let asked: HashSet<&str> = ["asked"].into_iter().collect();
    let s = select_next(&r, 0.0, &asked).unwrap();
    assert_eq!(s.template.id, "ok");

    let asked: HashSet<&str> = ["asked", "ok"].into_iter().collect();
    assert!(select_next(&r, 0.0, &asked).is_none());
  }

  #[test]
  fn test_tie_prefers_less_covered_concept_then_id() {
    let r = rubric(vec![
      concept("c1", vec![q("c1-a", 1.0, 0.0), q("c1-b", 1.0, 0.0)]),
      concept("c2", vec![q("c2-b", 1.0, 0.0), q("c2-a", 1.0, 0.0)]),
    ]);
    // Nothing asked yet: both concepts tie on load, lowest id wins.
    let s = select_next(&r, 0.0, &HashSet::new()).unwrap();
    assert_eq!(s.template.id, "c1-a");

    // c1 already has a question: content balancing moves to c2.
    let asked: HashSet<&str> = ["c1-a"].into_iter().collect();
    let s = select_next(&r, 0.0, &asked).unwrap();
    assert_eq!(s.concept.id, "c2");
    assert_eq!(s.template.id, "c2-a");
  }
}
