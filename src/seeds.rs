//! Built-in rubric so the service is usable without external config.

use crate::domain::{Concept, DifficultyTier, Misconception, QuestionTemplate, Rubric, RubricStatus, Severity};

pub const DEMO_ASSIGNMENT_ID: &str = "demo-assignment";

#[allow(clippy::too_many_arguments)]
fn template(id: &str, tier: DifficultyTier, a: f64, b: f64, secs: u32, text: &str, keywords: &[&str], sample: &str) -> QuestionTemplate {
  QuestionTemplate {
    id: id.into(),
    text: text.into(),
    code_snippet: None,
    tier,
    discrimination: a,
    difficulty: b,
    expected_keywords: keywords.iter().map(|k| k.to_string()).collect(),
    sample_answer: sample.into(),
    expected_response_secs: secs,
    active: true,
  }
}

fn misconception(id: &str, severity: Severity, keywords: &[&str], correction: &str) -> Misconception {
  Misconception {
    id: id.into(),
    keywords: keywords.iter().map(|k| k.to_string()).collect(),
    correction: correction.into(),
    severity,
  }
}

/// Rust fundamentals viva bound to `demo-assignment`.
pub fn seed_rubric() -> Rubric {
  let mut own_copy = template(
    "own-3", DifficultyTier::Hard, 1.0, 1.2, 120,
    "When would you implement Copy for a type, and what does it change about moves?",
    &["copy", "bitwise|stack", "clone"],
    "Copy types are duplicated bitwise on assignment, so the original stays usable; only small stack-only types can be Copy and they must also be Clone.",
  );
  own_copy.code_snippet = Some("#[derive(Clone, Copy)]\nstruct Point { x: i32, y: i32 }".into());

  Rubric {
    id: "rust-fundamentals-v1".into(),
    assignment_id: DEMO_ASSIGNMENT_ID.into(),
    name: "Rust fundamentals".into(),
    status: RubricStatus::Active,
    competency_bands: None,
    concepts: vec![
      Concept {
        id: "ownership".into(),
        name: "Ownership".into(),
        weight: 2,
        order: 0,
        keywords: vec!["owner".into(), "move|moved".into(), "drop|dropped".into()],
        questions: vec![
          template(
            "own-1", DifficultyTier::Easy, 1.2, -1.0, 60,
            "What happens to a String when the variable that owns it goes out of scope?",
            &["dropped|freed|deallocated", "scope", "owner"],
            "The owner goes out of scope, so the String is dropped and its heap buffer is freed.",
          ),
          template(
            "own-2", DifficultyTier::Medium, 1.5, 0.0, 90,
            "After `let b = a;` where `a` is a String, why can't you use `a` anymore?",
            &["move|moved", "ownership", "invalid|invalidated"],
            "Ownership moved to b; a is invalidated so the buffer is not freed twice.",
          ),
          own_copy,
        ],
        misconceptions: vec![
          misconception(
            "gc", Severity::High, &["garbage collector", "garbage collection", "gc"],
            "Rust has no garbage collector; values are dropped deterministically when their owner goes out of scope.",
          ),
          misconception(
            "deep-copy", Severity::Medium, &["deep copy", "copies the heap"],
            "Assigning a String moves the pointer, length and capacity; the heap data is not copied.",
          ),
        ],
      },
      Concept {
        id: "borrowing".into(),
        name: "Borrowing and lifetimes".into(),
        weight: 1,
        order: 1,
        keywords: vec!["reference".into(), "borrow".into()],
        questions: vec![
          template(
            "bor-1", DifficultyTier::Easy, 1.3, -0.5, 60,
            "What is the difference between &T and &mut T?",
            &["shared|immutable", "exclusive|mutable|unique", "reference"],
            "&T is a shared, immutable reference; &mut T is an exclusive reference that allows mutation.",
          ),
          template(
            "bor-2", DifficultyTier::Medium, 1.8, 0.6, 90,
            "Why does the borrow checker reject two simultaneous mutable borrows?",
            &["data race|data races", "aliasing", "exclusive"],
            "Mutable borrows must be exclusive; aliasing plus mutation would allow data races.",
          ),
          template(
            "bor-3", DifficultyTier::Hard, 1.1, 1.8, 120,
            "Explain what a lifetime annotation like 'a tells the compiler.",
            &["lifetime|lifetimes", "outlive|outlives", "reference"],
            "It relates the lifetimes of references so the compiler can prove no reference outlives its data.",
          ),
        ],
        misconceptions: vec![misconception(
          "lifetimes-runtime", Severity::High, &["at runtime", "runtime check"],
          "Lifetimes are checked entirely at compile time and have no runtime cost.",
        )],
      },
      Concept {
        id: "errors".into(),
        name: "Error handling".into(),
        weight: 1,
        order: 2,
        keywords: vec!["result".into(), "error".into()],
        questions: vec![
          template(
            "err-1", DifficultyTier::Easy, 1.4, -0.8, 60,
            "What does the ? operator do in a function returning Result?",
            &["propagate|propagates|returns early", "err|error", "result"],
            "On Err it returns early, propagating the error to the caller; on Ok it unwraps the value inside the Result.",
          ),
          template(
            "err-2", DifficultyTier::Medium, 0.9, 0.3, 90,
            "When is it acceptable to call unwrap?",
            &["panic|panics", "tests|prototype|prototyping", "invariant"],
            "In tests or prototypes, or when an invariant guarantees the value is present; otherwise it panics.",
          ),
        ],
        misconceptions: vec![misconception(
          "exceptions", Severity::Medium, &["try catch", "exception", "exceptions"],
          "Rust has no exceptions; recoverable errors are values of type Result.",
        )],
      },
    ],
  }
}
