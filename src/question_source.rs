//! Question delivery: generated batches with an unconditional offline fallback.
//!
//! The networked path asks the model for a strict-JSON batch and validates it
//! as a whole (one malformed item voids the batch). Any failure, timeout, or
//! validation miss falls back to the offline bank; the caller only sees an
//! error when even the bank comes up empty.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, instrument, warn};

use crate::bank::offline_questions;
use crate::config::{BankTopicCfg, Prompts};
use crate::domain::{Difficulty, Question};
use crate::openai::{GenQuestion, OpenAI};

/// Where a served batch came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuestionOrigin {
  Generated,
  OfflineBank,
  /// The bank had no entries for the requested topic; this one was used.
  OfflineBankSubstituted(String),
}

impl QuestionOrigin {
  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionOrigin::Generated => "generated",
      QuestionOrigin::OfflineBank => "offline_bank",
      QuestionOrigin::OfflineBankSubstituted(_) => "offline_bank_substituted",
    }
  }
}

/// Fetches and validates question batches. Explicitly constructed and
/// injected; no module-level singletons.
pub struct QuestionSource {
  openai: Option<OpenAI>,
  prompts: Prompts,
  extra_bank: Vec<BankTopicCfg>,
}

impl QuestionSource {
  pub fn new(openai: Option<OpenAI>, prompts: Prompts, extra_bank: Vec<BankTopicCfg>) -> Self {
    Self { openai, prompts, extra_bank }
  }

  /// Fetch `count` questions for topic+difficulty. Infallible short of an
  /// empty bank, which is surfaced as Err for the caller to report.
  #[instrument(level = "info", skip(self, topic), fields(%difficulty, count))]
  pub async fn fetch(
    &self,
    topic: &str,
    difficulty: Difficulty,
    count: usize,
  ) -> Result<(Vec<Question>, QuestionOrigin), String> {
    if let Some(oa) = &self.openai {
      match oa.generate_quiz(&self.prompts, topic, difficulty, count).await {
        Ok(raw) => match validate_batch(raw, count) {
          Ok(questions) => {
            info!(target: "quiz", served = questions.len(), origin = "generated", "Quiz batch served");
            return Ok((questions, QuestionOrigin::Generated));
          }
          Err(e) => {
            warn!(target: "quiz", error = %e, "Generated batch failed validation; falling back to offline bank");
          }
        },
        Err(e) => {
          error!(target: "quiz", error = %e, "Quiz generation failed; falling back to offline bank");
        }
      }
    } else {
      info!(target: "quiz", "OpenAI disabled; using offline bank");
    }

    self.offline(topic, count)
  }

  fn offline(&self, topic: &str, count: usize) -> Result<(Vec<Question>, QuestionOrigin), String> {
    let mut rng = StdRng::from_entropy();
    let lookup = offline_questions(topic, count, &self.extra_bank, &mut rng)
      .ok_or_else(|| "offline question bank is empty".to_string())?;
    if lookup.questions.is_empty() {
      return Err(format!("offline bank has no questions for '{}'", lookup.topic));
    }

    let origin = if lookup.substituted {
      QuestionOrigin::OfflineBankSubstituted(lookup.topic.clone())
    } else {
      QuestionOrigin::OfflineBank
    };
    info!(target: "quiz", served = lookup.questions.len(), origin = origin.as_str(), topic = %lookup.topic, "Quiz batch served");
    Ok((lookup.questions, origin))
  }
}

/// Whole-batch validation: every item must have exactly 3 non-empty answers,
/// a correct index in 0..=2, and non-empty text. Any bad item voids the batch.
pub fn validate_batch(raw: Vec<GenQuestion>, requested: usize) -> Result<Vec<Question>, String> {
  if raw.is_empty() {
    return Err("batch is empty".into());
  }
  let mut out = Vec::with_capacity(raw.len());
  for (i, q) in raw.into_iter().enumerate() {
    if q.question.trim().is_empty() {
      return Err(format!("item {}: empty question text", i));
    }
    if q.answers.len() != 3 {
      return Err(format!("item {}: expected 3 answers, got {}", i, q.answers.len()));
    }
    if q.answers.iter().any(|a| a.trim().is_empty()) {
      return Err(format!("item {}: empty answer option", i));
    }
    if !(0..=2).contains(&q.correct_index) {
      return Err(format!("item {}: correct index {} out of range", i, q.correct_index));
    }
    let answers = [q.answers[0].clone(), q.answers[1].clone(), q.answers[2].clone()];
    out.push(Question { text: q.question, answers, correct: q.correct_index as usize });
  }
  out.truncate(requested);
  Ok(out)
}
