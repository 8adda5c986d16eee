//! Loading quiz configuration (prompts + optional offline bank extension) from TOML.
//!
//! See `QuizConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QuizConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub bank: Vec<BankTopicCfg>,
}

/// Offline-bank extension entry accepted in TOML configuration.
/// Questions listed here are merged into the built-in bank under `topic`.
#[derive(Clone, Debug, Deserialize)]
pub struct BankTopicCfg {
  pub topic: String,
  #[serde(default)]
  pub questions: Vec<BankQuestionCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BankQuestionCfg {
  pub question: String,
  pub answers: Vec<String>,
  pub correct_index: usize,
}

/// Prompts used by the OpenAI client. Defaults are sensible for trivia
/// generation and tutoring. Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Quiz batch generation (strict JSON)
  pub quiz_system: String,
  pub quiz_user_template: String,
  // Streaming tutor chat
  pub tutor_system: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      quiz_system: "You are a trivia quiz generator. Respond ONLY with strict JSON.".into(),
      quiz_user_template: "Generate {count} multiple-choice questions about '{topic}' at {difficulty} difficulty. Return JSON: {\"questions\": [{\"question\": string, \"answers\": [string, string, string], \"correctIndex\": 0|1|2}]}. Exactly 3 answers per question, one correct. Keep questions short and unambiguous.".into(),
      tutor_system: "You are a friendly quiz tutor. Explain answers concisely (2-4 sentences), encourage the player, and use the provided quiz context when it helps.".into(),
    }
  }
}

/// Attempt to load `QuizConfig` from QUIZ_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_quiz_config_from_env() -> Option<QuizConfig> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<QuizConfig>(&s) {
      Ok(cfg) => {
        info!(target: "portalrun_backend", %path, "Loaded quiz config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "portalrun_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "portalrun_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
