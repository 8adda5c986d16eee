//! Application state: question source, history store, OpenAI client, prompts.
//!
//! Everything here is constructed exactly once in `main` and injected through
//! the router; components are plain values so tests can substitute their own.

use std::sync::atomic::AtomicBool;

use tracing::{info, instrument};

use crate::config::{load_quiz_config_from_env, Prompts};
use crate::openai::OpenAI;
use crate::question_source::QuestionSource;
use crate::store::HistoryStore;

pub struct AppState {
  pub question_source: QuestionSource,
  pub openai: Option<OpenAI>,
  pub prompts: Prompts,
  pub history: HistoryStore,
  /// One in-flight tutor exchange at a time; cleared when its stream ends.
  pub chat_busy: AtomicBool,
}

impl AppState {
  /// Build state from env: load config, init OpenAI, wire the question source.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_quiz_config_from_env().unwrap_or_default();
    let prompts = cfg.prompts.clone();

    let openai = OpenAI::from_env();
    match &openai {
      Some(oa) => {
        info!(target: "portalrun_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
      }
      None => {
        info!(target: "portalrun_backend", "OpenAI disabled (no OPENAI_API_KEY). Serving offline bank only.");
      }
    }
    if !cfg.bank.is_empty() {
      info!(target: "quiz", topics = cfg.bank.len(), "Offline bank extended from config");
    }

    let question_source = QuestionSource::new(openai.clone(), prompts.clone(), cfg.bank);

    Self {
      question_source,
      openai,
      prompts,
      history: HistoryStore::from_env(),
      chat_busy: AtomicBool::new(false),
    }
  }
}
