//! The gameplay state machine: question delivery, lane choice, crossing
//! resolution, scoring, and session end.
//!
//! Phases: menu -> loading -> playing <-> paused -> results -> (loading|menu).
//! The loop is pure and tick-driven; it never touches the network or disk.
//! Question fetching happens outside (the caller holds the loop in `Loading`
//! and feeds `questions_ready` / `load_failed`), and every mutating operation
//! returns the events it produced, one per state transition, in order.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::{Difficulty, PersistedGameRecord, Question};
use crate::portal::PortalField;
use crate::score::ScoreTracker;

/// Seconds the revealed portals linger before the next question spawns.
pub const SETTLE_DELAY: f32 = 1.5;
/// How far a set must fall behind the player before a crossing fires.
pub const CROSSING_EPSILON: f32 = 0.05;
/// Longitudinal distance ahead of the player at which a set spawns.
pub const PORTAL_SPACING: f32 = 60.0;

pub const DEFAULT_SPEED: f32 = 12.0;
pub const MIN_SPEED: f32 = 6.0;
pub const MAX_SPEED: f32 = 30.0;

pub const LANE_COUNT: usize = 3;
pub const CENTER_LANE: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  Menu,
  Loading,
  Playing,
  Paused,
  Results,
}

#[derive(Clone, Copy, Debug)]
pub enum LaneDirection {
  Left,
  Right,
}

/// Parameters of a start request, kept around so "play again" can restart
/// with the identical topic/difficulty/count.
#[derive(Clone, Debug)]
pub struct StartParams {
  pub topic: String,
  pub difficulty: Difficulty,
  pub count: usize,
}

/// One event per mutating transition, delivered synchronously and never
/// coalesced. The presentation layer subscribes to these.
#[derive(Clone, Debug)]
pub enum GameEvent {
  LoadingStarted { topic: String, difficulty: Difficulty, count: usize },
  LoadFailed { reason: String },
  QuestionShown { index: usize, total: usize, text: String, answers: [String; 3] },
  AnswerResolved {
    correct: bool,
    chosen: String,
    correct_answer: String,
    score: u32,
    answered: u32,
  },
  SessionComplete { record: PersistedGameRecord },
  Paused,
  Resumed,
  ReturnedToMenu,
}

/// The core finite-state controller. One instance per player session.
pub struct GameLoop {
  phase: Phase,
  tracker: ScoreTracker,
  field: PortalField,
  player_lane: usize,
  speed: f32,
  /// Freeze flag: set at crossing resolution, cleared when the settle delay
  /// elapses. While set, no further crossing can score.
  waiting_for_next_question: bool,
  settle_remaining: f32,
  params: Option<StartParams>,
  rng: StdRng,
}

impl GameLoop {
  pub fn new() -> Self {
    Self::with_rng(StdRng::from_entropy())
  }

  pub fn with_rng(rng: StdRng) -> Self {
    Self {
      phase: Phase::Menu,
      tracker: ScoreTracker::new(),
      field: PortalField::new(),
      player_lane: CENTER_LANE,
      speed: DEFAULT_SPEED,
      waiting_for_next_question: false,
      settle_remaining: 0.0,
      params: None,
      rng,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn player_lane(&self) -> usize {
    self.player_lane
  }

  pub fn speed(&self) -> f32 {
    self.speed
  }

  pub fn field(&self) -> &PortalField {
    &self.field
  }

  pub fn tracker(&self) -> &ScoreTracker {
    &self.tracker
  }

  pub fn waiting_for_next_question(&self) -> bool {
    self.waiting_for_next_question
  }

  /// Begin fetching a question batch. Valid from the menu or results screen.
  #[instrument(level = "info", skip(self, topic), fields(%difficulty, count))]
  pub fn start_loading(&mut self, topic: String, difficulty: Difficulty, count: usize) -> Vec<GameEvent> {
    if !matches!(self.phase, Phase::Menu | Phase::Results) {
      return vec![];
    }
    self.tracker.abandon();
    self.field.clear();
    self.phase = Phase::Loading;
    self.params = Some(StartParams { topic: topic.clone(), difficulty, count });
    vec![GameEvent::LoadingStarted { topic, difficulty, count }]
  }

  /// The fetched batch arrived: open a fresh session and spawn the first set.
  #[instrument(level = "info", skip(self, questions), fields(count = questions.len()))]
  pub fn questions_ready(&mut self, questions: Vec<Question>) -> Vec<GameEvent> {
    if self.phase != Phase::Loading {
      return vec![];
    }
    let Some(params) = self.params.clone() else {
      return self.load_failed("no start parameters".into());
    };
    if questions.is_empty() {
      return self.load_failed("no questions available".into());
    }

    self.tracker.start_session(params.topic, params.difficulty, questions);
    self.player_lane = CENTER_LANE;
    self.field.clear();
    self.waiting_for_next_question = false;
    self.settle_remaining = 0.0;
    self.phase = Phase::Playing;

    let mut events = Vec::new();
    if let Some(ev) = self.spawn_current_question() {
      events.push(ev);
    }
    events
  }

  /// The fetch failed with nothing to fall back on: surface and return to menu.
  pub fn load_failed(&mut self, reason: String) -> Vec<GameEvent> {
    if self.phase != Phase::Loading {
      return vec![];
    }
    self.tracker.abandon();
    self.phase = Phase::Menu;
    vec![GameEvent::LoadFailed { reason }]
  }

  /// Advance the world by one frame. Only the playing phase mutates state;
  /// paused (and every other phase) leaves portal positions untouched.
  pub fn tick(&mut self, dt: f32) -> Vec<GameEvent> {
    if self.phase != Phase::Playing || dt <= 0.0 {
      return vec![];
    }

    self.field.advance(self.speed * dt);

    if self.waiting_for_next_question {
      self.settle_remaining -= dt;
      if self.settle_remaining <= 0.0 {
        return self.advance_question();
      }
      return vec![];
    }

    let crossed = self
      .field
      .nearest_unrevealed()
      .map(|s| s.position() < -CROSSING_EPSILON)
      .unwrap_or(false);
    if crossed {
      return self.resolve_crossing();
    }
    vec![]
  }

  /// Lane changes commit immediately; a crossing always resolves against the
  /// lane the player has committed to.
  pub fn change_lane(&mut self, dir: LaneDirection) {
    if self.phase != Phase::Playing {
      return;
    }
    self.player_lane = match dir {
      LaneDirection::Left => self.player_lane.saturating_sub(1),
      LaneDirection::Right => (self.player_lane + 1).min(LANE_COUNT - 1),
    };
  }

  /// Single toggle operation: pausing and resuming are symmetric.
  pub fn pause_toggle(&mut self) -> Vec<GameEvent> {
    match self.phase {
      Phase::Playing => {
        self.phase = Phase::Paused;
        vec![GameEvent::Paused]
      }
      Phase::Paused => {
        self.phase = Phase::Playing;
        vec![GameEvent::Resumed]
      }
      _ => vec![],
    }
  }

  pub fn set_speed(&mut self, speed: f32) {
    self.speed = speed.clamp(MIN_SPEED, MAX_SPEED);
  }

  /// Restart from the results screen with the identical parameters.
  pub fn play_again(&mut self) -> Vec<GameEvent> {
    if self.phase != Phase::Results {
      return vec![];
    }
    let Some(p) = self.params.clone() else {
      return vec![];
    };
    self.phase = Phase::Menu; // re-enter through the normal start path
    self.start_loading(p.topic, p.difficulty, p.count)
  }

  /// Discard everything and return to the menu. Valid from any phase.
  pub fn back_to_menu(&mut self) -> Vec<GameEvent> {
    self.tracker.abandon();
    self.field.clear();
    self.waiting_for_next_question = false;
    self.settle_remaining = 0.0;
    self.phase = Phase::Menu;
    vec![GameEvent::ReturnedToMenu]
  }

  fn spawn_current_question(&mut self) -> Option<GameEvent> {
    let (index, total, question) = {
      let s = self.tracker.session()?;
      (s.current_index, s.questions.len(), s.current_question()?.clone())
    };
    let answers = self
      .field
      .spawn_set(&question.answers, question.correct, PORTAL_SPACING, &mut self.rng);
    debug!(target: "game", index, total, "Spawned portal set");
    Some(GameEvent::QuestionShown { index, total, text: question.text, answers })
  }

  fn resolve_crossing(&mut self) -> Vec<GameEvent> {
    // Freeze first so a re-entrant crossing can never double-score.
    self.waiting_for_next_question = true;
    self.settle_remaining = SETTLE_DELAY;

    let question_text = self
      .tracker
      .session()
      .and_then(|s| s.current_question())
      .map(|q| q.text.clone())
      .unwrap_or_default();

    let lane = self.player_lane;
    let Some(set) = self.field.nearest_unrevealed_mut() else {
      return vec![];
    };
    let correct_answer = set.correct_portal().answer.clone();
    // Defect path: a set without a portal in the player's lane counts as
    // an incorrect answer with a recorded choice of "None".
    let (correct, chosen) = match set.portal_in_lane(lane) {
      Some(p) => (p.is_correct, p.answer.clone()),
      None => (false, "None".to_string()),
    };
    set.reveal();

    if correct {
      self.tracker.record_correct();
    } else {
      self.tracker.record_wrong(&question_text, &chosen, &correct_answer);
    }

    let (score, answered) = self
      .tracker
      .session()
      .map(|s| (s.score, s.answered))
      .unwrap_or((0, 0));
    info!(target: "game", %correct, lane, score, answered, "Crossing resolved");

    vec![GameEvent::AnswerResolved { correct, chosen, correct_answer, score, answered }]
  }

  fn advance_question(&mut self) -> Vec<GameEvent> {
    self.waiting_for_next_question = false;
    self.settle_remaining = 0.0;
    self.field.clear_revealed();

    if let Some(s) = self.tracker.session_mut() {
      s.current_index += 1;
    }

    let finished = self.tracker.session().map(|s| s.is_finished()).unwrap_or(true);
    if finished {
      self.phase = Phase::Results;
      match self.tracker.finish() {
        Some(record) => vec![GameEvent::SessionComplete { record }],
        None => vec![],
      }
    } else {
      match self.spawn_current_question() {
        Some(ev) => vec![ev],
        None => vec![],
      }
    }
  }
}

impl Default for GameLoop {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn questions(n: usize) -> Vec<Question> {
    (0..n)
      .map(|i| Question::new(format!("q{}", i), ["right", "wrong-a", "wrong-b"], 0))
      .collect()
  }

  fn started_loop(n: usize) -> GameLoop {
    let mut gl = GameLoop::with_rng(StdRng::seed_from_u64(12345));
    gl.start_loading("science".into(), Difficulty::Easy, n);
    let events = gl.questions_ready(questions(n));
    assert!(matches!(events[0], GameEvent::QuestionShown { .. }));
    assert_eq!(gl.phase(), Phase::Playing);
    gl
  }

  /// Steer into the correct lane (or deliberately away from it), then tick
  /// until the crossing resolves. Returns all events seen on the way.
  fn play_one_question(gl: &mut GameLoop, answer_correctly: bool) -> Vec<GameEvent> {
    let correct_lane = gl.field().nearest_unrevealed().unwrap().correct_portal().lane;
    let target = if answer_correctly {
      correct_lane
    } else {
      (correct_lane + 1) % LANE_COUNT
    };
    while gl.player_lane() < target {
      gl.change_lane(LaneDirection::Right);
    }
    while gl.player_lane() > target {
      gl.change_lane(LaneDirection::Left);
    }

    let mut events = Vec::new();
    for _ in 0..200 {
      events.extend(gl.tick(0.1));
      if events
        .iter()
        .any(|e| matches!(e, GameEvent::AnswerResolved { .. }))
      {
        return events;
      }
    }
    panic!("crossing never resolved");
  }

  /// Tick through the settle delay until the next question (or results).
  fn settle(gl: &mut GameLoop) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for _ in 0..200 {
      events.extend(gl.tick(0.1));
      if !gl.waiting_for_next_question() {
        return events;
      }
    }
    panic!("settle never completed");
  }

  #[test]
  fn start_requires_menu_or_results() {
    let mut gl = started_loop(2);
    assert!(gl.start_loading("x".into(), Difficulty::Hard, 5).is_empty());
    assert_eq!(gl.phase(), Phase::Playing);
  }

  #[test]
  fn load_failure_returns_to_menu() {
    let mut gl = GameLoop::with_rng(StdRng::seed_from_u64(1));
    gl.start_loading("science".into(), Difficulty::Easy, 5);
    let events = gl.load_failed("backend down".into());
    assert!(matches!(&events[0], GameEvent::LoadFailed { reason } if reason == "backend down"));
    assert_eq!(gl.phase(), Phase::Menu);
  }

  #[test]
  fn empty_batch_counts_as_load_failure() {
    let mut gl = GameLoop::with_rng(StdRng::seed_from_u64(1));
    gl.start_loading("science".into(), Difficulty::Easy, 5);
    let events = gl.questions_ready(vec![]);
    assert!(matches!(events[0], GameEvent::LoadFailed { .. }));
    assert_eq!(gl.phase(), Phase::Menu);
  }

  #[test]
  fn lane_changes_clamp_to_track_edges() {
    let mut gl = started_loop(1);
    assert_eq!(gl.player_lane(), CENTER_LANE);
    gl.change_lane(LaneDirection::Left);
    gl.change_lane(LaneDirection::Left);
    assert_eq!(gl.player_lane(), 0);
    for _ in 0..5 {
      gl.change_lane(LaneDirection::Right);
    }
    assert_eq!(gl.player_lane(), LANE_COUNT - 1);
  }

  #[test]
  fn correct_lane_scores_and_wrong_lane_logs() {
    // Scenario B: correct, correct, wrong over a 3-question session.
    let mut gl = started_loop(3);

    for expected_correct in [true, true, false] {
      let events = play_one_question(&mut gl, expected_correct);
      let resolved = events
        .iter()
        .find_map(|e| match e {
          GameEvent::AnswerResolved { correct, .. } => Some(*correct),
          _ => None,
        })
        .unwrap();
      assert_eq!(resolved, expected_correct);
      settle(&mut gl);
    }

    assert_eq!(gl.phase(), Phase::Results);
  }

  #[test]
  fn session_end_emits_exactly_one_complete_record() {
    let mut gl = started_loop(3);
    let mut complete_records = Vec::new();
    for answer in [true, true, false] {
      play_one_question(&mut gl, answer);
      for e in settle(&mut gl) {
        if let GameEvent::SessionComplete { record } = e {
          complete_records.push(record);
        }
      }
    }
    assert_eq!(complete_records.len(), 1);
    let record = &complete_records[0];
    assert_eq!(record.score, 2);
    assert_eq!(record.total_questions, 3);
    assert_eq!(record.percentage, 67);
    assert_eq!(record.wrong_answers.len(), 1);
    assert_eq!(record.wrong_answers[0].correct, "right");

    // Further ticks in results never produce another record.
    for _ in 0..50 {
      assert!(gl.tick(0.1).is_empty());
    }
  }

  #[test]
  fn frozen_set_cannot_double_score() {
    // Scenario D: after resolution, keep ticking inside the settle window;
    // the already-resolved set must not alter score or the wrong list.
    let mut gl = started_loop(2);
    play_one_question(&mut gl, true);
    let score_after = gl.tracker().session().unwrap().score;
    let answered_after = gl.tracker().session().unwrap().answered;

    let mut extra = gl.tick(0.2);
    extra.extend(gl.tick(0.2));
    assert!(extra
      .iter()
      .all(|e| !matches!(e, GameEvent::AnswerResolved { .. })));
    let s = gl.tracker().session().unwrap();
    assert_eq!(s.score, score_after);
    assert_eq!(s.answered, answered_after);
  }

  #[test]
  fn pause_freezes_portal_travel() {
    // Scenario C: positions unchanged across ticks while paused.
    let mut gl = started_loop(1);
    gl.tick(0.5);
    let before = gl.field().nearest_unrevealed().unwrap().position();

    let events = gl.pause_toggle();
    assert!(matches!(events[0], GameEvent::Paused));
    for _ in 0..20 {
      assert!(gl.tick(0.5).is_empty());
    }
    assert_eq!(gl.field().nearest_unrevealed().unwrap().position(), before);

    let events = gl.pause_toggle();
    assert!(matches!(events[0], GameEvent::Resumed));
    gl.tick(0.5);
    assert!(gl.field().nearest_unrevealed().unwrap().position() < before);
  }

  #[test]
  fn play_again_restarts_with_same_parameters() {
    let mut gl = started_loop(1);
    play_one_question(&mut gl, true);
    settle(&mut gl);
    assert_eq!(gl.phase(), Phase::Results);

    let events = gl.play_again();
    match &events[0] {
      GameEvent::LoadingStarted { topic, difficulty, count } => {
        assert_eq!(topic, "science");
        assert_eq!(*difficulty, Difficulty::Easy);
        assert_eq!(*count, 1);
      }
      other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(gl.phase(), Phase::Loading);
  }

  #[test]
  fn back_to_menu_discards_the_session() {
    let mut gl = started_loop(3);
    play_one_question(&mut gl, true);
    let events = gl.back_to_menu();
    assert!(matches!(events[0], GameEvent::ReturnedToMenu));
    assert_eq!(gl.phase(), Phase::Menu);
    assert!(gl.tracker().session().is_none());
    assert!(gl.field().sets().is_empty());
  }

  #[tokio::test]
  async fn offline_fallback_session_plays_to_completion() {
    // End to end: no model configured, so the fetch serves the offline bank;
    // the session is playable to 7/10 and the saved record reads 70%.
    use crate::config::Prompts;
    use crate::question_source::QuestionSource;
    use crate::store::HistoryStore;

    let source = QuestionSource::new(None, Prompts::default(), vec![]);
    let (questions, _) = source.fetch("science", Difficulty::Medium, 10).await.unwrap();
    assert_eq!(questions.len(), 10);

    let mut gl = GameLoop::with_rng(StdRng::seed_from_u64(2024));
    gl.start_loading("science".into(), Difficulty::Medium, 10);
    gl.questions_ready(questions);

    let store = HistoryStore::at(
      std::env::temp_dir()
        .join(format!("portalrun-e2e-{}", uuid::Uuid::new_v4()))
        .join("history.json"),
    );
    let mut saved = 0;
    for i in 0..10 {
      play_one_question(&mut gl, i < 7);
      for e in settle(&mut gl) {
        if let GameEvent::SessionComplete { record } = e {
          assert_eq!(record.score, 7);
          assert_eq!(record.percentage, 70);
          store.save(record);
          saved += 1;
        }
      }
    }
    assert_eq!(saved, 1);
    assert_eq!(gl.phase(), Phase::Results);

    let history = store.load();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].percentage, 70);
    assert_eq!(history[0].total_questions, 10);
  }

  #[test]
  fn set_speed_clamps_to_bounds() {
    let mut gl = started_loop(1);
    gl.set_speed(1000.0);
    assert_eq!(gl.speed(), MAX_SPEED);
    gl.set_speed(0.0);
    assert_eq!(gl.speed(), MIN_SPEED);
  }
}
