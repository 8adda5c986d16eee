//! In-session score tracking and the completed-session record.

use tracing::{info, instrument};

use crate::domain::{Difficulty, PersistedGameRecord, Question, QuizSession, WrongAnswer};

/// Tracks score / answered-count / wrong answers for the live session and
/// turns a finished session into a [`PersistedGameRecord`].
///
/// Invariant after every record call: `answered == score + wrong_answers.len()`.
#[derive(Debug, Default)]
pub struct ScoreTracker {
  session: Option<QuizSession>,
}

impl ScoreTracker {
  pub fn new() -> Self {
    Self { session: None }
  }

  #[instrument(level = "info", skip(self, questions), fields(%topic, %difficulty, count = questions.len()))]
  pub fn start_session(&mut self, topic: String, difficulty: Difficulty, questions: Vec<Question>) {
    self.session = Some(QuizSession::new(topic, difficulty, questions));
  }

  pub fn session(&self) -> Option<&QuizSession> {
    self.session.as_ref()
  }

  pub fn session_mut(&mut self) -> Option<&mut QuizSession> {
    self.session.as_mut()
  }

  pub fn record_correct(&mut self) {
    if let Some(s) = self.session.as_mut() {
      s.score += 1;
      s.answered += 1;
    }
  }

  pub fn record_wrong(&mut self, question: &str, chosen: &str, correct: &str) {
    if let Some(s) = self.session.as_mut() {
      s.answered += 1;
      s.wrong_answers.push(WrongAnswer {
        question: question.to_string(),
        chosen: chosen.to_string(),
        correct: correct.to_string(),
      });
    }
  }

  /// Rounded percent correct; 0 before anything has been answered.
  pub fn percentage(&self) -> u32 {
    match &self.session {
      Some(s) if s.answered > 0 => {
        ((s.score as f64) / (s.answered as f64) * 100.0).round() as u32
      }
      _ => 0,
    }
  }

  /// Consume the session into its persisted record. Returns None if no
  /// session is live (finish is one-shot).
  #[instrument(level = "info", skip(self))]
  pub fn finish(&mut self) -> Option<PersistedGameRecord> {
    let pct = self.percentage();
    let s = self.session.take()?;
    let record = PersistedGameRecord {
      topic: s.topic,
      difficulty: s.difficulty,
      score: s.score,
      total_questions: s.questions.len() as u32,
      percentage: pct,
      timestamp_ms: now_ms(),
      wrong_answers: s.wrong_answers,
    };
    info!(target: "game", score = record.score, total = record.total_questions, pct = record.percentage, "Session finished");
    Some(record)
  }

  /// Discard the live session without producing a record (return to menu).
  pub fn abandon(&mut self) {
    self.session = None;
  }
}

fn now_ms() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tracker_with(n: usize) -> ScoreTracker {
    let questions = (0..n)
      .map(|i| Question::new(format!("q{}", i), ["a", "b", "c"], 0))
      .collect();
    let mut t = ScoreTracker::new();
    t.start_session("science".into(), Difficulty::Easy, questions);
    t
  }

  #[test]
  fn percentage_is_zero_before_any_answer() {
    let t = tracker_with(5);
    assert_eq!(t.percentage(), 0);
    assert_eq!(ScoreTracker::new().percentage(), 0);
  }

  #[test]
  fn percentage_rounds_two_thirds_up() {
    let mut t = tracker_with(3);
    t.record_correct();
    t.record_correct();
    t.record_wrong("q2", "b", "a");
    assert_eq!(t.percentage(), 67);
  }

  #[test]
  fn answered_always_equals_score_plus_wrong() {
    let mut t = tracker_with(10);
    let pattern = [true, false, true, true, false, false, true, false, true, true];
    for (i, correct) in pattern.iter().enumerate() {
      if *correct {
        t.record_correct();
      } else {
        t.record_wrong(&format!("q{}", i), "b", "a");
      }
      let s = t.session().unwrap();
      assert_eq!(s.answered, s.score + s.wrong_answers.len() as u32);
    }
    assert_eq!(t.percentage(), 60);
  }

  #[test]
  fn percentage_moves_monotonically_with_answer_kind() {
    let mut t = tracker_with(20);
    t.record_correct();
    t.record_wrong("q", "b", "a");
    let mut prev = t.percentage();
    for _ in 0..5 {
      t.record_correct();
      let p = t.percentage();
      assert!(p >= prev);
      prev = p;
    }
    for _ in 0..5 {
      t.record_wrong("q", "b", "a");
      let p = t.percentage();
      assert!(p <= prev);
      prev = p;
    }
  }

  #[test]
  fn finish_is_one_shot_and_carries_totals() {
    let mut t = tracker_with(10);
    for _ in 0..7 {
      t.record_correct();
    }
    for i in 0..3 {
      t.record_wrong(&format!("q{}", i), "b", "a");
    }
    let record = t.finish().unwrap();
    assert_eq!(record.score, 7);
    assert_eq!(record.total_questions, 10);
    assert_eq!(record.percentage, 70);
    assert_eq!(record.wrong_answers.len(), 3);
    assert!(t.finish().is_none());
  }
}
