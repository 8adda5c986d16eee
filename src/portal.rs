//! Answer portals: the three lane gates spawned per question.
//!
//! A set is built by permuting the question's answers (Fisher–Yates) and
//! assigning them to lanes 0..=2 left to right. Exactly one portal per set is
//! correct; the lane the correct answer lands on is uniform and independent
//! across spawns. Positions are longitudinal: the player sits at 0 and
//! portals travel toward it (decreasing), crossing at negative epsilon.

use rand::Rng;

/// How far behind the player a passed set may drift before it is collected.
pub const DESPAWN_BEHIND: f32 = -10.0;

/// One lane gate bearing one answer option.
#[derive(Clone, Debug)]
pub struct Portal {
  pub lane: usize,
  pub answer: String,
  pub is_correct: bool,
  pub position: f32,
}

/// The three portals spawned together for a single question.
#[derive(Clone, Debug)]
pub struct PortalSet {
  pub portals: [Portal; 3],
  pub revealed: bool,
}

impl PortalSet {
  pub fn position(&self) -> f32 {
    self.portals[0].position
  }

  pub fn portal_in_lane(&self, lane: usize) -> Option<&Portal> {
    self.portals.iter().find(|p| p.lane == lane)
  }

  pub fn correct_portal(&self) -> &Portal {
    // Invariant: exactly one correct portal per set.
    self.portals
      .iter()
      .find(|p| p.is_correct)
      .unwrap_or(&self.portals[0])
  }

  /// Idempotent: repeated reveals are harmless.
  pub fn reveal(&mut self) {
    self.revealed = true;
  }
}

/// In-place Fisher–Yates over the three answers, swapping from the last index
/// down. The correct index follows the element it names through every swap,
/// so the returned index still identifies the correct answer in the permuted
/// order.
pub fn shuffle_answers(
  answers: &[String; 3],
  correct: usize,
  rng: &mut impl Rng,
) -> ([String; 3], usize) {
  let mut out = answers.clone();
  let mut correct = correct;
  for i in (1..out.len()).rev() {
    let j = rng.gen_range(0..=i);
    out.swap(i, j);
    if correct == i {
      correct = j;
    } else if correct == j {
      correct = i;
    }
  }
  (out, correct)
}

/// Owns the live portal sets: spawning, travel, and garbage collection.
#[derive(Debug, Default)]
pub struct PortalField {
  sets: Vec<PortalSet>,
}

impl PortalField {
  pub fn new() -> Self {
    Self { sets: Vec::new() }
  }

  /// Spawn a shuffled 3-lane set `spawn_distance` ahead of the player.
  /// Returns the permuted display order (lane 0..=2, left to right).
  pub fn spawn_set(
    &mut self,
    answers: &[String; 3],
    correct: usize,
    spawn_distance: f32,
    rng: &mut impl Rng,
  ) -> [String; 3] {
    let (display, correct) = shuffle_answers(answers, correct, rng);
    let portals = [0usize, 1, 2].map(|lane| Portal {
      lane,
      answer: display[lane].clone(),
      is_correct: lane == correct,
      position: spawn_distance,
    });
    self.sets.push(PortalSet { portals, revealed: false });
    display
  }

  /// Advance every portal toward the player and collect sets that have
  /// drifted past the despawn threshold.
  pub fn advance(&mut self, dist: f32) {
    for set in &mut self.sets {
      for p in &mut set.portals {
        p.position -= dist;
      }
    }
    self.sets.retain(|s| s.position() > DESPAWN_BEHIND);
  }

  /// The closest set that has not been resolved yet.
  pub fn nearest_unrevealed(&self) -> Option<&PortalSet> {
    self
      .sets
      .iter()
      .filter(|s| !s.revealed)
      .min_by(|a, b| a.position().total_cmp(&b.position()))
  }

  pub fn nearest_unrevealed_mut(&mut self) -> Option<&mut PortalSet> {
    self
      .sets
      .iter_mut()
      .filter(|s| !s.revealed)
      .min_by(|a, b| a.position().total_cmp(&b.position()))
  }

  /// Drop resolved sets (called once the settle delay has elapsed).
  pub fn clear_revealed(&mut self) {
    self.sets.retain(|s| !s.revealed);
  }

  /// Forcibly drop everything (session reset / return to menu).
  pub fn clear(&mut self) {
    self.sets.clear();
  }

  pub fn sets(&self) -> &[PortalSet] {
    &self.sets
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn answers() -> [String; 3] {
    ["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
  }

  #[test]
  fn shuffle_keeps_correct_index_pointing_at_correct_text() {
    let src = answers();
    for correct in 0..3 {
      for seed in 0..200u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (permuted, new_correct) = shuffle_answers(&src, correct, &mut rng);
        assert_eq!(permuted[new_correct], src[correct], "seed {} correct {}", seed, correct);
      }
    }
  }

  #[test]
  fn every_spawned_set_has_exactly_one_correct_portal() {
    for correct in 0..3 {
      for seed in 0..100u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut field = PortalField::new();
        field.spawn_set(&answers(), correct, 60.0, &mut rng);
        let set = field.nearest_unrevealed().unwrap();
        let count = set.portals.iter().filter(|p| p.is_correct).count();
        assert_eq!(count, 1);
      }
    }
  }

  #[test]
  fn correct_lane_is_not_pinned_to_original_order() {
    // Across many spawns the correct answer must land on every lane.
    let mut rng = StdRng::seed_from_u64(99);
    let mut seen = [false; 3];
    for _ in 0..200 {
      let mut field = PortalField::new();
      field.spawn_set(&answers(), 0, 60.0, &mut rng);
      let lane = field.nearest_unrevealed().unwrap().correct_portal().lane;
      seen[lane] = true;
    }
    assert_eq!(seen, [true, true, true]);
  }

  #[test]
  fn advance_moves_sets_and_collects_passed_ones() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut field = PortalField::new();
    field.spawn_set(&answers(), 1, 6.0, &mut rng);
    field.advance(4.0);
    assert_eq!(field.nearest_unrevealed().unwrap().position(), 2.0);
    // Past the trailing threshold: collected.
    field.advance(14.0);
    assert!(field.sets().is_empty());
  }

  #[test]
  fn reveal_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut field = PortalField::new();
    field.spawn_set(&answers(), 2, 10.0, &mut rng);
    let set = field.nearest_unrevealed_mut().unwrap();
    set.reveal();
    set.reveal();
    assert!(set.revealed);
    assert!(field.nearest_unrevealed().is_none());
  }
}
