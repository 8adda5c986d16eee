//! Built-in offline question bank.
//!
//! The bank guarantees a playable game even without OpenAI or network access.
//! Topics here are keyed by normalized name; TOML config can extend the bank
//! with additional topics/questions (see `config::BankTopicCfg`).

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::config::BankTopicCfg;
use crate::domain::Question;
use crate::util::normalize_topic;

/// Result of an offline lookup: the served questions, the topic that was
/// actually used, and whether it was substituted for the requested one.
#[derive(Debug)]
pub struct BankLookup {
  pub questions: Vec<Question>,
  pub topic: String,
  pub substituted: bool,
}

/// Serve `count` questions for `topic` from the offline bank.
///
/// Unknown topics are substituted with a random available topic (logged).
/// The pool is reshuffled per call and the first `count` entries returned;
/// a pool smaller than `count` yields fewer questions, never repeats.
/// Returns None only when the bank holds no topics at all.
pub fn offline_questions(
  topic: &str,
  count: usize,
  extra: &[BankTopicCfg],
  rng: &mut impl Rng,
) -> Option<BankLookup> {
  let mut pools: Vec<(String, Vec<Question>)> = builtin_bank();

  // Merge config-provided topics; same-name topics extend the builtin pool.
  for t in extra {
    let key = normalize_topic(&t.topic);
    let converted: Vec<Question> = t
      .questions
      .iter()
      .filter_map(|q| {
        if q.answers.len() != 3 || q.correct_index > 2 {
          warn!(target: "quiz", topic = %t.topic, question = %q.question, "Skipping malformed bank entry");
          return None;
        }
        Some(Question {
          text: q.question.clone(),
          answers: [q.answers[0].clone(), q.answers[1].clone(), q.answers[2].clone()],
          correct: q.correct_index,
        })
      })
      .collect();
    if converted.is_empty() {
      continue;
    }
    match pools.iter_mut().find(|(k, _)| *k == key) {
      Some((_, pool)) => pool.extend(converted),
      None => pools.push((key, converted)),
    }
  }

  if pools.is_empty() {
    return None;
  }

  let wanted = normalize_topic(topic);
  let (topic, mut pool, substituted) = match pools.iter().find(|(k, _)| *k == wanted) {
    Some((k, p)) => (k.clone(), p.clone(), false),
    None => {
      let idx = rng.gen_range(0..pools.len());
      let (k, p) = &pools[idx];
      warn!(target: "quiz", requested = %wanted, substituted = %k, "Topic not in offline bank; substituting");
      (k.clone(), p.clone(), true)
    }
  };

  pool.shuffle(rng);
  pool.truncate(count);
  Some(BankLookup { questions: pool, topic, substituted })
}

fn builtin_bank() -> Vec<(String, Vec<Question>)> {
  vec![
    ("science".to_string(), vec![
      Question::new("What planet is known as the Red Planet?", ["Mars", "Venus", "Jupiter"], 0),
      Question::new("What gas do plants absorb from the atmosphere?", ["Oxygen", "Carbon dioxide", "Nitrogen"], 1),
      Question::new("What is the chemical symbol for water?", ["H2O", "CO2", "NaCl"], 0),
      Question::new("How many bones are in the adult human body?", ["186", "206", "226"], 1),
      Question::new("What force pulls objects toward Earth's center?", ["Magnetism", "Friction", "Gravity"], 2),
      Question::new("What is the center of an atom called?", ["Nucleus", "Electron", "Proton"], 0),
      Question::new("Which organ pumps blood through the body?", ["Lungs", "Liver", "Heart"], 2),
      Question::new("What is the speed of light, roughly?", ["300,000 km/s", "30,000 km/s", "3,000 km/s"], 0),
      Question::new("Which animal is the largest mammal?", ["Elephant", "Blue whale", "Giraffe"], 1),
      Question::new("What do bees collect from flowers?", ["Nectar", "Seeds", "Leaves"], 0),
    ]),
    ("history".to_string(), vec![
      Question::new("In which year did World War II end?", ["1943", "1945", "1947"], 1),
      Question::new("Who was the first president of the United States?", ["George Washington", "Abraham Lincoln", "Thomas Jefferson"], 0),
      Question::new("Which ancient civilization built the pyramids of Giza?", ["Romans", "Greeks", "Egyptians"], 2),
      Question::new("The Great Wall is located in which country?", ["China", "India", "Japan"], 0),
      Question::new("Who painted the Mona Lisa?", ["Michelangelo", "Leonardo da Vinci", "Raphael"], 1),
      Question::new("In which year did humans first land on the Moon?", ["1965", "1969", "1972"], 1),
      Question::new("The Titanic sank in which ocean?", ["Pacific", "Indian", "Atlantic"], 2),
      Question::new("Which empire was ruled by Julius Caesar?", ["Roman", "Ottoman", "Persian"], 0),
      Question::new("The Berlin Wall fell in which year?", ["1985", "1989", "1993"], 1),
      Question::new("Who wrote the Declaration of Independence?", ["Benjamin Franklin", "John Adams", "Thomas Jefferson"], 2),
    ]),
    ("geography".to_string(), vec![
      Question::new("What is the longest river in the world?", ["Amazon", "Nile", "Yangtze"], 1),
      Question::new("Which is the largest ocean?", ["Atlantic", "Indian", "Pacific"], 2),
      Question::new("What is the capital of Australia?", ["Sydney", "Canberra", "Melbourne"], 1),
      Question::new("Which desert is the largest hot desert?", ["Sahara", "Gobi", "Mojave"], 0),
      Question::new("Mount Everest lies on the border of Nepal and which country?", ["India", "China", "Bhutan"], 1),
      Question::new("Which continent has the most countries?", ["Asia", "Europe", "Africa"], 2),
      Question::new("What is the smallest country in the world?", ["Monaco", "Vatican City", "San Marino"], 1),
      Question::new("Which country has the largest population?", ["India", "United States", "Indonesia"], 0),
      Question::new("The Amazon rainforest is mostly in which country?", ["Brazil", "Peru", "Colombia"], 0),
      Question::new("Which city is known as the Big Apple?", ["Los Angeles", "Chicago", "New York"], 2),
    ]),
    ("math".to_string(), vec![
      Question::new("What is 12 × 12?", ["124", "144", "154"], 1),
      Question::new("What is the value of π rounded to two decimals?", ["3.14", "3.41", "3.12"], 0),
      Question::new("What is the square root of 81?", ["7", "8", "9"], 2),
      Question::new("How many degrees are in a right angle?", ["45", "90", "180"], 1),
      Question::new("What is 15% of 200?", ["25", "30", "35"], 1),
      Question::new("What is the next prime number after 7?", ["9", "11", "13"], 1),
      Question::new("How many sides does a hexagon have?", ["5", "6", "8"], 1),
      Question::new("What is 2 to the power of 10?", ["512", "1024", "2048"], 1),
      Question::new("What is the sum of the angles in a triangle?", ["90°", "180°", "360°"], 1),
      Question::new("What is 7 × 8?", ["54", "56", "64"], 1),
    ]),
    ("movies".to_string(), vec![
      Question::new("Who directed the movie Jaws?", ["Steven Spielberg", "George Lucas", "Martin Scorsese"], 0),
      Question::new("Which movie features the quote 'May the Force be with you'?", ["Star Trek", "Star Wars", "Dune"], 1),
      Question::new("What is the highest-grossing film of all time (unadjusted)?", ["Titanic", "Avengers: Endgame", "Avatar"], 2),
      Question::new("Who played Jack in Titanic?", ["Brad Pitt", "Leonardo DiCaprio", "Johnny Depp"], 1),
      Question::new("In The Matrix, what color pill does Neo take?", ["Red", "Blue", "Green"], 0),
      Question::new("Which animated film features a clownfish named Nemo?", ["Shark Tale", "Finding Nemo", "Moana"], 1),
      Question::new("Who voices Woody in Toy Story?", ["Tim Allen", "Tom Hanks", "Billy Crystal"], 1),
      Question::new("Which film won Best Picture in 2020?", ["1917", "Joker", "Parasite"], 2),
      Question::new("What is the name of the wizard school in Harry Potter?", ["Hogwarts", "Narnia", "Middle-earth"], 0),
      Question::new("Which movie features a DeLorean time machine?", ["Back to the Future", "Looper", "Interstellar"], 0),
    ]),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BankQuestionCfg;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  #[test]
  fn known_topic_serves_requested_count() {
    let mut rng = StdRng::seed_from_u64(7);
    let lookup = offline_questions("Science", 5, &[], &mut rng).unwrap();
    assert_eq!(lookup.questions.len(), 5);
    assert_eq!(lookup.topic, "science");
    assert!(!lookup.substituted);
  }

  #[test]
  fn short_pool_returns_fewer_without_repeating() {
    let mut rng = StdRng::seed_from_u64(7);
    let lookup = offline_questions("math", 50, &[], &mut rng).unwrap();
    assert_eq!(lookup.questions.len(), 10);
    let mut texts: Vec<&str> = lookup.questions.iter().map(|q| q.text.as_str()).collect();
    texts.sort();
    texts.dedup();
    assert_eq!(texts.len(), 10);
  }

  #[test]
  fn unknown_topic_substitutes_an_available_one() {
    let mut rng = StdRng::seed_from_u64(42);
    let lookup = offline_questions("quantum basket weaving", 3, &[], &mut rng).unwrap();
    assert!(lookup.substituted);
    assert!(!lookup.questions.is_empty());
    assert_ne!(lookup.topic, "quantum basket weaving");
  }

  #[test]
  fn config_bank_extends_and_adds_topics() {
    let extra = vec![BankTopicCfg {
      topic: "Chemistry".into(),
      questions: vec![
        BankQuestionCfg {
          question: "Symbol for gold?".into(),
          answers: vec!["Au".into(), "Ag".into(), "Go".into()],
          correct_index: 0,
        },
        // Malformed: wrong answer count, must be skipped.
        BankQuestionCfg {
          question: "Bad one".into(),
          answers: vec!["A".into(), "B".into()],
          correct_index: 0,
        },
      ],
    }];
    let mut rng = StdRng::seed_from_u64(1);
    let lookup = offline_questions("chemistry", 5, &extra, &mut rng).unwrap();
    assert!(!lookup.substituted);
    assert_eq!(lookup.questions.len(), 1);
    assert_eq!(lookup.questions[0].correct_answer(), "Au");
  }

  #[test]
  fn every_builtin_entry_is_well_formed() {
    for (_, pool) in builtin_bank() {
      for q in pool {
        assert!(q.correct <= 2, "bad correct index in {}", q.text);
        assert!(q.answers.iter().all(|a| !a.is_empty()));
      }
    }
  }
}
