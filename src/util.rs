//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Normalize a topic for bank lookups: trimmed, lowercased, inner runs of
/// whitespace collapsed to single spaces.
pub fn normalize_topic(s: &str) -> String {
  s.split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let cut: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", cut, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_occurrences() {
    let out = fill_template("{topic} and {topic}: {count}", &[("topic", "math"), ("count", "5")]);
    assert_eq!(out, "math and math: 5");
  }

  #[test]
  fn normalize_topic_collapses_case_and_spacing() {
    assert_eq!(normalize_topic("  World   History "), "world history");
    assert_eq!(normalize_topic("Science"), "science");
  }

  #[test]
  fn trunc_for_log_leaves_short_strings_alone() {
    assert_eq!(trunc_for_log("short", 10), "short");
    assert!(trunc_for_log("a long enough string", 6).starts_with("a long…"));
  }
}
