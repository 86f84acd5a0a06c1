//! Small utility helpers used across modules.

/// Replaces each `{key}` in `tpl` with its value in a single left-to-right
/// pass; substituted values are never rescanned. Unknown keys stay verbatim.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after
      .find('}')
      .and_then(|close| pairs.iter().find(|(k, _)| *k == &after[..close]).map(|(_, v)| (close, *v)));
    match value {
      Some((close, v)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings, on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_all_occurrences() {
    let out = fill_template("{a} và {b}, lại {a}", &[("a", "Na"), ("b", "Cl")]);
    assert_eq!(out, "Na và Cl, lại Na");
  }

  #[test]
  fn substituted_values_are_not_expanded_again() {
    let out = fill_template(
      "{quiz_title} / {learner_id}",
      &[("quiz_title", "Bài {learner_id}"), ("learner_id", "hs-01")],
    );
    assert_eq!(out, "Bài {learner_id} / hs-01");
  }

  #[test]
  fn unknown_and_unclosed_braces_stay_verbatim() {
    assert_eq!(fill_template("{x} {a} {", &[("a", "1")]), "{x} 1 {");
    assert_eq!(fill_template("{{a}}", &[("a", "1")]), "{1}");
  }

  #[test]
  fn truncation_respects_utf8() {
    let s = "Điện phân dung dịch";
    let t = trunc_for_log(s, 2);
    assert!(t.starts_with('Đ'));
    assert!(t.contains("bytes total"));
    assert_eq!(trunc_for_log("ngắn", 64), "ngắn");
  }
}
