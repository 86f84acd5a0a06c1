//! Chemical equation coefficient checker used by the "cân bằng phương trình" exercise.
//!
//! Parses formulas like `Ca(OH)2`, `K4[Fe(CN)6]` or `CuSO4·5H2O` into atom
//! counts and checks that the learner's coefficients conserve every element.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::{CoreError, CoreResult};

type Atoms = BTreeMap<String, u64>;

/// Deepest `(`/`[` nesting accepted. Real formulas rarely go past 3.
const MAX_GROUP_DEPTH: usize = 16;
/// Longest equation (bytes) accepted before parsing.
pub const MAX_EQUATION_LEN: usize = 512;

struct FormulaParser<'a> {
  src: &'a str,
  chars: Vec<char>,
  pos: usize,
}

impl<'a> FormulaParser<'a> {
  fn new(src: &'a str) -> Self {
    Self { src, chars: src.chars().collect(), pos: 0 }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn err(&self, what: &str) -> String {
    format!("{} at position {} in {:?}", what, self.pos, self.src)
  }

  /// `Ok(None)` when no digits follow.
  fn number(&mut self) -> Result<Option<u64>, String> {
    let start = self.pos;
    while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
      self.pos += 1;
    }
    if start == self.pos {
      return Ok(None);
    }
    self.chars[start..self.pos]
      .iter()
      .collect::<String>()
      .parse()
      .map(Some)
      .map_err(|_| self.err("number too large"))
  }

  fn count(&mut self) -> Result<u64, String> {
    match self.number()? {
      Some(0) => Err(self.err("zero subscript")),
      Some(n) => Ok(n),
      None => Ok(1),
    }
  }

  /// Parses until `close` (or end of input when `None`).
  fn sequence(&mut self, close: Option<char>, depth: usize) -> Result<Atoms, String> {
    let mut atoms = Atoms::new();
    loop {
      match self.peek() {
        None if close.is_none() => break,
        None => return Err(self.err("unclosed bracket")),
        Some(c) if Some(c) == close => {
          self.pos += 1;
          break;
        }
        Some(c @ ('(' | '[')) => {
          if depth >= MAX_GROUP_DEPTH {
            return Err(self.err("nesting too deep"));
          }
          self.pos += 1;
          let inner = self.sequence(Some(if c == '(' { ')' } else { ']' }), depth + 1)?;
          if inner.is_empty() {
            return Err(self.err("empty group"));
          }
          let n = self.count()?;
          merge(&mut atoms, &inner, n).ok_or_else(|| self.err("atom count overflow"))?;
        }
        Some(c) if c.is_ascii_uppercase() => {
          self.pos += 1;
          let mut symbol = c.to_string();
          while matches!(self.peek(), Some(l) if l.is_ascii_lowercase()) {
            symbol.push(self.chars[self.pos]);
            self.pos += 1;
          }
          let n = self.count()?;
          let slot = atoms.entry(symbol).or_insert(0);
          let next = slot.checked_add(n).ok_or_else(|| self.err("atom count overflow"))?;
          *slot = next;
        }
        Some(_) => return Err(self.err("unexpected character")),
      }
    }
    Ok(atoms)
  }
}

/// Adds `from * times` into `into`; `None` on overflow.
fn merge(into: &mut Atoms, from: &Atoms, times: u64) -> Option<()> {
  for (el, n) in from {
    let slot = into.entry(el.clone()).or_insert(0);
    let next = n.checked_mul(times).and_then(|v| slot.checked_add(v))?;
    *slot = next;
  }
  Some(())
}

/// Atom counts of one species, hydrate parts (`·`, `.`, `*`) included.
pub fn parse_formula(formula: &str) -> CoreResult<BTreeMap<String, u64>> {
  if formula.len() > MAX_EQUATION_LEN {
    return Err(CoreError::Validation(format!("formula longer than {} bytes", MAX_EQUATION_LEN)));
  }
  let mut total = Atoms::new();
  for part in formula.split(['·', '.', '*']) {
    let part = part.trim();
    if part.is_empty() {
      return Err(CoreError::Validation(format!("empty part in formula {:?}", formula)));
    }
    let mut p = FormulaParser::new(part);
    let multiplier = p.number().map_err(CoreError::Validation)?.unwrap_or(1);
    if multiplier == 0 {
      return Err(CoreError::Validation(format!("zero multiplier in {:?}", formula)));
    }
    let atoms = p.sequence(None, 0).map_err(CoreError::Validation)?;
    if atoms.is_empty() {
      return Err(CoreError::Validation(format!("no elements in {:?}", part)));
    }
    merge(&mut total, &atoms, multiplier)
      .ok_or_else(|| CoreError::Validation(format!("atom count overflow in {:?}", formula)))?;
  }
  Ok(total)
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AtomBalance {
  pub element: String,
  pub left: u64,
  pub right: u64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
  pub balanced: bool,
  /// Coefficients share no common factor.
  pub lowest_terms: bool,
  pub atoms: Vec<AtomBalance>,
}

fn split_sides(equation: &str) -> CoreResult<(&str, &str)> {
  for arrow in ["->", "→", "="] {
    if let Some((l, r)) = equation.split_once(arrow) {
      if r.contains(arrow) {
        return Err(CoreError::Validation("equation has more than one arrow".into()));
      }
      return Ok((l, r));
    }
  }
  Err(CoreError::Validation("equation needs '->', '→' or '='".into()))
}

fn species(side: &str) -> CoreResult<Vec<&str>> {
  let list: Vec<&str> = side.split('+').map(str::trim).collect();
  if list.iter().any(|s| s.is_empty()) {
    return Err(CoreError::Validation(format!("empty species in {:?}", side.trim())));
  }
  if let Some(s) = list.iter().find(|s| s.starts_with(|c: char| c.is_ascii_digit())) {
    return Err(CoreError::Validation(format!("{:?}: coefficients go in the coefficient list", s)));
  }
  Ok(list)
}

fn gcd(a: u64, b: u64) -> u64 {
  if b == 0 { a } else { gcd(b, a % b) }
}

/// Checks `coefficients` (one per species, left to right) against `equation`.
pub fn check_balance(equation: &str, coefficients: &[u32]) -> CoreResult<BalanceReport> {
  if equation.len() > MAX_EQUATION_LEN {
    return Err(CoreError::Validation(format!("equation longer than {} bytes", MAX_EQUATION_LEN)));
  }
  let (left, right) = split_sides(equation)?;
  let left = species(left)?;
  let right = species(right)?;

  if coefficients.len() != left.len() + right.len() {
    return Err(CoreError::Validation(format!(
      "expected {} coefficients, got {}",
      left.len() + right.len(),
      coefficients.len()
    )));
  }
  if coefficients.iter().any(|&c| c == 0) {
    return Err(CoreError::Validation("coefficients must be positive".into()));
  }

  let mut sums: BTreeMap<String, (u64, u64)> = BTreeMap::new();
  for (i, formula) in left.iter().chain(right.iter()).enumerate() {
    let on_left = i < left.len();
    for (el, n) in parse_formula(formula)? {
      let slot = sums.entry(el).or_insert((0, 0));
      let side = if on_left { &mut slot.0 } else { &mut slot.1 };
      let next = n
        .checked_mul(coefficients[i] as u64)
        .and_then(|v| side.checked_add(v))
        .ok_or_else(|| CoreError::Validation(format!("atom count overflow in {:?}", formula)))?;
      *side = next;
    }
  }

  let atoms: Vec<AtomBalance> = sums
    .into_iter()
    .map(|(element, (left, right))| AtomBalance { element, left, right })
    .collect();
  let balanced = atoms.iter().all(|a| a.left == a.right);
  let lowest_terms = coefficients.iter().fold(0u64, |g, &c| gcd(g, c as u64)) == 1;
  Ok(BalanceReport { balanced, lowest_terms, atoms })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn atoms(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
    pairs.iter().map(|(e, n)| (e.to_string(), *n)).collect()
  }

  #[test]
  fn parses_groups_and_hydrates() {
    assert_eq!(parse_formula("H2O").unwrap(), atoms(&[("H", 2), ("O", 1)]));
    assert_eq!(parse_formula("Ca(OH)2").unwrap(), atoms(&[("Ca", 1), ("H", 2), ("O", 2)]));
    assert_eq!(
      parse_formula("K4[Fe(CN)6]").unwrap(),
      atoms(&[("C", 6), ("Fe", 1), ("K", 4), ("N", 6)])
    );
    assert_eq!(
      parse_formula("CuSO4·5H2O").unwrap(),
      atoms(&[("Cu", 1), ("H", 10), ("O", 9), ("S", 1)])
    );
  }

  #[test]
  fn rejects_malformed_formulas() {
    for bad in ["", "h2o", "Ca(OH", "Fe2)", "()", "H0", "Na+"] {
      assert!(parse_formula(bad).is_err(), "{:?} should fail", bad);
    }
  }

  #[test]
  fn iron_oxide_balance() {
    let ok = check_balance("Fe + O2 -> Fe2O3", &[4, 3, 2]).unwrap();
    assert!(ok.balanced);
    assert!(ok.lowest_terms);

    let bad = check_balance("Fe + O2 -> Fe2O3", &[2, 3, 2]).unwrap();
    assert!(!bad.balanced);
    let fe = bad.atoms.iter().find(|a| a.element == "Fe").unwrap();
    assert_eq!((fe.left, fe.right), (2, 4));
  }

  #[test]
  fn balanced_but_not_reduced() {
    let r = check_balance("H2 + O2 = H2O", &[4, 2, 4]).unwrap();
    assert!(r.balanced);
    assert!(!r.lowest_terms);
  }

  #[test]
  fn unicode_arrow_and_count_mismatch() {
    assert!(check_balance("CH4 + 2O2 → CO2 + 2H2O", &[1, 1, 1, 1]).is_err());
    assert!(check_balance("CH4 + O2 → CO2 + H2O", &[1, 2, 1]).is_err());
    assert!(check_balance("CH4 + O2 → CO2 + H2O", &[1, 2, 1, 2]).unwrap().balanced);
    assert!(check_balance("CH4 + O2 CO2", &[1, 1]).is_err());
  }

  #[test]
  fn deep_nesting_is_rejected_without_recursing() {
    let nested = format!("{}H{}", "(".repeat(MAX_GROUP_DEPTH + 1), ")".repeat(MAX_GROUP_DEPTH + 1));
    let err = parse_formula(&nested).unwrap_err();
    assert!(err.to_string().contains("nesting too deep"), "{}", err);

    let ok = format!("{}H{}", "(".repeat(MAX_GROUP_DEPTH), ")".repeat(MAX_GROUP_DEPTH));
    assert_eq!(parse_formula(&ok).unwrap(), atoms(&[("H", 1)]));

    // Only the length cap stands between a huge body and the parser.
    let huge = format!("{}H -> H", "(".repeat(200_000));
    assert!(matches!(check_balance(&huge, &[1, 1]), Err(CoreError::Validation(_))));
    assert!(parse_formula(&format!("{}H", "(".repeat(200_000))).is_err());
  }

  #[test]
  fn oversized_counts_are_rejected() {
    assert!(matches!(parse_formula("H99999999999999999999O"), Err(CoreError::Validation(_))));
    assert!(matches!(
      parse_formula("((((H18446744073709551615)2)2)2)"),
      Err(CoreError::Validation(_))
    ));
    assert!(parse_formula("H18446744073709551615H").is_err());
    assert!(check_balance("H18446744073709551615 -> H", &[2, 1]).is_err());
  }
}
