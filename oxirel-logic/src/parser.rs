//! Rule-File Parser.
//!
//! One rule per line:
//!
//! ```text
//! # transitivity of hypernymy
//! hyp(1,2); hyp(2,3) -> hyp(1,3)
//! syn(1,2) -> syn(2,1)     // symmetry
//! -> !hyp(1,1)
//! ```
//!
//! `#` and `//` start a comment. Literals on one side are separated by `;`
//! and either side may be empty, but not both. Relation ids are assigned in
//! order of first appearance.

use crate::error::{LogicError, Result};
use crate::logic::Logic;
use crate::rule::{Literal, Rule, Var};

/// Parse a whole rule file.
pub fn parse_logic(text: &str) -> Result<Logic> {
    let mut logic = Logic::new();
    for (k, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let rule = parse_rule(line, k + 1, &mut logic)?;
        logic.add_rule(&rule);
    }
    Ok(logic)
}

fn strip_comment(line: &str) -> &str {
    let cut = [line.find('#'), line.find("//")]
        .into_iter()
        .flatten()
        .min();
    match cut {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Parse one rule, interning its relation names into `logic`.
pub fn parse_rule(line: &str, line_no: usize, logic: &mut Logic) -> Result<Rule> {
    let mut sides = line.split("->");
    let (Some(lhs), Some(rhs), None) = (sides.next(), sides.next(), sides.next()) else {
        return Err(LogicError::Parse {
            line: line_no,
            message: "expected exactly one `->`".to_string(),
        });
    };
    let premises = parse_side(lhs, line_no, logic)?;
    let conclusions = parse_side(rhs, line_no, logic)?;
    if premises.is_empty() && conclusions.is_empty() {
        return Err(LogicError::Parse {
            line: line_no,
            message: "rule has no literals".to_string(),
        });
    }
    Ok(Rule::new(premises, conclusions))
}

fn parse_side(side: &str, line_no: usize, logic: &mut Logic) -> Result<Vec<Literal>> {
    let side = side.trim();
    if side.is_empty() {
        return Ok(Vec::new());
    }
    side.split(';')
        .map(|lit| parse_literal(lit.trim(), line_no, logic))
        .collect()
}

fn parse_literal(text: &str, line_no: usize, logic: &mut Logic) -> Result<Literal> {
    let err = |message: String| LogicError::Parse {
        line: line_no,
        message,
    };
    let (negated, body) = match text.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    let open = body
        .find('(')
        .ok_or_else(|| err(format!("expected `(` in `{}`", text)))?;
    let inner = body[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| err(format!("expected `)` at end of `{}`", text)))?;
    let name = body[..open].trim();
    if !is_identifier(name) {
        return Err(err(format!("invalid relation name `{}`", name)));
    }

    let args = inner
        .split(',')
        .map(|a| {
            let a = a.trim();
            a.parse::<Var>()
                .map_err(|_| err(format!("invalid variable `{}` in `{}`", a, text)))
        })
        .collect::<Result<Vec<Var>>>()?;
    let [a, b] = args[..] else {
        return Err(LogicError::Arity {
            line: line_no,
            relation: name.to_string(),
            found: args.len(),
        });
    };

    let rel = logic.intern_relation(name);
    Ok(if negated {
        Literal::negative(rel, a, b)
    } else {
        Literal::positive(rel, a, b)
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
