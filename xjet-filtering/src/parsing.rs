// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recursive-descent parser for filter expressions.
//!
//! Grammar (whitespace insignificant between tokens):
//!
//! ```text
//! expr    := or_expr
//! or_expr := and_expr (("or" | "|") and_expr)*
//! and_expr:= unary (("and" | "&") unary)*
//! unary   := ("not" | "!") unary | atom
//! atom    := "(" expr ")" | "all()" | "none()" | "=" word | "~" word | "/" regex "/" | word
//! ```

use crate::errors::FilterParseError;
use crate::expression::{FilterExpr, NameMatcher};
use winnow::{
    Parser,
    combinator::{alt, delimited, opt, preceded},
    token::{literal, take_till, take_while},
};

type Input<'a> = &'a str;
type PResult<'a, T> = Result<T, winnow::error::ErrMode<winnow::error::ContextError>>;

pub(crate) fn parse(input: &str) -> Result<FilterExpr, FilterParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(FilterExpr::All);
    }
    let mut rest: Input = trimmed;
    let expr = or_expr
        .parse_next(&mut rest)
        .map_err(|err| FilterParseError::new(input, err.to_string()))?;
    let leftover = rest.trim();
    if !leftover.is_empty() {
        return Err(FilterParseError::new(
            input,
            format!("unexpected trailing input `{leftover}`"),
        ));
    }
    Ok(expr)
}

fn ws<'a>(input: &mut Input<'a>) -> PResult<'a, ()> {
    *input = input.trim_start();
    Ok(())
}

fn or_expr(input: &mut Input<'_>) -> PResult<'_, FilterExpr> {
    ws.parse_next(input)?;
    let mut acc = and_expr.parse_next(input)?;
    loop {
        ws.parse_next(input)?;
        let matched: Option<&str> = opt(alt((literal("or"), literal("|")))).parse_next(input)?;
        if matched.is_none() {
            break;
        }
        ws.parse_next(input)?;
        let rhs = and_expr.parse_next(input)?;
        acc = FilterExpr::Or(Box::new(acc), Box::new(rhs));
    }
    Ok(acc)
}

fn and_expr(input: &mut Input<'_>) -> PResult<'_, FilterExpr> {
    ws.parse_next(input)?;
    let mut acc = unary.parse_next(input)?;
    loop {
        ws.parse_next(input)?;
        let matched: Option<&str> = opt(alt((literal("and"), literal("&")))).parse_next(input)?;
        if matched.is_none() {
            break;
        }
        ws.parse_next(input)?;
        let rhs = unary.parse_next(input)?;
        acc = FilterExpr::And(Box::new(acc), Box::new(rhs));
    }
    Ok(acc)
}

fn unary(input: &mut Input<'_>) -> PResult<'_, FilterExpr> {
    ws.parse_next(input)?;
    let negated: Option<&str> = opt(alt((literal("not "), literal("!")))).parse_next(input)?;
    let inner = atom.parse_next(input)?;
    Ok(match negated {
        Some(_) => FilterExpr::Not(Box::new(inner)),
        None => inner,
    })
}

fn atom(input: &mut Input<'_>) -> PResult<'_, FilterExpr> {
    ws.parse_next(input)?;
    alt((
        delimited(literal("("), or_expr, (ws, literal(")"))),
        literal("all()").map(|_| FilterExpr::All),
        literal("none()").map(|_| FilterExpr::None),
        preceded(literal("="), word).map(|w| FilterExpr::Name(NameMatcher::Equal(w.into()))),
        preceded(literal("~"), word).map(|w| FilterExpr::Name(NameMatcher::Contains(w.into()))),
        regex_atom,
        word.map(|w| FilterExpr::Name(NameMatcher::Contains(w.into()))),
    ))
    .parse_next(input)
}

fn regex_atom(input: &mut Input<'_>) -> PResult<'_, FilterExpr> {
    let pattern: &str = delimited(literal("/"), take_till(0.., '/'), literal("/")).parse_next(input)?;
    let re = regex::Regex::new(pattern).map_err(|_| {
        winnow::error::ErrMode::Cut(winnow::error::ContextError::new())
    })?;
    Ok(FilterExpr::Name(NameMatcher::Regex(re)))
}

fn word<'a>(input: &mut Input<'a>) -> PResult<'a, &'a str> {
    take_while(1.., |c: char| {
        !c.is_whitespace() && !matches!(c, '(' | ')' | '&' | '|' | '!' | '=' | '~' | '/')
    })
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn parses_bare_word() {
        let expr = parse("foo").unwrap();
        assert!(expr.matches("xfoox"));
    }

    #[test]
    fn parses_and_or_not_with_parens() {
        let expr = parse("(foo or bar) and not baz").unwrap();
        assert!(expr.matches("foo"));
        assert!(expr.matches("bar"));
        assert!(!expr.matches("foobaz"));
    }

    #[test]
    fn parses_regex() {
        let expr = parse("/^S::a.*/").unwrap();
        assert!(expr.matches("S::abc"));
        assert!(!expr.matches("S::xbc"));
    }

    #[test]
    fn parses_equal_matcher() {
        let expr = parse("=S::a::b").unwrap();
        assert!(expr.matches("S::a::b"));
        assert!(!expr.matches("S::a::bc"));
    }

    #[test_case("foo)"; "unbalanced closing paren")]
    #[test_case("(foo"; "unbalanced opening paren")]
    #[test_case("and foo"; "leading binary operator")]
    fn rejects_malformed_input(input: &str) {
        assert!(parse(input).is_err());
    }
}
