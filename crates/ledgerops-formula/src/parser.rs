//! nom grammar for formulas.
//!
//! Precedence, loosest first:
//!
//! ```text
//! a if c else b
//! or
//! and
//! not
//! == != < <= > >= in, not in   (chained)
//! + -
//! * / // %
//! unary - +
//! **                           (right associative, binds tighter than unary on its left)
//! call f(..), index x[..]
//! literal, name, ( .. ), [ .. ], { k: v }
//! ```

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1},
    character::complete::{char as pchar, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    error::ErrorKind,
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

use ledgerops_store::Value;

use crate::ast::{BinaryOp, BoolOp, CompareOp, Expr, UnaryOp};
use crate::error::{FormulaError, Result};

const KEYWORDS: [&str; 9] = ["and", "or", "not", "in", "if", "else", "True", "False", "None"];

/// Deepest nesting of brackets, prefix operators, `**` and conditionals. A
/// chain like `a + b + c` adds one level per operator.
pub const MAX_NESTING: usize = 64;

/// Parse a formula into its syntax tree.
pub fn parse_formula(text: &str) -> Result<Expr> {
    match all_consuming(ws(|i| expr(i, 0)))(text) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = text.len() - e.input.len();
            let message = match e.input.chars().next() {
                _ if e.code == ErrorKind::TooLarge => {
                    format!("nested deeper than {MAX_NESTING} levels")
                }
                None => "unexpected end of formula".to_string(),
                Some(_) => {
                    let near: String = e.input.chars().take(12).collect();
                    format!("unexpected input near `{near}`")
                }
            };
            Err(FormulaError::Parse {
                formula: text.to_string(),
                offset,
                message,
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(FormulaError::Parse {
            formula: text.to_string(),
            offset: text.len(),
            message: "incomplete formula".to_string(),
        }),
    }
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(terminated(tag(kw), not(satisfy(is_ident_continue))))
}

fn symbol<'a>(sym: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(tag(sym))
}

fn identifier(input: &str) -> IResult<&str, String> {
    let (rest, name) = recognize(pair(
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    ))(input)?;
    if KEYWORDS.contains(&name) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    Ok((rest, name.to_string()))
}

// ============================================================================
// Literals
// ============================================================================

/// Digits with optional `_` separators: `1_000_000`.
fn digit_run(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, many0(pair(pchar('_'), digit1))))(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn float_text(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((digit_run, pchar('.'), opt(digit_run), opt(exponent)))),
        recognize(tuple((pchar('.'), digit_run, opt(exponent)))),
        recognize(pair(digit_run, exponent)),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Value> {
    alt((
        map_res(float_text, |s: &str| {
            s.replace('_', "").parse::<f64>().map(Value::Float)
        }),
        map_res(digit_run, |s: &str| {
            s.replace('_', "").parse::<i128>().map(Value::Int)
        }),
    ))(input)
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    let esc = escaped_transform(
        is_not("\\\""),
        '\\',
        alt((
            value("\\", tag("\\")),
            value("\"", tag("\"")),
            value("'", tag("'")),
            value("\n", tag("n")),
            value("\t", tag("t")),
            value("\r", tag("r")),
        )),
    );
    delimited(pchar('"'), map(opt(esc), Option::unwrap_or_default), pchar('"'))(input)
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    let esc = escaped_transform(
        is_not("\\'"),
        '\\',
        alt((
            value("\\", tag("\\")),
            value("'", tag("'")),
            value("\"", tag("\"")),
            value("\n", tag("n")),
            value("\t", tag("t")),
            value("\r", tag("r")),
        )),
    );
    delimited(pchar('\''), map(opt(esc), Option::unwrap_or_default), pchar('\''))(input)
}

fn string_lit(input: &str) -> IResult<&str, String> {
    alt((double_quoted, single_quoted))(input)
}

/// Comma-separated items with an optional trailing comma.
fn items<'a, F, O>(item: F) -> impl FnMut(&'a str) -> IResult<&'a str, (Vec<O>, bool)>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    pair(
        separated_list0(symbol(","), item),
        map(opt(symbol(",")), |c| c.is_some()),
    )
}

// ============================================================================
// Nesting
// ============================================================================

fn too_deep<T>(input: &str) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::TooLarge)))
}

/// One level deeper, or a hard failure past [`MAX_NESTING`].
fn nest(input: &str, depth: usize) -> IResult<&str, usize> {
    if depth >= MAX_NESTING {
        too_deep(input)
    } else {
        Ok((input, depth + 1))
    }
}

/// Left-folded chains build one tree level per operator.
fn chain_fits(input: &str, depth: usize, len: usize) -> IResult<&str, ()> {
    if depth + len > MAX_NESTING {
        too_deep(input)
    } else {
        Ok((input, ()))
    }
}

/// `open inner close`, with `inner` parsed one level deeper.
fn bracketed<'a, O, F>(
    open: &'static str,
    close: &'static str,
    depth: usize,
    mut inner: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str, usize) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let (input, _) = symbol(open)(input)?;
        let (input, depth) = nest(input, depth)?;
        let (input, parsed) = inner(input, depth)?;
        let (input, _) = symbol(close)(input)?;
        Ok((input, parsed))
    }
}

fn list_lit(input: &str, depth: usize) -> IResult<&str, Expr> {
    map(
        bracketed("[", "]", depth, |i, d| items(|j| expr(j, d))(i)),
        |(elems, _)| Expr::List(elems),
    )(input)
}

fn dict_lit(input: &str, depth: usize) -> IResult<&str, Expr> {
    map(
        bracketed("{", "}", depth, |i, d| {
            items(separated_pair(|j| expr(j, d), symbol(":"), |j| expr(j, d)))(i)
        }),
        |(entries, _)| Expr::Dict(entries),
    )(input)
}

/// `(x)` groups, `(x,)` and `(x, y)` build sequences.
fn paren(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (rest, (mut elems, trailing)) =
        bracketed("(", ")", depth, |i, d| items(|j| expr(j, d))(i))(input)?;
    if elems.len() == 1 && !trailing {
        if let Some(only) = elems.pop() {
            return Ok((rest, only));
        }
    }
    Ok((rest, Expr::List(elems)))
}

fn atom(input: &str, depth: usize) -> IResult<&str, Expr> {
    ws(alt((
        map(number, Expr::Literal),
        map(string_lit, |s| Expr::Literal(Value::Str(s))),
        value(Expr::Literal(Value::Bool(true)), keyword("True")),
        value(Expr::Literal(Value::Bool(false)), keyword("False")),
        value(Expr::Literal(Value::Null), keyword("None")),
        map(identifier, Expr::Name),
        |i| paren(i, depth),
        |i| list_lit(i, depth),
        |i| dict_lit(i, depth),
    )))(input)
}

// ============================================================================
// Operators
// ============================================================================

enum Postfix {
    Call(Vec<Expr>),
    Index(Expr),
}

fn postfix_op(input: &str, depth: usize) -> IResult<&str, Postfix> {
    alt((
        map(
            bracketed("(", ")", depth, |i, d| items(|j| expr(j, d))(i)),
            |(args, _)| Postfix::Call(args),
        ),
        map(bracketed("[", "]", depth, expr), Postfix::Index),
    ))(input)
}

fn postfix(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, base) = atom(input, depth)?;
    let (input, ops) = many0(|i| postfix_op(i, depth))(input)?;
    chain_fits(input, depth, ops.len())?;
    let folded = ops.into_iter().fold(base, |acc, op| match op {
        Postfix::Call(args) => Expr::Call(Box::new(acc), args),
        Postfix::Index(index) => Expr::Index(Box::new(acc), Box::new(index)),
    });
    Ok((input, folded))
}

fn power(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, base) = postfix(input, depth)?;
    match symbol("**")(input) {
        Ok((rest, _)) => {
            let (rest, depth) = nest(rest, depth)?;
            let (rest, exp) = unary(rest, depth)?;
            Ok((rest, Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exp))))
        }
        Err(nom::Err::Error(_)) => Ok((input, base)),
        Err(e) => Err(e),
    }
}

fn unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let sign = ws(alt((
        value(UnaryOp::Neg, pchar('-')),
        value(UnaryOp::Pos, pchar('+')),
    )))(input);
    match sign {
        Ok((rest, op)) => {
            let (rest, depth) = nest(rest, depth)?;
            let (rest, operand) = unary(rest, depth)?;
            Ok((rest, Expr::Unary(op, Box::new(operand))))
        }
        Err(nom::Err::Error(_)) => power(input, depth),
        Err(e) => Err(e),
    }
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |acc, (op, rhs)| {
        Expr::Binary(op, Box::new(acc), Box::new(rhs))
    })
}

fn term_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::FloorDiv, tag("//")),
        value(BinaryOp::Div, tag("/")),
        value(BinaryOp::Mul, terminated(tag("*"), not(pchar('*')))),
        value(BinaryOp::Mod, tag("%")),
    )))(input)
}

fn term(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = unary(input, depth)?;
    let (input, rest) = many0(pair(term_op, |i| unary(i, depth)))(input)?;
    chain_fits(input, depth, rest.len())?;
    Ok((input, fold_binary(first, rest)))
}

fn arith_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::Add, tag("+")),
        value(BinaryOp::Sub, tag("-")),
    )))(input)
}

fn arith(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = term(input, depth)?;
    let (input, rest) = many0(pair(arith_op, |i| term(i, depth)))(input)?;
    chain_fits(input, depth, rest.len())?;
    Ok((input, fold_binary(first, rest)))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Eq, symbol("==")),
        value(CompareOp::NotEq, symbol("!=")),
        value(CompareOp::LtE, symbol("<=")),
        value(CompareOp::GtE, symbol(">=")),
        value(CompareOp::Lt, symbol("<")),
        value(CompareOp::Gt, symbol(">")),
        value(CompareOp::NotIn, pair(keyword("not"), keyword("in"))),
        value(CompareOp::In, keyword("in")),
    ))(input)
}

fn comparison(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = arith(input, depth)?;
    let (input, rest) = many0(pair(compare_op, |i| arith(i, depth)))(input)?;
    if rest.is_empty() {
        Ok((input, first))
    } else {
        Ok((input, Expr::Compare(Box::new(first), rest)))
    }
}

fn not_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    match keyword("not")(input) {
        Ok((rest, _)) => {
            let (rest, depth) = nest(rest, depth)?;
            let (rest, operand) = not_expr(rest, depth)?;
            Ok((rest, Expr::Unary(UnaryOp::Not, Box::new(operand))))
        }
        Err(nom::Err::Error(_)) => comparison(input, depth),
        Err(e) => Err(e),
    }
}

fn bool_chain<'a>(
    op: BoolOp,
    kw: &'static str,
    operand: fn(&'a str, usize) -> IResult<&'a str, Expr>,
    input: &'a str,
    depth: usize,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input, depth)?;
    let (input, rest) = many0(preceded(keyword(kw), |i| operand(i, depth)))(input)?;
    chain_fits(input, depth, rest.len())?;
    let folded = rest
        .into_iter()
        .fold(first, |acc, rhs| Expr::Bool(op, Box::new(acc), Box::new(rhs)));
    Ok((input, folded))
}

fn and_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    bool_chain(BoolOp::And, "and", not_expr, input, depth)
}

fn or_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    bool_chain(BoolOp::Or, "or", and_expr, input, depth)
}

fn expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, body) = or_expr(input, depth)?;
    match keyword("if")(input) {
        Ok((rest, _)) => {
            let (rest, depth) = nest(rest, depth)?;
            let (rest, test) = or_expr(rest, depth)?;
            let (rest, _) = keyword("else")(rest)?;
            let (rest, orelse) = expr(rest, depth)?;
            Ok((
                rest,
                Expr::IfElse {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
            ))
        }
        Err(nom::Err::Error(_)) => Ok((input, body)),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: impl Into<Value>) -> Box<Expr> {
        Box::new(Expr::Literal(v.into()))
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let parsed = parse_formula("-2 ** 2").unwrap();
        assert_eq!(
            parsed,
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Binary(BinaryOp::Pow, lit(2i64), lit(2i64)))
            )
        );
    }

    #[test]
    fn arithmetic_is_left_associative() {
        let parsed = parse_formula("10 - 4 - 3").unwrap();
        assert_eq!(
            parsed,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, lit(10i64), lit(4i64))),
                lit(3i64)
            )
        );
    }

    #[test]
    fn parses_calls_indexing_and_literals() {
        let parsed = parse_formula("len(['a', \"b\"])[0]").unwrap();
        let Expr::Index(call, _) = parsed else {
            panic!("expected an index expression");
        };
        let Expr::Call(callee, args) = *call else {
            panic!("expected a call");
        };
        assert_eq!(*callee, Expr::Name("len".to_string()));
        assert_eq!(
            args,
            vec![Expr::List(vec![
                Expr::Literal(Value::from("a")),
                Expr::Literal(Value::from("b")),
            ])]
        );
    }

    #[test]
    fn parses_numbers() {
        assert_eq!(parse_formula("1_000").unwrap(), *lit(1000i64));
        assert_eq!(parse_formula("2.5").unwrap(), *lit(2.5));
        assert_eq!(parse_formula("1e3").unwrap(), *lit(1000.0));
        assert_eq!(parse_formula("''").unwrap(), *lit(""));
    }

    #[test]
    fn keywords_need_word_boundaries() {
        assert_eq!(
            parse_formula("Truex").unwrap(),
            Expr::Name("Truex".to_string())
        );
        assert!(matches!(
            parse_formula("1 not in [2]").unwrap(),
            Expr::Compare(_, ops) if ops[0].0 == CompareOp::NotIn
        ));
    }

    #[test]
    fn reports_offsets() {
        let err = parse_formula("1 + * 2").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { .. }), "{err:?}");
        assert!(parse_formula("").is_err());
        assert!(parse_formula("(1, 2").is_err());
        assert!(parse_formula("'unterminated").is_err());
    }

    fn nested(open: &str, core: &str, close: &str, levels: usize) -> String {
        format!("{}{core}{}", open.repeat(levels), close.repeat(levels))
    }

    #[test]
    fn nesting_within_the_limit_parses() {
        assert_eq!(
            parse_formula(&nested("(", "1", ")", MAX_NESTING)).unwrap(),
            *lit(1i64)
        );
        assert!(parse_formula(&nested("[", "1", "]", MAX_NESTING)).is_ok());
        assert!(parse_formula(&format!("{}1", "-".repeat(MAX_NESTING))).is_ok());
        assert!(parse_formula(&vec!["1"; MAX_NESTING + 1].join(" + ")).is_ok());
    }

    #[test]
    fn nesting_past_the_limit_is_a_parse_error() {
        let deep = [
            nested("(", "1", ")", 200_000),
            nested("[", "1", "]", MAX_NESTING + 1),
            nested("{'k': ", "1", "}", MAX_NESTING + 1),
            format!("{}1", "-".repeat(200_000)),
            format!("{}True", "not ".repeat(MAX_NESTING + 1)),
            vec!["2"; MAX_NESTING + 2].join(" ** "),
            vec!["1"; MAX_NESTING + 2].join(" + "),
            format!("x{}", "[0]".repeat(MAX_NESTING + 1)),
        ];
        for formula in &deep {
            match parse_formula(formula) {
                Err(FormulaError::Parse { message, .. }) => {
                    assert!(message.contains("nested deeper"), "{message}")
                }
                other => panic!("expected a nesting error, got {other:?}"),
            }
        }
    }
}
