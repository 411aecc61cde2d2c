//! # Path Expression Parser
//!
//! Parses the FHIRPath subset used by translation schemas into an [`Expression`]
//! tree. The grammar keeps the FHIRPath operator precedence:
//!
//! 1. Terms: literals, identifiers, `%constants`, function calls, `( ... )`
//! 2. Postfix: member access and calls (`.name`, `.fn(...)`), indexers (`[n]`)
//! 3. Prefix polarity (`+`, `-`)
//! 4. `*`, `/`, `div`, `mod`
//! 5. `+`, `-`, `&`
//! 6. `|`
//! 7. `<`, `<=`, `>`, `>=`
//! 8. `is`, `as`
//! 9. `=`, `~`, `!=`, `!~`
//! 10. `in`, `contains`
//! 11. `and`
//! 12. `or`, `xor`
//! 13. `implies`
//!
//! Date and time literals (`@2024-01-15`, `@2024-01-15T10:00:00Z`, `@T10:00`) are kept
//! as their source text; comparisons on them are lexical, which is correct for values
//! of equal precision.
//!
//! ```rust
//! use atrius_fhir_path::parser::{parser, Expression};
//! use chumsky::Parser;
//!
//! let expr = parser().parse("Bundle.entry.resource.ofType(Patient)").into_result();
//! assert!(matches!(expr, Ok(Expression::Invocation(_, _))));
//! ```

use chumsky::Parser;
use chumsky::error::Rich;
use chumsky::prelude::*;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `{}`
    Null,
    Boolean(bool),
    String(String),
    /// Decimal numbers (with a decimal point)
    Number(Decimal),
    Integer(i64),
    /// `@2022-01-01`, stored without the `@`
    Date(String),
    /// `@2022-01-01T10:00:00Z`, stored without the `@`
    DateTime(String),
    /// `@T12:00:00`, stored without the `@T`
    Time(String),
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Term(Term),
    /// `left.invocation`
    Invocation(Box<Expression>, Invocation),
    /// `left[index]`
    Indexer(Box<Expression>, Box<Expression>),
    Polarity(char, Box<Expression>),
    Multiplicative(Box<Expression>, String, Box<Expression>),
    Additive(Box<Expression>, String, Box<Expression>),
    Type(Box<Expression>, String, TypeSpecifier),
    Union(Box<Expression>, Box<Expression>),
    Inequality(Box<Expression>, String, Box<Expression>),
    Equality(Box<Expression>, String, Box<Expression>),
    Membership(Box<Expression>, String, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    /// `or` / `xor`
    Or(Box<Expression>, String, Box<Expression>),
    Implies(Box<Expression>, Box<Expression>),
}

/// Type name in `is` / `as` operations, optionally namespace qualified
/// (`FHIR.Patient`, `System.String`).
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpecifier {
    QualifiedIdentifier(String, Option<String>),
}

impl TypeSpecifier {
    /// The unqualified type name.
    pub fn name(&self) -> &str {
        match self {
            TypeSpecifier::QualifiedIdentifier(_, Some(type_name)) => type_name,
            TypeSpecifier::QualifiedIdentifier(name, None) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Invocation(Invocation),
    Literal(Literal),
    /// `%name` or `%'quoted name'`
    ExternalConstant(String),
    Parenthesized(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Member(String),
    Function(String, Vec<Expression>),
    /// `$this`
    This,
    /// `$index`
    Index,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "{{}}"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Number(d) => write!(f, "{}", d),
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Date(d) => write!(f, "@{}", d),
            Literal::DateTime(dt) => write!(f, "@{}", dt),
            Literal::Time(t) => write!(f, "@T{}", t),
        }
    }
}

/// Whitespace plus `//` and `/* */` comments around `parser`.
fn custom_padded<'src, T, P>(
    parser: P,
) -> impl Parser<'src, &'src str, T, extra::Err<Rich<'src, char>>> + Clone
where
    P: Parser<'src, &'src str, T, extra::Err<Rich<'src, char>>> + Clone,
    T: Clone,
{
    let ws_or_comment = choice((
        text::whitespace().at_least(1).ignored(),
        just("//")
            .then(any().and_is(text::newline().or(end()).not()).repeated())
            .ignored(),
        just("/*")
            .then(any().and_is(just("*/").not()).repeated())
            .then(just("*/"))
            .ignored(),
    ))
    .repeated()
    .ignored();

    ws_or_comment
        .then(parser)
        .map(|(_, result)| result)
        .then_ignore(ws_or_comment)
}

/// Fixed-width run of ASCII digits.
fn digits<'src>(
    count: usize,
) -> impl Parser<'src, &'src str, String, extra::Err<Rich<'src, char>>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .exactly(count)
        .collect::<String>()
}

/// Builds the expression parser. The whole input must be consumed.
pub fn parser<'src>()
-> impl Parser<'src, &'src str, Expression, extra::Err<Rich<'src, char>>> + Clone + 'src {
    let esc = just('\\').ignore_then(choice((
        just('`').to('`'),
        just('\'').to('\''),
        just('\\').to('\\'),
        just('/').to('/'),
        just('f').to('\u{000C}'),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        just('"').to('"'),
        just('u').ignore_then(
            any()
                .filter(|c: &char| c.is_ascii_hexdigit())
                .repeated()
                .exactly(4)
                .collect::<String>()
                .try_map(
                    |hex: String, span| match u32::from_str_radix(&hex, 16) {
                        Ok(code) => char::from_u32(code)
                            .ok_or_else(|| Rich::custom(span, "Invalid Unicode code point")),
                        Err(_) => Err(Rich::custom(span, "Invalid hex digits")),
                    },
                ),
        ),
    )));

    macro_rules! padded {
        ($p:expr) => {
            custom_padded($p)
        };
    }

    let null = just('{').then(just('}')).to(Literal::Null);

    // Before identifiers, or `true` would become a member access
    let boolean = choice((
        text::keyword("true").to(Literal::Boolean(true)),
        text::keyword("false").to(Literal::Boolean(false)),
    ))
    .boxed();

    let quoted = just('\'')
        .ignore_then(none_of("\\\'").or(esc).repeated().collect::<String>())
        .then_ignore(just('\''));
    let string = quoted.clone().map(Literal::String).boxed();

    let unsigned = any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1)
        .collect::<String>();

    let integer = unsigned
        .clone()
        .try_map(|text: String, span| {
            i64::from_str(&text)
                .map(Literal::Integer)
                .map_err(|_| Rich::custom(span, format!("Invalid integer: {}", text)))
        })
        .padded();

    let number = unsigned
        .clone()
        .then_ignore(just('.'))
        .then(unsigned.clone())
        .try_map(|(whole, fraction), span| {
            let text = format!("{}.{}", whole, fraction);
            Decimal::from_str(&text)
                .map(Literal::Number)
                .map_err(|_| Rich::custom(span, format!("Invalid number: {}", text)))
        })
        .padded();

    // YYYY(-MM(-DD)?)?
    let date_text = digits(4)
        .then(just('-').ignore_then(digits(2)).then(just('-').ignore_then(digits(2)).or_not()).or_not())
        .map(|(year, rest)| match rest {
            None => year,
            Some((month, None)) => format!("{}-{}", year, month),
            Some((month, Some(day))) => format!("{}-{}-{}", year, month, day),
        })
        .boxed();

    // HH(:mm(:ss(.fff)?)?)?
    let fraction = just('.').ignore_then(
        any()
            .filter(|c: &char| c.is_ascii_digit())
            .repeated()
            .at_least(1)
            .at_most(9)
            .collect::<String>(),
    );
    let time_text = digits(2)
        .then(
            just(':')
                .ignore_then(digits(2))
                .then(just(':').ignore_then(digits(2)).then(fraction.or_not()).or_not())
                .or_not(),
        )
        .map(|(hours, rest)| {
            let mut text = hours;
            if let Some((minutes, seconds)) = rest {
                text.push(':');
                text.push_str(&minutes);
                if let Some((seconds, fraction)) = seconds {
                    text.push(':');
                    text.push_str(&seconds);
                    if let Some(fraction) = fraction {
                        text.push('.');
                        text.push_str(&fraction);
                    }
                }
            }
            text
        })
        .boxed();

    let timezone = just('Z').to("Z".to_string()).or(one_of("+-")
        .then(digits(2))
        .then_ignore(just(':'))
        .then(digits(2))
        .map(|((sign, hours), minutes)| format!("{}{}:{}", sign, hours, minutes)));

    let datetime_literal = just('@')
        .ignore_then(date_text.clone())
        .then_ignore(just('T'))
        .then(time_text.clone().or_not())
        .then(timezone.or_not())
        .map(|((date, time), zone)| {
            let mut text = format!("{}T", date);
            if let Some(time) = time {
                text.push_str(&time);
            }
            if let Some(zone) = zone {
                text.push_str(&zone);
            }
            Literal::DateTime(text)
        });

    let time_literal = just("@T").ignore_then(time_text).map(Literal::Time);

    let date_literal = just('@').ignore_then(date_text).map(Literal::Date);

    // Decimal before integer, and the date forms from most to least specific
    let literal = choice((
        null,
        boolean,
        string,
        number,
        integer,
        padded!(time_literal),
        padded!(datetime_literal),
        padded!(date_literal),
    ))
    .map(Term::Literal);

    let standard_identifier = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(first, rest): (char, Vec<char>)| {
            let mut name = first.to_string();
            name.extend(rest);
            name
        })
        .padded();

    let delimited_identifier = just('`')
        .ignore_then(none_of("`").or(esc).repeated().collect::<String>())
        .then_ignore(just('`'))
        .padded();

    let identifier = choice((standard_identifier, delimited_identifier));

    let qualified_identifier = identifier
        .clone()
        .then(just('.').ignore_then(identifier.clone()).or_not())
        .map(|(first, second)| match second {
            Some(type_name) => TypeSpecifier::QualifiedIdentifier(first, Some(type_name)),
            None => TypeSpecifier::QualifiedIdentifier(first, None),
        })
        .boxed();
    let qualified_identifier = padded!(qualified_identifier);

    let external_constant = just('%')
        .ignore_then(choice((identifier.clone(), quoted.padded())))
        .map(Term::ExternalConstant)
        .padded();

    let expression = recursive(|expr| {
        let arguments = expr
            .clone()
            .boxed()
            .separated_by(just(',').padded())
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just('(').padded(), just(')').padded());

        let atom = choice((
            literal.clone().map(Expression::Term).boxed(),
            external_constant.clone().map(Expression::Term).boxed(),
            // Calls before bare identifiers
            identifier
                .clone()
                .then(arguments.clone())
                .map(|(name, params)| {
                    Expression::Term(Term::Invocation(Invocation::Function(name, params)))
                })
                .boxed(),
            choice((
                identifier.clone().map(Invocation::Member),
                just("$this").to(Invocation::This),
                just("$index").to(Invocation::Index),
            ))
            .map(Term::Invocation)
            .map(Expression::Term)
            .boxed(),
            expr.clone()
                .boxed()
                .delimited_by(just('(').padded(), just(')').padded())
                .map(|inner| Expression::Term(Term::Parenthesized(Box::new(inner))))
                .boxed(),
        ))
        .padded();

        let postfix_op = choice((
            just('.')
                .ignore_then(identifier.clone().then(arguments.clone().or_not()))
                .map(|(name, params)| {
                    let invocation = match params {
                        Some(params) => Invocation::Function(name, params),
                        None => Invocation::Member(name),
                    };
                    Box::new(move |left: Expression| {
                        Expression::Invocation(Box::new(left), invocation.clone())
                    }) as Box<dyn Fn(Expression) -> Expression>
                }),
            expr.clone()
                .delimited_by(just('[').padded(), just(']').padded())
                .map(|index| {
                    Box::new(move |left: Expression| {
                        Expression::Indexer(Box::new(left), Box::new(index.clone()))
                    }) as Box<dyn Fn(Expression) -> Expression>
                }),
        ))
        .boxed();

        let atom_with_postfix = atom
            .then(postfix_op.repeated().collect::<Vec<_>>())
            .map(|(left, ops)| ops.into_iter().fold(left, |acc, op| op(acc)));

        let prefix_op = choice((just('+').to('+'), just('-').to('-'))).padded();
        let term_with_polarity = prefix_op
            .repeated()
            .collect::<Vec<_>>()
            .then(atom_with_postfix)
            .map(|(ops, right)| {
                ops.into_iter()
                    .rev()
                    .fold(right, |acc, op| Expression::Polarity(op, Box::new(acc)))
            })
            .boxed();

        let op_mul = choice((
            just('*').to("*"),
            just('/').to("/"),
            text::keyword("div").to("div"),
            text::keyword("mod").to("mod"),
        ))
        .padded();
        let multiplicative = term_with_polarity
            .clone()
            .then(op_mul.then(term_with_polarity).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    Expression::Multiplicative(Box::new(acc), op.to_string(), Box::new(right))
                })
            })
            .boxed();

        let op_add = choice((just('+').to("+"), just('-').to("-"), just('&').to("&"))).padded();
        let additive = multiplicative
            .clone()
            .then(op_add.then(multiplicative).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    Expression::Additive(Box::new(acc), op.to_string(), Box::new(right))
                })
            })
            .boxed();

        let union = additive
            .clone()
            .then(just('|').padded().ignore_then(additive).repeated().collect::<Vec<_>>())
            .map(|(left, rights)| {
                rights.into_iter().fold(left, |acc, right| {
                    Expression::Union(Box::new(acc), Box::new(right))
                })
            })
            .boxed();

        let op_ineq = choice((
            just("<=").to("<="),
            just("<").to("<"),
            just(">=").to(">="),
            just(">").to(">"),
        ))
        .padded();
        let inequality = union
            .clone()
            .then(op_ineq.then(union).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    Expression::Inequality(Box::new(acc), op.to_string(), Box::new(right))
                })
            })
            .boxed();

        let op_type = choice((text::keyword("is").to("is"), text::keyword("as").to("as"))).padded();
        let type_expr = inequality
            .clone()
            .then(op_type.then(qualified_identifier.clone()).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, type_spec)| {
                    Expression::Type(Box::new(acc), op.to_string(), type_spec)
                })
            })
            .boxed();

        let op_eq = choice((
            just("=").to("="),
            just("~").to("~"),
            just("!=").to("!="),
            just("!~").to("!~"),
        ))
        .padded();
        let equality = type_expr
            .clone()
            .then(op_eq.then(type_expr).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    Expression::Equality(Box::new(acc), op.to_string(), Box::new(right))
                })
            })
            .boxed();

        let op_mem = choice((
            text::keyword("in").to("in"),
            text::keyword("contains").to("contains"),
        ))
        .padded();
        let membership = equality
            .clone()
            .then(op_mem.then(equality).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    Expression::Membership(Box::new(acc), op.to_string(), Box::new(right))
                })
            })
            .boxed();

        let logical_and = membership
            .clone()
            .then(
                text::keyword("and")
                    .padded()
                    .ignore_then(membership)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(left, rights)| {
                rights.into_iter().fold(left, |acc, right| {
                    Expression::And(Box::new(acc), Box::new(right))
                })
            })
            .boxed();

        let op_or = choice((text::keyword("or").to("or"), text::keyword("xor").to("xor"))).padded();
        let logical_or = logical_and
            .clone()
            .then(op_or.then(logical_and).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    Expression::Or(Box::new(acc), op.to_string(), Box::new(right))
                })
            })
            .boxed();

        logical_or
            .clone()
            .then(
                text::keyword("implies")
                    .padded()
                    .ignore_then(logical_or)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(left, rights)| {
                rights.into_iter().fold(left, |acc, right| {
                    Expression::Implies(Box::new(acc), Box::new(right))
                })
            })
    });

    // Comments may lead or trail the whole expression
    padded!(expression).then_ignore(end())
}
