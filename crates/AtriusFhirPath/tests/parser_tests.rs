use atrius_fhir_path::parser::{Expression, Invocation, Literal, Term, TypeSpecifier, parser};
use chumsky::Parser;
use rust_decimal::Decimal;

fn parse(input: &str) -> Expression {
    parser().parse(input).into_result().unwrap_or_else(|e| {
        panic!("Parser error for input '{}': {:?}", input, e);
    })
}

fn member(name: &str) -> Expression {
    Expression::Term(Term::Invocation(Invocation::Member(name.to_string())))
}

#[test]
fn test_literals() {
    assert_eq!(parse("true"), Expression::Term(Term::Literal(Literal::Boolean(true))));
    assert_eq!(parse("{}"), Expression::Term(Term::Literal(Literal::Null)));
    assert_eq!(parse("42"), Expression::Term(Term::Literal(Literal::Integer(42))));
    assert_eq!(
        parse("1.50"),
        Expression::Term(Term::Literal(Literal::Number(Decimal::new(150, 2))))
    );
    assert_eq!(
        parse("'it\\'s'"),
        Expression::Term(Term::Literal(Literal::String("it's".to_string())))
    );
}

#[test]
fn test_date_formats() {
    assert_eq!(
        parse("@2015-02-04"),
        Expression::Term(Term::Literal(Literal::Date("2015-02-04".to_string())))
    );
    assert_eq!(
        parse("@2015-02-04T14:34:28.123+09:00"),
        Expression::Term(Term::Literal(Literal::DateTime(
            "2015-02-04T14:34:28.123+09:00".to_string()
        )))
    );
    assert_eq!(
        parse("@T14:34"),
        Expression::Term(Term::Literal(Literal::Time("14:34".to_string())))
    );
    assert_eq!(
        parse("@2015T"),
        Expression::Term(Term::Literal(Literal::DateTime("2015T".to_string())))
    );
}

#[test]
fn test_member_chain_and_functions() {
    let expected = Expression::Invocation(
        Box::new(Expression::Invocation(Box::new(member("Patient")), Invocation::Member("name".to_string()))),
        Invocation::Function("first".to_string(), vec![]),
    );
    assert_eq!(parse("Patient.name.first()"), expected);

    match parse("extension('http://example.org/a.b')") {
        Expression::Term(Term::Invocation(Invocation::Function(name, args))) => {
            assert_eq!(name, "extension");
            assert_eq!(
                args,
                vec![Expression::Term(Term::Literal(Literal::String("http://example.org/a.b".to_string())))]
            );
        }
        other => panic!("unexpected parse: {:?}", other),
    }
}

#[test]
fn test_external_constants() {
    assert_eq!(
        parse("%resource"),
        Expression::Term(Term::ExternalConstant("resource".to_string()))
    );
    assert_eq!(
        parse("%'quoted name'"),
        Expression::Term(Term::ExternalConstant("quoted name".to_string()))
    );
    assert!(matches!(
        parse("%resource.name"),
        Expression::Invocation(_, Invocation::Member(name)) if name == "name"
    ));
}

#[test]
fn test_operator_precedence() {
    // and binds tighter than or
    match parse("a or b and c") {
        Expression::Or(left, op, right) => {
            assert_eq!(op, "or");
            assert_eq!(*left, member("a"));
            assert!(matches!(*right, Expression::And(_, _)));
        }
        other => panic!("unexpected parse: {:?}", other),
    }
    // multiplication binds tighter than addition
    assert!(matches!(parse("1 + 2 * 3"), Expression::Additive(_, op, _) if op == "+"));
    assert!(matches!(parse("a = b and c != d"), Expression::And(_, _)));
    assert!(matches!(
        parse("value is Quantity"),
        Expression::Type(_, op, TypeSpecifier::QualifiedIdentifier(name, None)) if op == "is" && name == "Quantity"
    ));
}

#[test]
fn test_indexer_and_comments() {
    assert!(matches!(parse("name[0].given"), Expression::Invocation(_, _)));
    assert!(matches!(parse("entry[1]"), Expression::Indexer(_, _)));
    assert_eq!(parse("name // trailing comment"), member("name"));
    assert_eq!(parse("/* leading */ name"), member("name"));
}

#[test]
fn test_invalid_expressions() {
    for input in ["Patient.", "name.where(", "'unterminated", "1 +", ")"] {
        assert!(
            parser().parse(input).into_result().is_err(),
            "expected '{}' to fail",
            input
        );
    }
}
