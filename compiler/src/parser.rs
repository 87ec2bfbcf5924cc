// Parser for signal notation (.sig) source files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators. Operator precedence: `*` `/` `%` bind tighter than `+` `-`;
// both levels associate to the left. `@` binds tightest and takes a simple
// operand (number, call, name or parenthesized expression).
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;
use crate::sig::BinOp;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a signal notation source string. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

fn join(lhs: &Expr, rhs: &Expr) -> Span {
    (lhs.span.start()..rhs.span.end()).into()
}

fn binary(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
    Expr {
        span: join(&lhs, &rhs),
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Newlines ──

    let nl = just(Token::Newline).repeated().ignored();

    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Expressions ──

    let expr = {
        let ident = ident.clone();
        recursive(move |expr| {
            let literal = select! {
                Token::Int(n) => ExprKind::Int(n),
                Token::Real(v) => ExprKind::Real(v),
                Token::StringLit(s) => ExprKind::Str(s),
            }
            .map_with(|kind, e| Expr {
                kind,
                span: e.span(),
            });

            // A leading `-` is accepted on numeric literals only.
            let negative = just(Token::Minus)
                .ignore_then(select! {
                    Token::Int(n) => ExprKind::Int(-n),
                    Token::Real(v) => ExprKind::Real(-v),
                })
                .map_with(|kind, e| Expr {
                    kind,
                    span: e.span(),
                });

            let call = ident
                .clone()
                .then(
                    expr.clone()
                        .separated_by(just(Token::Comma))
                        .collect::<Vec<_>>()
                        .delimited_by(just(Token::LParen), just(Token::RParen)),
                )
                .map_with(|(name, args), e| Expr {
                    kind: ExprKind::Call { name, args },
                    span: e.span(),
                });

            let paren = expr
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen));

            let name = ident.clone().map(|id| Expr {
                span: id.span,
                kind: ExprKind::Name(id),
            });

            let simple = choice((literal, negative, call, paren, name));

            // ── Delay-line read: IDENT '@' simple ──

            let delay_read = ident
                .clone()
                .then_ignore(just(Token::At))
                .then(simple.clone())
                .map_with(|(line, delay), e| Expr {
                    kind: ExprKind::DelayRead {
                        line,
                        delay: Box::new(delay),
                    },
                    span: e.span(),
                });

            let atom = delay_read.or(simple);

            let product_op = choice((
                just(Token::Star).to(BinOp::Mul),
                just(Token::Slash).to(BinOp::Div),
                just(Token::Percent).to(BinOp::Rem),
            ));
            let product = atom
                .clone()
                .foldl(product_op.then(atom).repeated(), |lhs, (op, rhs)| {
                    binary(lhs, op, rhs)
                });

            let sum_op = choice((
                just(Token::Plus).to(BinOp::Add),
                just(Token::Minus).to(BinOp::Sub),
            ));
            product
                .clone()
                .foldl(sum_op.then(product).repeated(), |lhs, (op, rhs)| {
                    binary(lhs, op, rhs)
                })
        })
    };

    // ── Statements ──

    let index = select! {
        Token::Int(n) if (0..=u32::MAX as i64).contains(&n) => n as u32,
    };
    let size = select! {
        Token::Int(n) if (1..=u32::MAX as i64).contains(&n) => n as u32,
    };

    let let_stmt = just(Token::Let)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|(name, value)| StatementKind::Let { name, value });

    let out_stmt = just(Token::Out)
        .ignore_then(index.map_with(|n, e| (n, e.span())))
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|((index, index_span), value)| StatementKind::Out {
            index,
            index_span,
            value,
        });

    let control_stmt = just(Token::Control)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|(name, value)| StatementKind::Control { name, value });

    let delay_line_stmt = just(Token::DelayLine)
        .ignore_then(ident.clone())
        .then(size.delimited_by(just(Token::LBracket), just(Token::RBracket)))
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|((name, size), value)| StatementKind::DelayLine { name, size, value });

    let shared_stmt = just(Token::Shared)
        .ignore_then(ident)
        .then_ignore(just(Token::Equals))
        .then(expr)
        .map(|(name, value)| StatementKind::Shared { name, value });

    // ── Statement dispatch ──

    let statement = choice((
        let_stmt,
        out_stmt,
        control_stmt,
        delay_line_stmt,
        shared_stmt,
    ))
    .map_with(|kind, e| Statement {
        kind,
        span: e.span(),
    });

    // ── Program ──

    nl.clone()
        .ignore_then(
            statement
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(move |statements, e| Program {
            statements,
            span: e.span(),
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.program.expect("expected program")
    }

    fn parse_all(source: &str) -> (Option<Program>, Vec<Rich<'static, Token, SimpleSpan>>) {
        let result = parse(source);
        (result.program, result.errors)
    }

    fn parse_one_stmt(source: &str) -> Statement {
        let prog = parse_ok(source);
        assert_eq!(prog.statements.len(), 1, "expected 1 statement");
        prog.statements.into_iter().next().unwrap()
    }

    /// Parse `out 0 = <src>` and return the expression.
    fn parse_expr(src: &str) -> Expr {
        let s = parse_one_stmt(&format!("out 0 = {src}"));
        let StatementKind::Out { value, .. } = s.kind else {
            panic!("expected Out")
        };
        value
    }

    /// Render an expression fully parenthesized, for precedence checks.
    fn show(e: &Expr) -> String {
        match &e.kind {
            ExprKind::Int(n) => n.to_string(),
            ExprKind::Real(v) => format!("{v:?}"),
            ExprKind::Str(s) => format!("{s:?}"),
            ExprKind::Name(id) => id.name.clone(),
            ExprKind::Call { name, args } => {
                let args: Vec<String> = args.iter().map(show).collect();
                format!("{}({})", name.name, args.join(", "))
            }
            ExprKind::DelayRead { line, delay } => format!("{}@{}", line.name, show(delay)),
            ExprKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", show(lhs), op.symbol(), show(rhs))
            }
        }
    }

    // ── Empty / blank ──

    #[test]
    fn empty_program() {
        let prog = parse_ok("");
        assert!(prog.statements.is_empty());
    }

    #[test]
    fn blank_lines_and_comments_only() {
        let prog = parse_ok("\n# nothing here\n\n");
        assert!(prog.statements.is_empty());
    }

    // ── Statements ──

    #[test]
    fn let_binding() {
        let s = parse_one_stmt("let x = input(0)");
        let StatementKind::Let { name, value } = &s.kind else {
            panic!("expected Let")
        };
        assert_eq!(name.name, "x");
        assert_eq!(show(value), "input(0)");
    }

    #[test]
    fn out_statement() {
        let s = parse_one_stmt("out 3 = 1.5");
        let StatementKind::Out { index, value, .. } = &s.kind else {
            panic!("expected Out")
        };
        assert_eq!(*index, 3);
        assert!(matches!(value.kind, ExprKind::Real(v) if v == 1.5));
    }

    #[test]
    fn control_statement() {
        let s = parse_one_stmt(r#"control gain = slider("gain", 0.5)"#);
        let StatementKind::Control { name, value } = &s.kind else {
            panic!("expected Control")
        };
        assert_eq!(name.name, "gain");
        assert_eq!(show(value), r#"slider("gain", 0.5)"#);
    }

    #[test]
    fn delay_line_statement() {
        let s = parse_one_stmt("delayline d[16] = input(0)");
        let StatementKind::DelayLine { name, size, .. } = &s.kind else {
            panic!("expected DelayLine")
        };
        assert_eq!(name.name, "d");
        assert_eq!(*size, 16);
    }

    #[test]
    fn shared_statement() {
        let s = parse_one_stmt("shared V1 = sin(input(0))");
        let StatementKind::Shared { name, value } = &s.kind else {
            panic!("expected Shared")
        };
        assert_eq!(name.name, "V1");
        assert_eq!(show(value), "sin(input(0))");
    }

    #[test]
    fn multiple_statements() {
        let prog = parse_ok("let x = input(0)\n\nout 0 = x + x\nout 1 = x\n");
        assert_eq!(prog.statements.len(), 3);
    }

    #[test]
    fn statement_span_covers_line() {
        let s = parse_one_stmt("out 0 = 1 + 2");
        assert_eq!(s.span.start(), 0);
        assert_eq!(s.span.end(), 13);
    }

    // ── Expressions ──

    #[test]
    fn precedence() {
        assert_eq!(show(&parse_expr("1 + 2 * 3")), "(1 + (2 * 3))");
        assert_eq!(show(&parse_expr("(1 + 2) * 3")), "((1 + 2) * 3)");
        assert_eq!(show(&parse_expr("a % b - c / d")), "((a % b) - (c / d))");
    }

    #[test]
    fn left_associative() {
        assert_eq!(show(&parse_expr("a - b - c")), "((a - b) - c)");
        assert_eq!(show(&parse_expr("a / b / c")), "((a / b) / c)");
    }

    #[test]
    fn binary_span_joins_operands() {
        let e = parse_expr("a + bb");
        assert_eq!(e.span.start(), 8);
        assert_eq!(e.span.end(), 14);
    }

    #[test]
    fn negative_literals() {
        assert_eq!(show(&parse_expr("-1")), "-1");
        assert_eq!(show(&parse_expr("x * -0.5")), "(x * -0.5)");
    }

    #[test]
    fn calls_with_multiple_args() {
        assert_eq!(
            show(&parse_expr("max(sin(x), 2 * y)")),
            "max(sin(x), (2 * y))"
        );
    }

    #[test]
    fn delay_read_binds_tightest() {
        assert_eq!(show(&parse_expr("d@3 + 1")), "(d@3 + 1)");
        assert_eq!(show(&parse_expr("d@(n + 1)")), "d@(n + 1)");
    }

    // ── Errors ──

    #[test]
    fn missing_expression_is_error() {
        let (_, errors) = parse_all("out 0 =");
        assert!(!errors.is_empty());
    }

    #[test]
    fn two_statements_on_one_line_is_error() {
        let (_, errors) = parse_all("out 0 = 1 out 1 = 2");
        assert!(!errors.is_empty());
    }

    #[test]
    fn zero_sized_delay_line_is_error() {
        let (_, errors) = parse_all("delayline d[0] = 1");
        assert!(!errors.is_empty());
    }

    #[test]
    fn lex_errors_are_merged() {
        let (_, errors) = parse_all("out 0 = $");
        assert!(errors.iter().any(|e| e.to_string().contains("unexpected input")));
    }
}
