// Parser for stream graph source files (.str).
//
// Parses a token stream (from the lexer) into the surface AST. Uses chumsky
// combinators; binary operators are layered with `foldl` from loosest (`||`)
// to tightest (`* / %`).
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

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

fn binary(lhs: Expr, (op, rhs): (BinOp, Expr)) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

/// Unwrap a braced statement into its contents; wrap anything else.
fn into_body(stmt: Stmt) -> Vec<Stmt> {
    let Stmt { kind, span } = stmt;
    match kind {
        StmtKind::Block(stmts) => stmts,
        kind => vec![Stmt { kind, span }],
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
    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start..span.end].to_string(),
            span,
        }
    });

    let ty = select! {
        Token::Int => Type::Int,
        Token::Float => Type::Float,
        Token::Bool => Type::Bool,
    };

    // ── Expressions ──

    let expr = recursive(|expr| {
        let literal = select! {
            Token::Integer(n) = e => Expr::Int(n, e.span()),
            Token::Real(v) = e => Expr::Float(v, e.span()),
            Token::True = e => Expr::Bool(true, e.span()),
            Token::False = e => Expr::Bool(false, e.span()),
        };

        let pop = just(Token::Pop)
            .then(just(Token::LParen))
            .then(just(Token::RParen))
            .map_with(|_, e| Expr::Pop(e.span()));

        let peek = just(Token::Peek)
            .ignore_then(
                expr.clone()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|index, e| Expr::Peek(Box::new(index), e.span()));

        let atom = choice((
            literal,
            pop,
            peek,
            ident.clone().map(Expr::Var),
            expr.clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let unary = choice((
            just(Token::Minus).to(UnOp::Neg),
            just(Token::Bang).to(UnOp::Not),
        ))
        .map_with(|op, e| (op, e.span()))
        .repeated()
        .foldr(atom, |(op, op_span): (UnOp, SimpleSpan), rhs: Expr| {
            let span: SimpleSpan = (op_span.start..rhs.span().end).into();
            Expr::Unary(op, Box::new(rhs), span)
        });

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinOp::Mul),
                just(Token::Slash).to(BinOp::Div),
                just(Token::Percent).to(BinOp::Rem),
            ))
            .then(unary)
            .repeated(),
            binary,
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinOp::Add),
                just(Token::Minus).to(BinOp::Sub),
            ))
            .then(product)
            .repeated(),
            binary,
        );

        let compare = sum.clone().foldl(
            choice((
                just(Token::Le).to(BinOp::Le),
                just(Token::Ge).to(BinOp::Ge),
                just(Token::Lt).to(BinOp::Lt),
                just(Token::Gt).to(BinOp::Gt),
            ))
            .then(sum)
            .repeated(),
            binary,
        );

        let equality = compare.clone().foldl(
            choice((
                just(Token::EqEq).to(BinOp::Eq),
                just(Token::NotEq).to(BinOp::Ne),
            ))
            .then(compare)
            .repeated(),
            binary,
        );

        let conj = equality.clone().foldl(
            just(Token::AndAnd)
                .to(BinOp::And)
                .then(equality)
                .repeated(),
            binary,
        );

        conj.clone()
            .foldl(
                just(Token::OrOr).to(BinOp::Or).then(conj).repeated(),
                binary,
            )
            .boxed()
    });

    // ── Statements ──

    let stmt = recursive(|stmt| {
        let block = stmt
            .clone()
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace));

        let body = stmt.clone().map(into_body);

        let decl = ty
            .clone()
            .then(ident.clone())
            .then(just(Token::Assign).ignore_then(expr.clone()).or_not())
            .map_with(|((ty, name), init), e| Stmt {
                kind: StmtKind::Decl { ty, name, init },
                span: e.span(),
            });

        let assign_op = choice((
            just(Token::Assign).to(AssignOp::Set),
            just(Token::PlusAssign).to(AssignOp::Add),
            just(Token::MinusAssign).to(AssignOp::Sub),
            just(Token::StarAssign).to(AssignOp::Mul),
        ));

        let assign = ident
            .clone()
            .then(assign_op)
            .then(expr.clone())
            .map_with(|((name, op), value), e| Stmt {
                kind: StmtKind::Assign { name, op, value },
                span: e.span(),
            });

        // `x++` / `x--` desugar to `x += 1` / `x -= 1`.
        let bump = ident
            .clone()
            .then(choice((
                just(Token::PlusPlus).to(AssignOp::Add),
                just(Token::MinusMinus).to(AssignOp::Sub),
            )))
            .map_with(|(name, op), e| {
                let span: SimpleSpan = e.span();
                Stmt {
                    kind: StmtKind::Assign {
                        name,
                        op,
                        value: Expr::Int(1, span),
                    },
                    span,
                }
            });

        let simple = choice((decl, assign, bump));

        let for_header = simple
            .clone()
            .or_not()
            .then_ignore(just(Token::Semi))
            .then(expr.clone().or_not())
            .then_ignore(just(Token::Semi))
            .then(simple.clone().or_not())
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let for_stmt = just(Token::For)
            .ignore_then(for_header)
            .then(body.clone())
            .map_with(|(((init, cond), step), body), e| Stmt {
                kind: StmtKind::For {
                    init: init.map(Box::new),
                    cond,
                    step: step.map(Box::new),
                    body,
                },
                span: e.span(),
            });

        let paren_cond = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let if_stmt = just(Token::If)
            .ignore_then(paren_cond.clone())
            .then(body.clone())
            .then(just(Token::Else).ignore_then(body.clone()).or_not())
            .map_with(|((cond, then_body), else_body), e| Stmt {
                kind: StmtKind::If {
                    cond,
                    then_body,
                    else_body,
                },
                span: e.span(),
            });

        let while_stmt = just(Token::While)
            .ignore_then(paren_cond.clone())
            .then(body)
            .map_with(|(cond, body), e| Stmt {
                kind: StmtKind::While { cond, body },
                span: e.span(),
            });

        let push_stmt = just(Token::Push)
            .ignore_then(paren_cond)
            .then_ignore(just(Token::Semi))
            .map_with(|value, e| Stmt {
                kind: StmtKind::Push(value),
                span: e.span(),
            });

        let role = choice((
            just(Token::Add).to(ChildRole::Add),
            just(Token::Body).to(ChildRole::Body),
            just(Token::Loop).to(ChildRole::Loop),
        ));

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let instantiate = role
            .then(ident.clone())
            .then(args)
            .then_ignore(just(Token::Semi))
            .map_with(|((role, target), args), e| Stmt {
                kind: StmtKind::Instantiate { role, target, args },
                span: e.span(),
            });

        let block_stmt = block.map_with(|stmts, e| Stmt {
            kind: StmtKind::Block(stmts),
            span: e.span(),
        });

        let simple_stmt = simple.then_ignore(just(Token::Semi));

        let expr_stmt = expr
            .clone()
            .then_ignore(just(Token::Semi))
            .map_with(|value, e| Stmt {
                kind: StmtKind::Expr(value),
                span: e.span(),
            });

        choice((
            block_stmt,
            if_stmt,
            for_stmt,
            while_stmt,
            push_stmt,
            instantiate,
            simple_stmt,
            expr_stmt,
        ))
        .boxed()
    });

    let block = stmt
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // ── Stream sections ──

    let init_item = just(Token::Init)
        .ignore_then(block.clone())
        .map_with(|stmts, e| StreamItem::Init(stmts, e.span()));

    let rate = choice((
        just(Token::Pop).to(RateKind::Pop),
        just(Token::Peek).to(RateKind::Peek),
        just(Token::Push).to(RateKind::Push),
    ))
    .then(expr.clone());

    let work_item = just(Token::Work)
        .ignore_then(rate.repeated().collect::<Vec<_>>())
        .then(block)
        .map_with(|(rates, body), e| {
            StreamItem::Work(WorkDecl {
                rates,
                body,
                span: e.span(),
            })
        });

    let weights = choice((
        just(Token::Duplicate).map_with(|_, e| WeightsDecl {
            kind: WeightKind::Duplicate,
            weights: Vec::new(),
            span: e.span(),
        }),
        just(Token::RoundRobin)
            .ignore_then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen))
                    .or_not(),
            )
            .map_with(|weights, e| WeightsDecl {
                kind: WeightKind::RoundRobin,
                weights: weights.unwrap_or_default(),
                span: e.span(),
            }),
    ));

    let split_item = just(Token::Split)
        .ignore_then(weights.clone())
        .then_ignore(just(Token::Semi))
        .map(StreamItem::Split);

    let join_item = just(Token::Join)
        .ignore_then(weights)
        .then_ignore(just(Token::Semi))
        .map(StreamItem::Join);

    let delay_item = just(Token::Delay)
        .ignore_then(expr)
        .then_ignore(just(Token::Semi))
        .map_with(|delay, e| StreamItem::Delay(delay, e.span()));

    let item = choice((init_item, work_item, split_item, join_item, delay_item));

    // ── Stream declarations ──

    let kind = choice((
        just(Token::Filter).to(StreamKind::Filter),
        just(Token::Pipeline).to(StreamKind::Pipeline),
        just(Token::SplitJoin).to(StreamKind::SplitJoin),
        just(Token::FeedbackLoop).to(StreamKind::FeedbackLoop),
    ));

    let params = ty
        .then(ident.clone())
        .map(|(ty, name)| ParamDecl { ty, name })
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let decl = kind
        .then(ident)
        .then(params)
        .then(
            item.repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map_with(|(((kind, name), params), items), e| StreamDecl {
            kind,
            name,
            params,
            items,
            span: e.span(),
        });

    // ── Program ──

    decl.repeated()
        .collect::<Vec<_>>()
        .map_with(|decls, e| Program {
            decls,
            span: e.span(),
        })
}

// ── Tests ──
