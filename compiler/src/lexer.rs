// Lexer for stream graph source files (.str).
//
// Uses the `logos` crate for DFA-based lexing. Whitespace (including
// newlines) and `//` line comments are insignificant.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Stream language token types.
///
/// Identifiers carry no value; use the span to retrieve the text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+|//[^\n]*")]
pub enum Token {
    // ── Stream keywords ──
    #[token("filter")]
    Filter,
    #[token("pipeline")]
    Pipeline,
    #[token("splitjoin")]
    SplitJoin,
    #[token("feedbackloop")]
    FeedbackLoop,
    #[token("init")]
    Init,
    #[token("work")]
    Work,
    #[token("pop")]
    Pop,
    #[token("peek")]
    Peek,
    #[token("push")]
    Push,
    #[token("add")]
    Add,
    #[token("body")]
    Body,
    #[token("loop")]
    Loop,
    #[token("split")]
    Split,
    #[token("join")]
    Join,
    #[token("delay")]
    Delay,
    #[token("roundrobin")]
    RoundRobin,
    #[token("duplicate")]
    Duplicate,

    // ── Statement / type keywords ──
    #[token("int")]
    Int,
    #[token("float")]
    Float,
    #[token("bool")]
    Bool,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,

    // ── Symbols ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    // ── Literals ──
    //
    // Unsigned; negation is a unary operator folded by the pass.
    /// Real literal (`1.5`, `2.0e-3`).
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", parse_real)]
    Real(f64),

    /// Integer literal. Values that overflow `i64` are lex errors.
    #[regex(r"[0-9]+", parse_integer)]
    Integer(i64),

    // ── Identifier ──
    //
    // logos prioritises fixed `#[token]` matches over the regex for the same
    // length, so `init` lexes as Init, not Ident.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Filter => "filter",
            Token::Pipeline => "pipeline",
            Token::SplitJoin => "splitjoin",
            Token::FeedbackLoop => "feedbackloop",
            Token::Init => "init",
            Token::Work => "work",
            Token::Pop => "pop",
            Token::Peek => "peek",
            Token::Push => "push",
            Token::Add => "add",
            Token::Body => "body",
            Token::Loop => "loop",
            Token::Split => "split",
            Token::Join => "join",
            Token::Delay => "delay",
            Token::RoundRobin => "roundrobin",
            Token::Duplicate => "duplicate",
            Token::Int => "int",
            Token::Float => "float",
            Token::Bool => "bool",
            Token::True => "true",
            Token::False => "false",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::While => "while",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semi => ";",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Real(v) => return write!(f, "{v}"),
            Token::Integer(v) => return write!(f, "{v}"),
            Token::Ident => "<ident>",
        };
        write!(f, "{text}")
    }
}

// ── Callbacks ──

fn parse_real(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_integer(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex a source string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected input: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn stream_keywords() {
        let tokens = lex_ok("filter pipeline splitjoin feedbackloop init work add body loop");
        assert_eq!(
            tokens,
            vec![
                Token::Filter,
                Token::Pipeline,
                Token::SplitJoin,
                Token::FeedbackLoop,
                Token::Init,
                Token::Work,
                Token::Add,
                Token::Body,
                Token::Loop,
            ]
        );
    }

    #[test]
    fn keyword_prefix_is_ident() {
        // `initial` is an identifier, not `init` + `ial`
        let tokens = lex_ok("init initial");
        assert_eq!(tokens, vec![Token::Init, Token::Ident]);
    }

    #[test]
    fn compound_operators_win_over_prefixes() {
        let tokens = lex_ok("i++ j += 2 k <= n a == b c != d");
        assert_eq!(
            tokens,
            vec![
                Token::Ident,
                Token::PlusPlus,
                Token::Ident,
                Token::PlusAssign,
                Token::Integer(2),
                Token::Ident,
                Token::Le,
                Token::Ident,
                Token::Ident,
                Token::EqEq,
                Token::Ident,
                Token::Ident,
                Token::NotEq,
                Token::Ident,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        let tokens = lex_ok("42 3.5 1.0e3");
        assert_eq!(
            tokens,
            vec![Token::Integer(42), Token::Real(3.5), Token::Real(1000.0)]
        );
    }

    #[test]
    fn comments_and_newlines_skipped() {
        let tokens = lex_ok("add // a comment\n  A ( ) ;");
        assert_eq!(
            tokens,
            vec![
                Token::Add,
                Token::Ident,
                Token::LParen,
                Token::RParen,
                Token::Semi
            ]
        );
    }

    #[test]
    fn integer_overflow_is_error() {
        let result = lex("99999999999999999999");
        assert_eq!(result.errors.len(), 1);
        assert!(result.tokens.is_empty());
    }

    #[test]
    fn bad_character_recovers() {
        let result = lex("a # b");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 2, end: 3 });
        let tokens: Vec<Token> = result.tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec![Token::Ident, Token::Ident]);
    }

    #[test]
    fn spans_are_byte_offsets() {
        let result = lex("pop  n");
        assert_eq!(result.tokens[0].1, Span { start: 0, end: 3 });
        assert_eq!(result.tokens[1].1, Span { start: 5, end: 6 });
    }
}
