//! Tokens of the DSLX subset, produced with logos.

use std::fmt;
use std::ops::Range;

use logos::Logos;

use crate::dslx::error::CompileError;
use crate::location::{FileName, LineIndex};

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[token("fn")]
    Fn,
    #[token("proc")]
    Proc,
    #[token("pub")]
    Pub,
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("import")]
    Import,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("as")]
    As,
    #[token("chan")]
    Chan,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex("[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),
    #[regex("0[xX][0-9a-fA-F_]+|0[bB][01_]+|[0-9][0-9_]*", |lex| lex.slice().to_owned())]
    Number(String),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token("=")]
    Assign,

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
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Fn => "fn",
            Self::Proc => "proc",
            Self::Pub => "pub",
            Self::Let => "let",
            Self::Const => "const",
            Self::Import => "import",
            Self::If => "if",
            Self::Else => "else",
            Self::As => "as",
            Self::Chan => "chan",
            Self::True => "true",
            Self::False => "false",
            Self::Ident(name) => return write!(f, "identifier `{name}`"),
            Self::Number(digits) => return write!(f, "number `{digits}`"),
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Semi => ";",
            Self::ColonColon => "::",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Arrow => "->",
            Self::Assign => "=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::Caret => "^",
            Self::Bang => "!",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::Gt => ">",
        };
        write!(f, "`{text}`")
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub range: Range<usize>,
}

pub fn tokenize(source: &str, file: &FileName) -> Result<Vec<SpannedToken>, CompileError> {
    let mut tokens = Vec::new();
    for (token, range) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push(SpannedToken { token, range }),
            Err(()) => {
                let span = LineIndex::new(source).span(range.clone(), file);
                return Err(CompileError::syntax(
                    span,
                    format!("unexpected character sequence `{}`", &source[range]),
                ));
            }
        }
    }
    Ok(tokens)
}

/// Parses the digits of a number token, honoring `0x`/`0b` prefixes and `_` separators.
pub fn number_value(digits: &str) -> Option<u128> {
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let (radix, body) = match cleaned.get(..2) {
        Some("0x") | Some("0X") => (16, &cleaned[2..]),
        Some("0b") | Some("0B") => (2, &cleaned[2..]),
        _ => (10, cleaned.as_str()),
    };
    if body.is_empty() {
        return None;
    }
    u128::from_str_radix(body, radix).ok()
}
