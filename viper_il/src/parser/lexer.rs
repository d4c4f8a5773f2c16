use super::{ParseError, Span};
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"(//|#)[^\n]*")]
pub enum Token<'a> {
    // Instructions end at a newline or a semicolon.
    #[regex(r"[\n;]")]
    Newline,

    #[token("func")]
    Func,
    #[token("extern")]
    Extern,

    #[regex(r"@[A-Za-z_.$][A-Za-z0-9_.$]*", |lex| &lex.slice()[1..])]
    Global(&'a str),
    #[regex(r"%[A-Za-z0-9_.$]+", |lex| &lex.slice()[1..])]
    Temp(&'a str),
    #[regex(r"-?[0-9]+(\.[0-9]+([eE][-+]?[0-9]+)?|[eE][-+]?[0-9]+)", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    // Opcodes, types, labels and the `null`/`true`/`false` literals.
    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*")]
    Ident(&'a str),

    #[token("->")]
    Arrow,
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
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
}

impl std::fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Newline => f.write_str("end of line"),
            Token::Func => f.write_str("`func`"),
            Token::Extern => f.write_str("`extern`"),
            Token::Global(name) => write!(f, "`@{name}`"),
            Token::Temp(name) => write!(f, "`%{name}`"),
            Token::Float(value) => write!(f, "`{value:?}`"),
            Token::Int(value) => write!(f, "`{value}`"),
            Token::Ident(name) => write!(f, "`{name}`"),
            Token::Arrow => f.write_str("`->`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::LBrace => f.write_str("`{`"),
            Token::RBrace => f.write_str("`}`"),
            Token::Comma => f.write_str("`,`"),
            Token::Colon => f.write_str("`:`"),
            Token::Eq => f.write_str("`=`"),
        }
    }
}

/// Splits `source` into tokens with their byte spans.
pub fn tokenize(source: &str) -> Result<Vec<(Token<'_>, Span)>, ParseError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                return Err(ParseError::InvalidToken {
                    text: lexer.slice().to_owned(),
                    span: lexer.span(),
                })
            }
        }
    }
    Ok(tokens)
}
