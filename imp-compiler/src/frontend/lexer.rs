use logos::Logos;
use num_bigint::BigInt;
use std::fmt;

#[derive(Logos, Debug, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t\r\n]+")] // Whitespace
#[logos(skip r"#[^\n]*")] // Line comments starting with '#'
pub enum Token {
    // --- Keywords ---
    #[token("DECLARE")]
    Declare,
    #[token("BEGIN")]
    Begin,
    #[token("END")]
    End,
    #[token("IF")]
    If,
    #[token("THEN")]
    Then,
    #[token("ELSE")]
    Else,
    #[token("ENDIF")]
    Endif,
    #[token("WHILE")]
    While,
    #[token("DO")]
    Do,
    #[token("ENDWHILE")]
    Endwhile,
    #[token("REPEAT")]
    Repeat,
    #[token("UNTIL")]
    Until,
    #[token("FOR")]
    For,
    #[token("FROM")]
    From,
    #[token("TO")]
    To,
    #[token("DOWNTO")]
    Downto,
    #[token("ENDFOR")]
    Endfor,
    #[token("READ")]
    Read,
    #[token("WRITE")]
    Write,

    // --- Identifiers and numerals ---
    #[regex(r"[A-Za-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<BigInt>().ok())]
    Number(BigInt),

    // --- Operators ---
    #[token(":=")]
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
    #[token("=")]
    Eq,
    #[token("!=")]
    Neq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // --- Punctuation ---
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Declare => write!(f, "DECLARE"),
            Token::Begin => write!(f, "BEGIN"),
            Token::End => write!(f, "END"),
            Token::If => write!(f, "IF"),
            Token::Then => write!(f, "THEN"),
            Token::Else => write!(f, "ELSE"),
            Token::Endif => write!(f, "ENDIF"),
            Token::While => write!(f, "WHILE"),
            Token::Do => write!(f, "DO"),
            Token::Endwhile => write!(f, "ENDWHILE"),
            Token::Repeat => write!(f, "REPEAT"),
            Token::Until => write!(f, "UNTIL"),
            Token::For => write!(f, "FOR"),
            Token::From => write!(f, "FROM"),
            Token::To => write!(f, "TO"),
            Token::Downto => write!(f, "DOWNTO"),
            Token::Endfor => write!(f, "ENDFOR"),
            Token::Read => write!(f, "READ"),
            Token::Write => write!(f, "WRITE"),
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Assign => write!(f, ":="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "="),
            Token::Neq => write!(f, "!="),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
        }
    }
}

/// A token paired with its byte offset in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub start: usize,
}

/// Convert a byte position to 1-based line and column numbers.
pub fn position_to_line_col(source: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= position {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Tokenize the whole source.  Returns the token stream or the byte offset of
/// the first unrecognized character.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, usize> {
    let mut lexer = Token::lexer(source);
    let mut out = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => out.push(SpannedToken {
                token,
                start: span.start,
            }),
            Err(()) => return Err(span.start),
        }
    }
    Ok(out)
}
