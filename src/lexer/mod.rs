use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
pub enum Token {
    // Keywords
    #[token("var")]
    Var,
    #[token("fn")]
    Fn,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("write")]
    Write,
    #[token("beget")]
    Beget,
    #[token("self")]
    SelfKw,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Punctuation
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
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,

    // Operators
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
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("=")]
    Assign,

    // Literals
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    Text(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Strip the quotes from a string literal and process its escapes.
/// Unknown escapes fail the token.
fn unescape(quoted: &str) -> Option<String> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '"' => '"',
            '\\' => '\\',
            _ => return None,
        });
    }
    Some(out)
}

/// Lex source code into a stream of tokens with positions.
/// Stops at the first unrecognised input.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                let snippet = &source[span.clone()];
                return Err(LexError {
                    code: error_code(snippet),
                    position: span.start,
                    snippet: snippet.to_string(),
                    suggestion: suggest_fix(snippet),
                });
            }
        }
    }

    tracing::debug!(tokens = tokens.len(), bytes = source.len(), "lexed source");
    Ok(tokens)
}

fn error_code(bad_token: &str) -> &'static str {
    if bad_token.starts_with('"') { "B-L002" } else { "B-L001" }
}

/// Every lex error comes with a suggested fix.
fn suggest_fix(bad_token: &str) -> String {
    match bad_token {
        s if s.starts_with('"') && s.contains('\\') => {
            "Supported escapes are \\n \\t \\r \\0 \\\" and \\\\".to_string()
        }
        s if s.starts_with('"') => "Close the string with a matching '\"'".to_string(),
        "&" => "Use '&&' for logical and".to_string(),
        "|" => "Use '||' for logical or".to_string(),
        "'" => "Strings use double quotes: \"text\"".to_string(),
        s => format!("Unexpected character(s): '{s}'"),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub code: &'static str,
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_function_declaration() {
        let toks = kinds("fn add(a, b) { a + b }");
        assert_eq!(toks[0], Token::Fn);
        assert_eq!(toks[1], Token::Ident("add".into()));
        assert_eq!(toks[2], Token::LParen);
        assert!(toks.contains(&Token::Plus));
        assert_eq!(toks.last(), Some(&Token::RBrace));
    }

    #[test]
    fn lex_keywords_are_not_identifiers() {
        assert_eq!(
            kinds("var while beget self null variable"),
            vec![
                Token::Var,
                Token::While,
                Token::Beget,
                Token::SelfKw,
                Token::Null,
                Token::Ident("variable".into()),
            ]
        );
    }

    #[test]
    fn lex_two_char_operators() {
        assert_eq!(
            kinds("<= >= == != && || = <"),
            vec![
                Token::LessEq,
                Token::GreaterEq,
                Token::EqEq,
                Token::NotEq,
                Token::AndAnd,
                Token::OrOr,
                Token::Assign,
                Token::Less,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(kinds("1 2.5 10"), vec![Token::Number(1.0), Token::Number(2.5), Token::Number(10.0)]);
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(kinds(r#""a\tb\n\"q\"""#), vec![Token::Text("a\tb\n\"q\"".into())]);
    }

    #[test]
    fn lex_spans_are_byte_ranges() {
        let toks = lex("write(x)").unwrap();
        assert_eq!(toks[0].1, 0..5);
        assert_eq!(toks[2].1, 6..7);
    }

    #[test]
    fn lex_comment_ignored() {
        let toks = kinds("// a comment\nvar x = 1 // trailing");
        assert_eq!(toks.len(), 4);
        assert_eq!(toks[0], Token::Var);
    }

    #[test]
    fn lex_error_single_ampersand() {
        let err = lex("a & b").unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!(err.snippet, "&");
        assert_eq!(err.code, "B-L001");
        assert!(err.suggestion.contains("&&"));
    }

    #[test]
    fn lex_error_unterminated_string() {
        let err = lex("write(\"oops)").unwrap_err();
        assert_eq!(err.position, 6);
        assert_eq!(err.code, "B-L002");
    }
}
