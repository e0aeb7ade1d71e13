//! Lexer for the condition expression language.
//!
//! Uses logos for tokenization. The token set is Python-flavoured
//! (`and`/`or`/`not`, `True`/`False`/`None`, `//` floor division) because
//! that is the dialect existing sequence files are written in.

use logos::Logos;

/// Token types for the expression language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Keywords
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("in")]
    In,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None_,

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Literals
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", priority = 3, callback = |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    #[regex(r"'[^']*'", |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    Str(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("//")]
    DoubleSlash,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token("<")]
    Lt,
    #[token(">=")]
    Ge,
    #[token(">")]
    Gt,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
}

/// Tokenize an expression, returning the tokens or the byte offset of the
/// first unrecognized input.
pub fn tokenize(source: &str) -> Result<Vec<Token>, usize> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => return Err(span.start),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_idents() {
        let tokens = tokenize("not done and retries").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Not,
                Token::Ident("done".to_string()),
                Token::And,
                Token::Ident("retries".to_string()),
            ]
        );
    }

    #[test]
    fn keyword_prefix_is_ident() {
        // "android" starts with "and" but must lex as one identifier
        let tokens = tokenize("android").unwrap();
        assert_eq!(tokens, vec![Token::Ident("android".to_string())]);
    }

    #[test]
    fn numbers() {
        let tokens = tokenize("3 2.5").unwrap();
        assert_eq!(tokens, vec![Token::Int(3), Token::Float(2.5)]);
    }

    #[test]
    fn both_quote_styles() {
        let tokens = tokenize(r#"'egg' "spam""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Str("egg".to_string()),
                Token::Str("spam".to_string()),
            ]
        );
    }

    #[test]
    fn floor_division_not_two_slashes() {
        let tokens = tokenize("a // b / c").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_string()),
                Token::DoubleSlash,
                Token::Ident("b".to_string()),
                Token::Slash,
                Token::Ident("c".to_string()),
            ]
        );
    }

    #[test]
    fn comparison_operators() {
        let tokens = tokenize("<= < >= > == !=").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Le,
                Token::Lt,
                Token::Ge,
                Token::Gt,
                Token::EqEq,
                Token::NotEq,
            ]
        );
    }

    #[test]
    fn unrecognized_input_reports_offset() {
        let err = tokenize("a ? b").unwrap_err();
        assert_eq!(err, 2);
    }

    #[test]
    fn indexing_and_attributes() {
        let tokens = tokenize("results[1].exception").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("results".to_string()),
                Token::LBracket,
                Token::Int(1),
                Token::RBracket,
                Token::Dot,
                Token::Ident("exception".to_string()),
            ]
        );
    }
}
