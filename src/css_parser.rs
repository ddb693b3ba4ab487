//! Stylesheet tokenizing.
//!
//! cssparser splits style text into qualified rules (optionally nested in
//! `@media` blocks) and declaration lists. Selectors, media preludes and
//! declaration values are kept as raw source slices: the cascade engine treats
//! them as opaque strings.

use cssparser::{ParseError, Parser, ParserInput, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRule {
    pub selector: String,
    pub media: Option<String>,
    pub declarations: Vec<Declaration>,
}

/// Parse a whole stylesheet into flat rules.
pub fn parse_rules(css: &str) -> Vec<RawRule> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut rules = Vec::new();
    parse_rule_list(&mut parser, None, &mut rules);
    rules
}

/// Parse the body of an inline `style="..."` attribute.
pub fn parse_inline_style(text: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    parse_declaration_list(&mut parser)
}

fn parse_rule_list<'i>(parser: &mut Parser<'i, '_>, media: Option<&str>, rules: &mut Vec<RawRule>) {
    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let mut prelude_start = parser.position();
        let mut prelude_end = prelude_start;
        let mut at_rule: Option<String> = None;
        let mut has_block = false;
        let mut first = true;

        loop {
            let token = match parser.next() {
                Ok(token) => token.clone(),
                Err(_) => break,
            };
            match token {
                Token::CurlyBracketBlock => {
                    has_block = true;
                    break;
                }
                Token::Semicolon => break,
                Token::AtKeyword(ref name) if first => {
                    at_rule = Some(name.to_ascii_lowercase());
                    prelude_start = parser.position();
                    prelude_end = prelude_start;
                }
                other => {
                    if opens_block(&other) {
                        consume_block(parser);
                    }
                    prelude_end = parser.position();
                }
            }
            first = false;
        }

        if !has_block {
            continue;
        }
        let prelude = parser.slice(prelude_start..prelude_end).trim().to_string();

        match at_rule.as_deref() {
            None => {
                let declarations = parser
                    .parse_nested_block(|p| Ok::<_, ParseError<'i, ()>>(parse_declaration_list(p)))
                    .unwrap_or_default();
                rules.push(RawRule {
                    selector: prelude,
                    media: media.map(str::to_string),
                    declarations,
                });
            }
            Some("media") => {
                let _ = parser.parse_nested_block(|p| {
                    parse_rule_list(p, Some(&prelude), rules);
                    Ok::<_, ParseError<'i, ()>>(())
                });
            }
            // the block is skipped by the next call to `next()`
            Some(other) => log::debug!("skipping unsupported @{} rule", other),
        }
    }
}

fn opens_block(token: &Token) -> bool {
    matches!(
        token,
        Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock
    )
}

/// Consume the block the last token opened, so `position()` lands after it.
fn consume_block<'i>(parser: &mut Parser<'i, '_>) {
    let _ = parser.parse_nested_block(|p| {
        while p.next_including_whitespace_and_comments().is_ok() {}
        Ok::<_, ParseError<'i, ()>>(())
    });
}

fn skip_to_semicolon(parser: &mut Parser<'_, '_>) {
    while !matches!(parser.next(), Ok(&Token::Semicolon) | Err(_)) {}
}

fn parse_declaration_list(parser: &mut Parser<'_, '_>) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    while !parser.is_exhausted() {
        let name = match parser.next() {
            Ok(Token::Ident(name)) => Some(name.to_string()),
            Ok(&Token::Semicolon) => continue,
            _ => None,
        };
        let Some(name) = name else {
            skip_to_semicolon(parser);
            continue;
        };
        if parser.try_parse(|p| p.expect_colon()).is_err() {
            skip_to_semicolon(parser);
            continue;
        }

        parser.skip_whitespace();
        let start = parser.position();
        let mut end = start;
        loop {
            let token = match parser.next_including_whitespace() {
                Ok(token) => token.clone(),
                Err(_) => break,
            };
            if token == Token::Semicolon {
                break;
            }
            if opens_block(&token) {
                consume_block(parser);
            }
            end = parser.position();
        }

        let value = parser.slice(start..end).trim().to_string();
        if !value.is_empty() {
            declarations.push(Declaration { name, value });
        }
    }

    declarations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, value: &str) -> Declaration {
        Declaration {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_parse_rules_and_values() {
        let rules = parse_rules(
            ".a .b { color: var(--c); margin: 0 auto; --c: #111 }\n#main{width:10px}",
        );
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selector, ".a .b");
        assert_eq!(rules[0].media, None);
        assert_eq!(
            rules[0].declarations,
            vec![
                decl("color", "var(--c)"),
                decl("margin", "0 auto"),
                decl("--c", "#111"),
            ]
        );
        assert_eq!(rules[1].selector, "#main");
        assert_eq!(rules[1].declarations, vec![decl("width", "10px")]);
    }

    #[test]
    fn test_media_rules_carry_query() {
        let rules = parse_rules(
            "@media (max-width: 600px) { .b { --v: red } .c { color: blue } } .d { color: green }",
        );
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].media.as_deref(), Some("(max-width: 600px)"));
        assert_eq!(rules[0].selector, ".b");
        assert_eq!(rules[1].media.as_deref(), Some("(max-width: 600px)"));
        assert_eq!(rules[2].media, None);
    }

    #[test]
    fn test_other_at_rules_are_skipped() {
        let rules = parse_rules(
            "@import 'x.css'; @keyframes spin { from { opacity: 0 } } .a { opacity: 1 }",
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].selector, ".a");
    }

    #[test]
    fn test_inline_style() {
        assert_eq!(
            parse_inline_style("color: red; background-color:blue;; bogus; width: calc(1px + 2px)"),
            vec![
                decl("color", "red"),
                decl("background-color", "blue"),
                decl("width", "calc(1px + 2px)"),
            ]
        );
    }
}
