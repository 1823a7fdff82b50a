//! Parser for the stylesheet subset used by templates and emitted artifacts.
//!
//! Tokenization is done by `cssparser`. On top of it we accept flat rules
//! (`selector { prop: value; ... }`, including `@page`), `!important` and
//! `{{token.id}}` placeholders inside values, which the tokenizer sees as a
//! doubly nested curly block. A comment of the form `/* @protected token.id */`
//! marks the rule that follows it as protected. Nested rules and other at-rules
//! are rejected.

use cssparser::{
    BasicParseErrorKind, Delimiter, ParseError, ParseErrorKind, Parser, ParserInput,
    SourceLocation, ToCss, Token,
};

use crate::errors::{StyleError, TemplateLocation};

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
    /// Token id from a preceding `@protected` annotation.
    pub protected: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    /// Raw value text, placeholders and quotes included, `!important` stripped.
    pub value: String,
    pub important: bool,
    pub line: usize,
}

const PROTECTED_MARKER: &str = "@protected";

type CssError<'i> = ParseError<'i, String>;

/// Parses a template or emitted stylesheet named `name` (used in error locations).
pub fn parse_stylesheet(name: &str, text: &str) -> Result<Vec<StyleRule>, StyleError> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);
    rules(&mut parser).map_err(|e| template_error(name, e))
}

fn template_error(name: &str, e: CssError<'_>) -> StyleError {
    let message = match e.kind {
        ParseErrorKind::Custom(message) => message,
        ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => "unexpected end of input".to_string(),
        ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
            format!("unexpected '{}'", token.to_css_string())
        }
        ParseErrorKind::Basic(other) => format!("{other:?}"),
    };
    StyleError::template(TemplateLocation::at_line(name, line(e.location)), message)
}

fn line(location: SourceLocation) -> usize {
    location.line as usize + 1
}

fn fail<'i>(location: SourceLocation, message: impl Into<String>) -> CssError<'i> {
    ParseError {
        kind: ParseErrorKind::Custom(message.into()),
        location,
    }
}

/// Consumes the block whose opening token was just returned.
fn skip_block<'i>(p: &mut Parser<'i, '_>) -> Result<(), CssError<'i>> {
    p.parse_nested_block(|nested| {
        while nested.next_including_whitespace_and_comments().is_ok() {}
        Ok(())
    })
}

fn rules<'i>(p: &mut Parser<'i, '_>) -> Result<Vec<StyleRule>, CssError<'i>> {
    let mut rules = Vec::new();
    let mut pending_protected: Option<(String, SourceLocation)> = None;
    let mut selector = String::new();
    let mut selector_start: Option<SourceLocation> = None;

    loop {
        let location = p.current_source_location();
        let before = p.position();
        let token = match p.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        match token {
            Token::WhiteSpace(_) => {
                if selector_start.is_some() {
                    selector.push(' ');
                }
            }
            Token::Comment(body) => {
                if !p.slice_from(before).ends_with("*/") {
                    return Err(fail(location, "unterminated comment"));
                }
                let Some(rest) = body.trim().strip_prefix(PROTECTED_MARKER) else {
                    continue;
                };
                let token_id = rest.trim();
                if token_id.is_empty() || token_id.contains(char::is_whitespace) {
                    return Err(fail(location, "@protected expects exactly one token id"));
                }
                if pending_protected.is_some() || selector_start.is_some() {
                    return Err(fail(location, "@protected annotation is not followed by a rule"));
                }
                pending_protected = Some((token_id.to_string(), location));
            }
            Token::CurlyBracketBlock => {
                let Some(start) = selector_start.take() else {
                    return Err(fail(location, "empty selector"));
                };
                let text = selector.split_whitespace().collect::<Vec<_>>().join(" ");
                selector.clear();
                let declarations = p.parse_nested_block(|body| declarations(body))?;
                if !p.slice_from(before).ends_with('}') {
                    return Err(fail(start, "unterminated rule block"));
                }
                rules.push(StyleRule {
                    selector: text,
                    declarations,
                    protected: pending_protected.take().map(|(id, _)| id),
                    line: line(start),
                });
            }
            Token::CloseCurlyBracket => return Err(fail(location, "unexpected '}'")),
            Token::Semicolon => {
                return Err(fail(
                    selector_start.unwrap_or(location),
                    format!("expected '{{' after selector '{}'", selector.trim()),
                ))
            }
            Token::AtKeyword(ref name) if !name.eq_ignore_ascii_case("page") => {
                return Err(fail(location, format!("unsupported at-rule '@{name}'")))
            }
            Token::BadString(_) => return Err(fail(location, "unterminated string")),
            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock => {
                skip_block(p)?;
                selector_start.get_or_insert(location);
                selector.push_str(p.slice_from(before));
            }
            _ => {
                selector_start.get_or_insert(location);
                selector.push_str(p.slice_from(before));
            }
        }
    }

    if let Some(start) = selector_start {
        return Err(fail(
            start,
            format!("expected '{{' after selector '{}'", selector.trim()),
        ));
    }
    if let Some((_, location)) = pending_protected {
        return Err(fail(location, "@protected annotation is not followed by a rule"));
    }
    Ok(rules)
}

fn declarations<'i>(p: &mut Parser<'i, '_>) -> Result<Vec<Declaration>, CssError<'i>> {
    let mut out = Vec::new();
    while !p.is_exhausted() {
        if let Some(declaration) = p.parse_until_after(Delimiter::Semicolon, |d| declaration(d))? {
            out.push(declaration);
        }
    }
    Ok(out)
}

/// One `property: value [!important]` up to the next `;`. `None` for an empty slot.
fn declaration<'i>(p: &mut Parser<'i, '_>) -> Result<Option<Declaration>, CssError<'i>> {
    p.skip_whitespace();
    let start = p.current_source_location();
    if p.is_exhausted() {
        return Ok(None);
    }

    let property = match p.next()?.clone() {
        Token::Ident(name) => name.to_ascii_lowercase(),
        Token::CurlyBracketBlock => return Err(fail(start, "nested blocks are not supported")),
        other => {
            return Err(fail(
                start,
                format!("expected a property name, found '{}'", other.to_css_string()),
            ))
        }
    };
    match p.next().map(|t| t.clone()) {
        Ok(Token::Colon) => {}
        Ok(Token::CurlyBracketBlock) => return Err(fail(start, "nested blocks are not supported")),
        _ => return Err(fail(start, format!("declaration '{property}' has no ':'"))),
    }

    p.skip_whitespace();
    let value_start = p.position();
    let mut value_end = value_start;
    let mut important = false;
    loop {
        let location = p.current_source_location();
        let before = p.position();
        let token = match p.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        if important && !matches!(token, Token::WhiteSpace(_) | Token::Comment(_)) {
            return Err(fail(location, "!important must end the declaration"));
        }
        match token {
            Token::WhiteSpace(_) | Token::Comment(_) => {}
            Token::Delim('!') => {
                p.expect_ident_matching("important")?;
                important = true;
            }
            Token::BadString(_) => return Err(fail(location, "unterminated string")),
            Token::CurlyBracketBlock => {
                skip_block(p)?;
                let raw = p.slice_from(before);
                if !(raw.starts_with("{{") && raw.ends_with("}}")) {
                    return Err(fail(location, format!("malformed placeholder '{raw}'")));
                }
                value_end = p.position();
            }
            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock => {
                skip_block(p)?;
                value_end = p.position();
            }
            _ => value_end = p.position(),
        }
    }

    let value = p.slice(value_start..value_end).trim();
    if value.is_empty() {
        return Err(fail(start, format!("declaration '{property}' has no value")));
    }
    Ok(Some(Declaration {
        property,
        value: value.to_string(),
        important,
        line: line(start),
    }))
}

/// Placeholder token ids appearing in a declaration value, in order.
pub fn placeholders(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                out.push(after[..end].trim());
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_rules_declarations_and_lines() {
        let css = "body {\n  font-size: {{typography.base-size}};\n  margin: 0\n}\n\n.a .b  > li { color: red !important; }\n";
        let rules = parse_stylesheet("base.css", css).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selector, "body");
        assert_eq!(rules[0].line, 1);
        assert_eq!(rules[0].declarations.len(), 2);
        assert_eq!(rules[0].declarations[0].property, "font-size");
        assert_eq!(rules[0].declarations[0].value, "{{typography.base-size}}");
        assert_eq!(rules[0].declarations[0].line, 2);
        assert_eq!(rules[0].declarations[1].value, "0");
        assert_eq!(rules[1].selector, ".a .b > li");
        assert!(rules[1].declarations[0].important);
        assert_eq!(rules[1].declarations[0].value, "red");
    }

    #[test]
    fn test_protected_annotation_attaches_to_next_rule() {
        let css = "/* plain comment */\n/* @protected spacing.bullet-indent */\n.bullets li { padding-left: {{spacing.bullet-indent}}; }\n.x { color: blue; }";
        let rules = parse_stylesheet("base.css", css).unwrap();
        assert_eq!(rules[0].protected.as_deref(), Some("spacing.bullet-indent"));
        assert_eq!(rules[1].protected, None);
    }

    #[test]
    fn test_strings_may_contain_semicolons_and_braces() {
        let css = ".b::before { content: \"; {\"; }";
        let rules = parse_stylesheet("t.css", css).unwrap();
        assert_eq!(rules[0].declarations[0].value, "\"; {\"");
    }

    #[test]
    fn test_page_rule_and_functions() {
        let css = "@page { size: A4; margin: 1.9cm; }\n.p { box-shadow: 0 1px 4px rgba(0, 0, 0, 0.2); }";
        let rules = parse_stylesheet("print.css", css).unwrap();
        assert_eq!(rules[0].selector, "@page");
        assert_eq!(rules[1].declarations[0].value, "0 1px 4px rgba(0, 0, 0, 0.2)");
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = parse_stylesheet("print.css", "a { color: red; }\n\nb { color }").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Template error at print.css:3: declaration 'color' has no ':'"
        );

        let err = parse_stylesheet("p.css", "@media print {\n a { color: red; } }").unwrap_err();
        assert!(err.to_string().contains("unsupported at-rule '@media'"), "{err}");

        let err = parse_stylesheet("p.css", "a {\n  b { color: red; }\n}").unwrap_err();
        assert_eq!(err.to_string(), "Template error at p.css:2: nested blocks are not supported");

        let err = parse_stylesheet("p.css", "a { color: red;").unwrap_err();
        assert!(err.to_string().contains("unterminated rule block"), "{err}");

        let err = parse_stylesheet("p.css", "/* @protected x */").unwrap_err();
        assert!(err.to_string().contains("not followed by a rule"), "{err}");

        let err = parse_stylesheet("p.css", "a { width: {{x; }").unwrap_err();
        assert!(err.to_string().contains("malformed placeholder"), "{err}");

        let err = parse_stylesheet("p.css", "a { width: {x}; }").unwrap_err();
        assert!(err.to_string().contains("malformed placeholder '{x}'"), "{err}");
    }

    #[test]
    fn test_important_must_be_last() {
        let rules = parse_stylesheet("t.css", "a { margin: {{x}} ! important ; }").unwrap();
        assert!(rules[0].declarations[0].important);
        assert_eq!(rules[0].declarations[0].value, "{{x}}");

        let err = parse_stylesheet("t.css", "a { margin: 0 !important 1px; }").unwrap_err();
        assert!(err.to_string().contains("must end the declaration"), "{err}");
    }

    #[test]
    fn test_selector_functions_and_comments() {
        let css = "li:not(.x) /* note */ > a[href] { color: red; }";
        let rules = parse_stylesheet("t.css", css).unwrap();
        assert_eq!(rules[0].selector, "li:not(.x) > a[href]");
    }

    #[test]
    fn test_placeholders_extracts_ids() {
        assert_eq!(placeholders("{{a.b}}"), vec!["a.b"]);
        assert_eq!(placeholders("\"{{ x }}\", sans-serif"), vec!["x"]);
        assert_eq!(placeholders("0 {{a}} 0 {{b}}"), vec!["a", "b"]);
        assert!(placeholders("12pt").is_empty());
    }
}
