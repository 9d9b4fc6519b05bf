//! Tagged Fragments - `<tag>...</tag>` envelopes around generated turns
//!
//! Information Hiding:
//! - Markup scanning hidden behind `TagFormat::parse`
//! - Repair heuristic hidden behind `TagFormat::repair`
//! - Role-tag regex compiled once per format

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("fragment is empty")]
    Empty,
    #[error("fragment does not start with <{expected}>")]
    MissingOpenTag { expected: String },
    #[error("input ended before </{open}> was found")]
    UnexpectedEof { open: String },
    #[error("closing tag </{found}> does not match <{expected}>")]
    MismatchedTag { expected: String, found: String },
    #[error("content found after the closing tag")]
    TrailingContent,
    #[error("malformed markup at byte {0}")]
    Malformed(usize),
}

/// How a generated fragment was made usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Intact,
    ClosedTruncated,
    Substituted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub text: String,
    pub outcome: RepairOutcome,
}

/// Markup convention for one role's turns.
#[derive(Debug, Clone)]
pub struct TagFormat {
    tag: String,
    markup: Regex,
}

impl TagFormat {
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let markup = Regex::new(&format!(r"</?{}\s*>", regex::escape(&tag)))
            .expect("escaped tag always forms a valid pattern");
        Self { tag, markup }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn close_tag(&self) -> String {
        format!("</{}>", self.tag)
    }

    pub fn wrap(&self, text: &str) -> String {
        format!("<{0}>{1}</{0}>", self.tag, text)
    }

    /// Removes this role's open/close tags, leaving any other markup alone.
    pub fn strip(&self, text: &str) -> String {
        self.markup.replace_all(text, "").trim().to_string()
    }

    /// Checks that `text` is a single well-formed `<tag>...</tag>` element and
    /// returns the inner content.
    pub fn parse<'a>(&self, text: &'a str) -> Result<&'a str, FragmentError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(FragmentError::Empty);
        }

        let offset = text.len() - text.trim_start().len();
        let (root, body_start) = match read_tag(trimmed, 0).map_err(|e| shift(e, offset))? {
            Some(Markup::Open(name, end)) if name == self.tag => (name, end),
            _ => {
                return Err(FragmentError::MissingOpenTag {
                    expected: self.tag.clone(),
                })
            }
        };

        let mut open = vec![root];
        let mut cursor = body_start;

        while let Some(rel) = trimmed[cursor..].find('<') {
            let at = cursor + rel;
            match read_tag(trimmed, at).map_err(|e| shift(e, offset))? {
                Some(Markup::Open(name, end)) => {
                    open.push(name);
                    cursor = end;
                }
                Some(Markup::Close(name, end)) => {
                    let expected = open.pop().unwrap_or_default();
                    if name != expected {
                        return Err(FragmentError::MismatchedTag {
                            expected: expected.to_string(),
                            found: name.to_string(),
                        });
                    }
                    if open.is_empty() {
                        if !trimmed[end..].trim().is_empty() {
                            return Err(FragmentError::TrailingContent);
                        }
                        return Ok(&trimmed[body_start..at]);
                    }
                    cursor = end;
                }
                Some(Markup::Skip(end)) => cursor = end,
                None => return Err(FragmentError::Malformed(offset + at)),
            }
        }

        Err(FragmentError::UnexpectedEof {
            open: open.last().map(|s| s.to_string()).unwrap_or_default(),
        })
    }

    /// Makes generated text usable: accepts it when well formed, closes it when
    /// generation stopped before the closing tag, otherwise substitutes
    /// `fallback`.
    pub fn repair(&self, text: &str, fallback: &str) -> Repaired {
        match self.parse(text) {
            Ok(_) => Repaired {
                text: text.to_string(),
                outcome: RepairOutcome::Intact,
            },
            Err(FragmentError::UnexpectedEof { .. }) => {
                tracing::debug!(tag = %self.tag, "Closing truncated fragment");
                Repaired {
                    text: format!("{}{}", text.trim_end(), self.close_tag()),
                    outcome: RepairOutcome::ClosedTruncated,
                }
            }
            Err(e) => {
                tracing::warn!(tag = %self.tag, error = %e, "Discarding malformed fragment");
                Repaired {
                    text: fallback.to_string(),
                    outcome: RepairOutcome::Substituted,
                }
            }
        }
    }
}

enum Markup<'a> {
    Open(&'a str, usize),
    Close(&'a str, usize),
    Skip(usize),
}

fn shift(err: FragmentError, offset: usize) -> FragmentError {
    match err {
        FragmentError::Malformed(at) => FragmentError::Malformed(at + offset),
        other => other,
    }
}

/// Reads the markup token starting at `at` (which must point to `<`).
/// Returns `None` when the token is not a tag at all.
fn read_tag(text: &str, at: usize) -> Result<Option<Markup<'_>>, FragmentError> {
    let rest = &text[at..];
    if !rest.starts_with('<') {
        return Ok(None);
    }

    if rest.starts_with("<!--") {
        return match rest.find("-->") {
            Some(end) => Ok(Some(Markup::Skip(at + end + 3))),
            None => Err(FragmentError::Malformed(at)),
        };
    }

    let close = rest.find('>').ok_or(FragmentError::Malformed(at))?;
    let inner = &rest[1..close];
    let end = at + close + 1;

    if let Some(name) = inner.strip_prefix('/') {
        let name = name.trim_end();
        return if is_name(name) {
            Ok(Some(Markup::Close(name, end)))
        } else {
            Err(FragmentError::Malformed(at))
        };
    }

    if inner.starts_with('?') || inner.starts_with('!') {
        return Ok(Some(Markup::Skip(end)));
    }

    let self_closing = inner.ends_with('/');
    let inner = inner.trim_end_matches('/');
    let name = inner.split_whitespace().next().unwrap_or("");
    if !is_name(name) || inner.starts_with(char::is_whitespace) {
        return Err(FragmentError::Malformed(at));
    }

    if self_closing {
        Ok(Some(Markup::Skip(end)))
    } else {
        Ok(Some(Markup::Open(name, end)))
    }
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "<role>Could you say that again?</role>";

    #[test]
    fn test_well_formed_fragment_is_kept() {
        let format = TagFormat::new("role");
        let repaired = format.repair("<role>hello</role>", FALLBACK);

        assert_eq!(repaired.text, "<role>hello</role>");
        assert_eq!(repaired.outcome, RepairOutcome::Intact);
    }

    #[test]
    fn test_truncated_fragment_gets_closing_tag() {
        let format = TagFormat::new("role");
        let repaired = format.repair("<role>hello", FALLBACK);

        assert_eq!(repaired.text, "<role>hello</role>");
        assert_eq!(repaired.outcome, RepairOutcome::ClosedTruncated);
    }

    #[test]
    fn test_untagged_text_is_substituted() {
        let format = TagFormat::new("role");
        let repaired = format.repair("not tagged at all", FALLBACK);

        assert_eq!(repaired.text, FALLBACK);
        assert_eq!(repaired.outcome, RepairOutcome::Substituted);
    }

    #[test]
    fn test_other_role_tag_is_substituted() {
        let format = TagFormat::new("alice");
        let repaired = format.repair("<bob>hi</bob>", FALLBACK);
        assert_eq!(repaired.outcome, RepairOutcome::Substituted);
    }

    #[test]
    fn test_parse_errors() {
        let format = TagFormat::new("alice");

        assert_eq!(format.parse("   "), Err(FragmentError::Empty));
        assert_eq!(
            format.parse("<alice>hi</alice> and more"),
            Err(FragmentError::TrailingContent)
        );
        assert_eq!(
            format.parse("<alice>hi <b>there</alice>"),
            Err(FragmentError::MismatchedTag {
                expected: "b".to_string(),
                found: "alice".to_string()
            })
        );
        assert!(matches!(
            format.parse("<alice>1 < 2</alice>"),
            Err(FragmentError::Malformed(_))
        ));
        assert_eq!(
            format.parse("<alice>a <em>nested"),
            Err(FragmentError::UnexpectedEof {
                open: "em".to_string()
            })
        );
    }

    #[test]
    fn test_parse_returns_inner_content() {
        let format = TagFormat::new("alice");

        assert_eq!(
            format.parse("  <alice>Rivers <em>flow</em>.<br/></alice>\n"),
            Ok("Rivers <em>flow</em>.<br/>")
        );
        assert_eq!(format.parse("<alice><!-- note -->ok</alice>"), Ok("<!-- note -->ok"));
    }

    #[test]
    fn test_strip_removes_only_role_tags() {
        let format = TagFormat::new("peer");

        assert_eq!(
            format.strip("<peer>Rivers are waterways.</peer>"),
            "Rivers are waterways."
        );
        assert_eq!(format.strip("<peer>a <em>b</em></peer>"), "a <em>b</em>");
    }

    #[test]
    fn test_wrap() {
        let format = TagFormat::new("bob");
        assert_eq!(format.wrap("tell me about rivers"), "<bob>tell me about rivers</bob>");
    }
}
