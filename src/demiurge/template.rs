//! Prompt Template - `{context}` / `{question}` placeholders
//!
//! Templates are parsed once into segments, so a question containing
//! braces is substituted verbatim and never re-interpreted. Literal braces
//! in the template itself are written as `{{` and `}}`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template; both placeholders must be present
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(Error::MalformedTemplate(format!("unclosed placeholder '{{{name}'")));
                    }
                    let segment = match name.trim() {
                        "context" => Segment::Context,
                        "question" => Segment::Question,
                        other => {
                            return Err(Error::MalformedTemplate(format!(
                                "unknown placeholder '{{{other}}}'"
                            )))
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                '}' => {
                    return Err(Error::MalformedTemplate(
                        "unmatched '}' (write '}}' for a literal brace)".to_string(),
                    ))
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (segment, name) in [(Segment::Context, "{context}"), (Segment::Question, "{question}")] {
            if !segments.contains(&segment) {
                return Err(Error::MalformedTemplate(format!("missing {name} placeholder")));
            }
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.source.len() + context.len() + question.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Escape user text for embedding into a template source
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_both() {
        let template = PromptTemplate::parse("Context:\n{context}\n\nQuestion:\n{question}").unwrap();
        assert_eq!(
            template.render("C", "Q?"),
            "Context:\nC\n\nQuestion:\nQ?"
        );
    }

    #[test]
    fn test_missing_placeholder_is_malformed() {
        assert!(matches!(
            PromptTemplate::parse("Only {question}"),
            Err(Error::MalformedTemplate(_))
        ));
        assert!(matches!(
            PromptTemplate::parse("Only {context}"),
            Err(Error::MalformedTemplate(_))
        ));
    }

    #[test]
    fn test_unknown_or_broken_placeholders() {
        for bad in ["{context} {question} {name}", "{context} {question", "{context} } {question}"] {
            assert!(
                matches!(PromptTemplate::parse(bad), Err(Error::MalformedTemplate(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let source = format!("{} {{context}} {{question}}", escape_braces("set {a}"));
        let template = PromptTemplate::parse(&source).unwrap();
        assert_eq!(template.render("ctx", "q"), "set {a} ctx q");
    }

    #[test]
    fn test_question_braces_are_not_reparsed() {
        let template = PromptTemplate::parse("{context}|{question}").unwrap();
        assert_eq!(template.render("a", "{context}"), "a|{context}");
    }
}
