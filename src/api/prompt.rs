//! Prompt template for grounded answers

use crate::error::{QaError, Result};
use regex::{Captures, Regex};
use std::path::Path;

/// Used when no template file is available
pub const DEFAULT_TEMPLATE: &str = "\
You are an assistant answering questions about a set of research documents.
Answer the question using only the context below. If the context does not
contain the answer, say that you don't know. Keep the answer concise.

Context:
{context}

Question: {question}

Answer:";

/// Template with `{context}` and `{question}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    placeholder: Regex,
}

impl PromptTemplate {
    /// Validate and wrap a template string
    pub fn parse(template: &str) -> Result<Self> {
        for name in ["{context}", "{question}"] {
            if !template.contains(name) {
                return Err(QaError::Config(format!("Prompt template is missing the {} placeholder", name)));
            }
        }

        let placeholder = Regex::new(r"\{(context|question)\}")
            .map_err(|e| QaError::Config(format!("Failed to compile placeholder regex: {}", e)))?;

        Ok(Self {
            template: template.to_string(),
            placeholder,
        })
    }

    /// The built-in template
    pub fn default_template() -> Result<Self> {
        Self::parse(DEFAULT_TEMPLATE)
    }

    /// Read a template file, falling back to the built-in template if it is missing
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!(
                "Prompt template {} not found, using the built-in template",
                path.display()
            );
            return Self::default_template();
        }

        let template = std::fs::read_to_string(path)?;
        Self::parse(&template)
            .map_err(|e| QaError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Fill in both placeholders in one pass
    ///
    /// Placeholder-like text inside `context` or `question` is left as is.
    pub fn render(&self, context: &str, question: &str) -> String {
        self.placeholder
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "context" => context.to_string(),
                _ => question.to_string(),
            })
            .into_owned()
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render() {
        let template = PromptTemplate::parse("C: {context} | Q: {question}").unwrap();
        assert_eq!(template.render("ctx", "why?"), "C: ctx | Q: why?");
    }

    #[test]
    fn test_render_does_not_expand_inserted_text() {
        let template = PromptTemplate::parse("{context}/{question}").unwrap();
        let rendered = template.render("see {question}", "what is {context}?");
        assert_eq!(rendered, "see {question}/what is {context}?");
    }

    #[test]
    fn test_missing_placeholder() {
        let result = PromptTemplate::parse("Only {context} here");
        assert!(matches!(result, Err(QaError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let template = PromptTemplate::from_file(temp_dir.path().join("qa_prompt.txt")).unwrap();
        assert_eq!(template.as_str(), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("qa_prompt.txt");
        std::fs::write(&path, "Q={question}\nC={context}").unwrap();

        let template = PromptTemplate::from_file(&path).unwrap();
        assert_eq!(template.render("c", "q"), "Q=q\nC=c");
    }
}
