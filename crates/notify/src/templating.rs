//! Per-recipient personalisation and HTML/plain-text body pairing.
//!
//! Subjects and bodies are arbitrary strings (not pre-registered), so a fresh
//! [`minijinja::Environment`] is created per render call. HTML bodies render
//! with auto-escaping so recipient fields cannot inject markup.

use std::sync::LazyLock;

use minijinja::AutoEscape;
use regex::Regex;

use crate::traits::MailError;

/// Recipient fields available to templates.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RecipientContext {
    pub name: String,
    pub email: String,
    pub segment: String,
    pub phase: String,
}

/// Renders `{{ name }}`-style placeholders with minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    escape_html: bool,
}

impl TemplateRenderer {
    /// Plain-text rendering: values are inserted verbatim.
    pub fn new() -> Self {
        Self::default()
    }

    /// Markup rendering: values are HTML-escaped.
    pub fn html() -> Self {
        Self { escape_html: true }
    }

    // `lower`, `upper` and friends come with the "builtins" feature.
    fn build_env(&self) -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        if self.escape_html {
            env.set_auto_escape_callback(|_| AutoEscape::Html);
        }
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`MailError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, ctx: &RecipientContext) -> Result<String, MailError> {
        let env = self.build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| MailError::Template(e.to_string()))
    }

    /// Render, falling back to the raw text on any template error.
    pub fn render_or_raw(&self, template_str: &str, ctx: &RecipientContext) -> String {
        if !template_str.contains("{{") && !template_str.contains("{%") {
            return template_str.to_string();
        }
        match self.render(template_str, ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(to = %ctx.email, error = %e, "template failed, sending raw text");
                template_str.to_string()
            }
        }
    }
}

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*(?:\s[^>]*)?/?>").expect("markup regex"));

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|h[1-6]|li|tr|table|ul|ol|blockquote)\s*>")
        .expect("line break regex")
});

static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&apos;", "'"),
    ("&#x2f;", "/"),
    ("&amp;", "&"),
];

/// True when the body contains at least one HTML tag.
pub fn looks_like_html(body: &str) -> bool {
    MARKUP.is_match(body)
}

/// Plain-text derivation of an HTML body.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(html, "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    let decoded = ENTITIES
        .iter()
        .fold(stripped.into_owned(), |text, (entity, ch)| text.replace(entity, ch));
    let trimmed_lines = decoded.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    BLANK_RUN.replace_all(&trimmed_lines, "\n\n").trim().to_string()
}

/// HTML rendering of a plain-text body: escaped, newlines as `<br>`.
pub fn text_to_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace("\r\n", "\n")
        .replace('\n', "<br>")
}

/// Personalised `(html, text)` pair for a body template.
///
/// The markup decision is made on the template, never on the rendered output.
pub fn render_bodies(body: &str, ctx: &RecipientContext) -> (String, String) {
    if looks_like_html(body) {
        let html = TemplateRenderer::html().render_or_raw(body, ctx);
        let text = html_to_text(&html);
        (html, text)
    } else {
        let text = TemplateRenderer::new().render_or_raw(body, ctx);
        (text_to_html(&text), text)
    }
}
