//! HTML pages, rendered with handlebars from templates embedded at compile time.

use crate::error::{AppError, Result};
use handlebars::Handlebars;
use serde::Serialize;

const TEMPLATES: [(&str, &str); 6] = [
    ("layout", include_str!("./static/layout.hbs")),
    ("dashboard", include_str!("./static/dashboard.hbs")),
    ("survey", include_str!("./static/survey.hbs")),
    ("login", include_str!("./static/login.hbs")),
    ("signup", include_str!("./static/signup.hbs")),
    ("error", include_str!("./static/error.hbs")),
];

pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        for (name, source) in TEMPLATES {
            registry
                .register_template_string(name, source)
                .map_err(|e| AppError::Render(format!("template {}: {}", name, e)))?;
        }
        Ok(Renderer { registry })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        self.registry
            .render(name, data)
            .map_err(|e| AppError::Render(e.to_string()))
    }

    /// The generic failure page.
    pub fn error_page(&self, title: &str, message: &str) -> String {
        self.render(
            "error",
            &serde_json::json!({ "title": title, "message": message }),
        )
        .unwrap_or_else(|_| format!("<h1>{}</h1><p>{}</p>", title, message))
    }
}
