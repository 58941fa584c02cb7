//! Browser front-end: an upload form and a result page rendered with
//! minijinja. Templates ending in `.html` are auto-escaped.

use minijinja::{Environment, context};

use crate::error::ServiceError;

const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{% block title %}Image Captioning{% endblock %}</title>
  <style>
    body { font-family: sans-serif; max-width: 720px; margin: 40px auto; padding: 0 16px; color: #333; }
    .card { border: 1px solid #ddd; border-radius: 8px; padding: 24px; }
    .caption { font-size: 1.3em; margin-top: 16px; }
    .error { color: #b00020; }
    img { max-width: 100%; border-radius: 6px; }
  </style>
</head>
<body>
  <h1>Image Captioning</h1>
  <div class="card">{% block content %}{% endblock %}</div>
</body>
</html>
"#;

const INDEX: &str = r#"{% extends "layout.html" %}
{% block content %}
<form action="/ui/caption?max_length={{ max_length }}" method="post" enctype="multipart/form-data">
  <p>Model: <code>{{ model_id }}</code></p>
  <input type="file" name="file" accept="image/*" required>
  <button type="submit">Generate caption</button>
</form>
{% endblock %}
"#;

const RESULT: &str = r#"{% extends "layout.html" %}
{% block title %}Caption for {{ filename }}{% endblock %}
{% block content %}
<img src="{{ image_url }}" alt="{{ filename }}">
<p class="caption">{{ caption }}</p>
<p><a href="/ui">Caption another image</a></p>
{% endblock %}
"#;

const ERROR: &str = r#"{% extends "layout.html" %}
{% block title %}Error{% endblock %}
{% block content %}
<p class="error">{{ message }}</p>
<p><a href="/ui">Try again</a></p>
{% endblock %}
"#;

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, ServiceError> {
        let mut env = Environment::new();
        for (name, source) in [
            ("layout.html", LAYOUT),
            ("index.html", INDEX),
            ("result.html", RESULT),
            ("error.html", ERROR),
        ] {
            env.add_template(name, source).map_err(template_error)?;
        }
        Ok(Self { env })
    }

    pub fn index(&self, model_id: &str, max_length: usize) -> Result<String, ServiceError> {
        self.render("index.html", context! { model_id, max_length })
    }

    pub fn result(&self, filename: &str, image_url: &str, caption: &str) -> Result<String, ServiceError> {
        self.render("result.html", context! { filename, image_url, caption })
    }

    pub fn error(&self, message: &str) -> Result<String, ServiceError> {
        self.render("error.html", context! { message })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, ServiceError> {
        self.env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(template_error)
    }
}

fn template_error(err: minijinja::Error) -> ServiceError {
    ServiceError::Other(format!("template error: {err}"))
}
