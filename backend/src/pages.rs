use crate::pipeline::upload::IMAGE_FIELD;
use crate::session::SessionState;

pub const VALIDATION_FIELD: &str = "validasi";

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | Pneumonia X-ray Screening</title>
</head>
<body>
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>
"#,
        title = escape_html(title),
        body = body
    )
}

fn error_block(error: Option<&str>) -> String {
    match error {
        Some(message) => format!(r#"<p class="error" role="alert">{}</p>"#, escape_html(message)),
        None => String::new(),
    }
}

fn result_block(state: &SessionState) -> String {
    let Some(result) = &state.result else {
        return String::new();
    };

    let image = state
        .image_url
        .as_deref()
        .map(|url| {
            format!(
                r#"<img class="xray" src="{}" alt="Uploaded chest X-ray" width="300">"#,
                escape_html(url)
            )
        })
        .unwrap_or_default();

    format!(
        r#"{image}
<p class="verdict">Result: <strong>{label}</strong></p>
<p class="confidence">Model confidence of pneumonia: {confidence:.1}%</p>
<p class="explanation">{explanation}</p>"#,
        image = image,
        label = escape_html(&result.label.to_string()),
        confidence = result.confidence * 100.0,
        explanation = escape_html(&result.explanation)
    )
}

fn validation_form(action: &str, current: Option<&str>) -> String {
    format!(
        r#"<form method="post" action="{action}">
<label for="{field}">Doctor's validation</label>
<input id="{field}" name="{field}" list="validation-options" maxlength="500" value="{current}" required>
<datalist id="validation-options">
<option value="confirmed">
<option value="rejected">
<option value="needs review">
</datalist>
<button type="submit">Submit validation</button>
</form>"#,
        action = action,
        field = VALIDATION_FIELD,
        current = escape_html(current.unwrap_or(""))
    )
}

pub fn upload_page(error: Option<&str>) -> String {
    let body = format!(
        r#"{error}
<form method="post" action="/" enctype="multipart/form-data">
<label for="{field}">Chest X-ray image</label>
<input id="{field}" type="file" name="{field}" accept="image/*">
<button type="submit">Analyze</button>
</form>"#,
        error = error_block(error),
        field = IMAGE_FIELD
    );
    layout("Upload X-ray", &body)
}

pub fn result_page(state: &SessionState, error: Option<&str>) -> String {
    let body = format!(
        "{}\n{}\n{}\n<p><a href=\"/\">Upload another image</a></p>",
        error_block(error),
        result_block(state),
        validation_form("/hasil", None)
    );
    layout("Analysis Result", &body)
}

pub fn validation_page(state: &SessionState, error: Option<&str>) -> String {
    let annotation = state.doctor_annotation.as_ref().map(|a| a.as_str());
    let annotation_block = match annotation {
        Some(note) => format!(
            r#"<p class="doctor-validation">Doctor's validation: <strong>{}</strong></p>"#,
            escape_html(note)
        ),
        None => r#"<p class="doctor-validation">Not validated yet.</p>"#.to_string(),
    };

    let body = format!(
        "{}\n{}\n{}\n{}\n<p><a href=\"/\">Upload another image</a></p>",
        error_block(error),
        result_block(state),
        annotation_block,
        validation_form("/validasi", annotation)
    );
    layout("Doctor Validation", &body)
}
