use validator::{ValidationError, ValidationErrors};

pub const TITLE_MAX: usize = 200;

/// Phone rule: at least 10 characters, digits plus common punctuation only.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.');
    if phone.len() >= 10 && phone.chars().all(allowed) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("Phone must be at least 10 digits".into());
        Err(err)
    }
}

/// First human-readable message out of a `Validate` failure, for flash
/// messages and JSON error bodies.
pub fn first_message(errors: &ValidationErrors) -> String {
    for (field, errs) in errors.field_errors() {
        if let Some(e) = errs.first() {
            return match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("Invalid value for {field}"),
            };
        }
    }
    "Invalid input".to_string()
}

/// Minimal HTML escaping for user-authored text stored verbatim and echoed
/// into pages by the frontend.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Trim, bound-check and escape post fields. Length limits apply to the
/// trimmed input, before escaping inflates entities.
pub fn sanitize_post(title: &str, content: &str) -> Result<(String, String), String> {
    let title = title.trim();
    let content = content.trim();
    if title.is_empty() || content.is_empty() {
        return Err("Title and content are required".to_string());
    }
    if title.chars().count() > TITLE_MAX {
        return Err(format!("Title is too long (max {TITLE_MAX} characters)"));
    }
    Ok((escape_html(title), escape_html(content)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_accepts_digits_and_punctuation() {
        assert!(validate_phone("0977138005").is_ok());
        assert!(validate_phone("+38 (097) 713-80-05").is_ok());
    }

    #[test]
    fn phone_rejects_short_or_alpha() {
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("not-a-phone").is_err());
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"a" & 'b'</b>"#),
            "&lt;b&gt;&quot;a&quot; &amp; &#x27;b&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn sanitize_rejects_empty_and_oversized() {
        assert!(sanitize_post("", "x").is_err());
        assert!(sanitize_post("   ", "x").is_err());
        assert!(sanitize_post("x", " ").is_err());
        let long = "x".repeat(TITLE_MAX + 1);
        assert!(sanitize_post(&long, "y").is_err());
        // exactly at the limit is fine
        let max = "x".repeat(TITLE_MAX);
        assert!(sanitize_post(&max, "y").is_ok());
    }

    #[test]
    fn sanitize_trims_and_escapes() {
        let (t, c) = sanitize_post("  <script>  ", " a & b ").unwrap();
        assert_eq!(t, "&lt;script&gt;");
        assert_eq!(c, "a &amp; b");
    }
}
