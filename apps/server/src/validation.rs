use validator::ValidationError;

const MAX_MESSAGE_LEN: usize = 4000;
const MAX_REQUEST_MESSAGE_LEN: usize = 500;

pub fn validate_name(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.len() < 2 || trimmed.len() > 64 {
        return Err(ValidationError::new("name_length"));
    }
    Ok(())
}

pub fn validate_skill_title(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.len() < 2 || trimmed.len() > 200 {
        return Err(ValidationError::new("skill_title_length"));
    }
    Ok(())
}

pub fn validate_skill_description(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.len() < 10 || trimmed.len() > 4000 {
        return Err(ValidationError::new("skill_description_length"));
    }
    Ok(())
}

pub fn validate_request_message(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_REQUEST_MESSAGE_LEN {
        return Err(ValidationError::new("request_message_length"));
    }
    Ok(())
}

pub fn validate_message_content(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_MESSAGE_LEN {
        return Err(ValidationError::new("message_content_length"));
    }
    Ok(())
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_title_requires_two_chars() {
        assert!(validate_skill_title("Go").is_ok());
        assert!(validate_skill_title("x").is_err());
        assert!(validate_skill_title(" x ").is_err());
    }

    #[test]
    fn skill_description_requires_ten_chars() {
        assert!(validate_skill_description("I teach Rust basics").is_ok());
        assert!(validate_skill_description("too short").is_err());
    }

    #[test]
    fn request_message_bounds() {
        assert!(validate_request_message("Can you teach me?").is_ok());
        assert!(validate_request_message("   ").is_err());
        assert!(validate_request_message(&"a".repeat(501)).is_err());
        assert!(validate_request_message(&"a".repeat(500)).is_ok());
    }

    #[test]
    fn message_content_rejects_whitespace_only() {
        assert!(validate_message_content("hello").is_ok());
        assert!(validate_message_content("   ").is_err());
    }

    #[test]
    fn email_normalization_lowercases_and_trims() {
        assert_eq!(normalize_email("  Bob@Example.COM "), "bob@example.com");
    }
}
