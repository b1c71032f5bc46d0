/// Trim an upstream response body to a log-friendly size.
pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    if trimmed.len() <= max_len {
        trimmed.to_string()
    } else {
        format!("{}...", &trimmed[..max_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through_trimmed() {
        assert_eq!(truncate_for_log("  hello  "), "hello");
    }

    #[test]
    fn long_text_is_truncated_with_ellipsis() {
        let long = "x".repeat(500);
        let out = truncate_for_log(&long);
        assert_eq!(out.len(), 303);
        assert!(out.ends_with("..."));
    }
}
