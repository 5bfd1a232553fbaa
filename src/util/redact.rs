/// Masks a secret for log and `Debug` output, keeping a short prefix for identification.
pub(crate) fn redact(input: &str) -> String {
    let prefix: String = input.chars().take(4).collect();
    if input.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{prefix}***")
    }
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn short_secrets_are_fully_masked() {
        assert_eq!(redact("abc"), "****");
        assert_eq!(redact(""), "****");
    }

    #[test]
    fn long_secrets_keep_prefix() {
        assert_eq!(redact("gsk_live_secret"), "gsk_***");
    }
}
