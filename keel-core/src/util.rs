use std::{borrow::Cow, ffi::CString};

/// Truncates long sql text when used inside error messages and logs.
#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        $crate::truncate(&$query)
    };
}

pub fn truncate(query: &str) -> Cow<'_, str> {
    if query.len() <= 497 {
        return Cow::Borrowed(query);
    }
    let mut end = 497;
    while !query.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}...", query[..end].trim_end()))
}

/// Logs the error and returns it, meant for `return Err(log_error!(...))`.
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {{
        let error: $crate::Error = $error.into();
        log::error!("{:#}", error);
        error
    }};
}

pub fn as_c_string<S: Into<Vec<u8>>>(str: S) -> crate::Result<CString> {
    CString::new(str.into()).map_err(|e| {
        crate::KeelError::driver(format!("Expected a valid C string: {}", e)).into()
    })
}

/// Default column label transformation: lowercase label.
pub fn lowercase_identifier(label: &str) -> String {
    label.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_and_long() {
        let short = "SELECT 1";
        assert_eq!(format!("{}", truncate_long!(short)), "SELECT 1");
        let long = "x".repeat(600);
        let truncated = format!("{}", truncate_long!(long));
        assert_eq!(truncated.len(), 500);
        assert!(truncated.ends_with("..."));
        let wide = "é".repeat(300);
        assert!(truncate(&wide).ends_with("..."));
    }

    #[test]
    fn c_string_rejects_nul() {
        assert!(as_c_string("abc").is_ok());
        assert!(as_c_string("a\0c").is_err());
    }

    #[test]
    fn lowercase() {
        assert_eq!(lowercase_identifier("User_ID"), "user_id");
    }
}
