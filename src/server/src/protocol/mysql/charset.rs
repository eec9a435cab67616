use std::collections::HashMap;
use std::sync::OnceLock;

pub const UTF8_GENERAL_CI: u8 = 33;
pub const LATIN1_SWEDISH_CI: u8 = 8;
pub const BINARY: u8 = 63;
pub const UTF8_MB4_GENERAL_CI: u8 = 45;
pub const UTF8_MB4_UNICODE_CI: u8 = 224;

/// Collation advertised in the server handshake.
pub const DEFAULT_COLLATION_ID: u8 = UTF8_MB4_GENERAL_CI;

pub const DEFAULT_CHARACTER_SET: &str = "utf8mb4";
pub const DEFAULT_COLLATION_NAME: &str = "utf8mb4_general_ci";

#[inline]
pub fn collation_names() -> &'static HashMap<&'static str, u8> {
    static COLLATIONS: OnceLock<HashMap<&'static str, u8>> = OnceLock::new();
    COLLATIONS.get_or_init(|| {
        HashMap::from([
            ("latin1_swedish_ci", LATIN1_SWEDISH_CI),
            ("utf8_general_ci", UTF8_GENERAL_CI),
            ("binary", BINARY),
            ("utf8mb4_general_ci", UTF8_MB4_GENERAL_CI),
            ("utf8mb4_unicode_ci", UTF8_MB4_UNICODE_CI),
        ])
    })
}

/// `(name, charset, id, default)` rows backing `information_schema.collations`.
pub fn collation_catalog() -> &'static [(&'static str, &'static str, u8, bool)] {
    &[
        ("latin1_swedish_ci", "latin1", LATIN1_SWEDISH_CI, true),
        ("utf8_general_ci", "utf8", UTF8_GENERAL_CI, true),
        ("binary", "binary", BINARY, true),
        ("utf8mb4_general_ci", "utf8mb4", UTF8_MB4_GENERAL_CI, true),
        ("utf8mb4_unicode_ci", "utf8mb4", UTF8_MB4_UNICODE_CI, false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_collation_is_utf8mb4() {
        assert_eq!(
            collation_names().get(DEFAULT_COLLATION_NAME).copied(),
            Some(DEFAULT_COLLATION_ID)
        );
    }
}
