//! Deterministic identifiers derived from (message path, service, method).

use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Converts PascalCase or camelCase to snake_case by inserting `_` before
/// every uppercase letter after the first and lowercasing everything.
///
/// `"GetBook"` becomes `"get_book"`, `"GetAuthorNameFromBookId"` becomes
/// `"get_author_name_from_book_id"`.
pub fn pascal_to_snake(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// The globally unique method address:
/// `{message_path}.{service_name}.{method_name}`.
///
/// Uniqueness across services with same-named methods comes from the full
/// message path prefix.
pub fn method_address(message_path: &str, service: &str, method: &str) -> String {
    format!("{message_path}.{service}.{method}")
}

/// A short but still unique identifier for binary filenames: the first 12
/// hex characters of the sha256 of the method address, joined to the method
/// name for readability.
pub fn short_method_id(message_path: &str, service: &str, method: &str) -> String {
    let address = method_address(message_path, service, method);
    let digest = Sha256::digest(address.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}_{method}", &hex[..12])
}

/// The emitted directory for a method, relative to the output root:
/// `{last segment of message path}/{service_snake}/{method_snake}`.
pub fn dir_path(message_path: &str, service: &str, method: &str) -> PathBuf {
    let package = message_path.rsplit("::").next().unwrap_or(message_path);
    PathBuf::from(package)
        .join(pascal_to_snake(service))
        .join(pascal_to_snake(method))
}
