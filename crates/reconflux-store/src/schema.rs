//! Default document layout written when no usable store file exists.

use serde_json::{Map, Value};

/// Top-level categories and the operations recorded under each.
pub const DEFAULT_LAYOUT: &[(&str, &[&str])] = &[
    (
        "vulnerability",
        &["xss", "csrf", "clickjacking", "sql-injection", "ssl-tls"],
    ),
    (
        "network",
        &[
            "http-enum",
            "ssl-enum",
            "dns-brute",
            "nmap-scan",
            "smb-enum",
            "mysql-enum",
        ],
    ),
    (
        "encryption",
        &[
            "generate-key-pair-ecdsa",
            "sign-ecdsa",
            "verify-ecdsa",
            "encrypt-file",
            "decrypt-file",
            "generate-key-pair-ecdh",
            "generate-hmac",
            "verify-hmac",
            "generate-totp",
            "verify-totp",
        ],
    ),
    (
        "recon",
        &[
            "whois",
            "shodan",
            "censys",
            "google-dork",
            "technology",
            "email-harvest",
            "domain-info",
            "ssl-info",
            "subdomain-enum",
            "multi-source",
        ],
    ),
];

/// Build the default document: every category maps each operation to an empty list.
pub fn default_document() -> Map<String, Value> {
    DEFAULT_LAYOUT
        .iter()
        .map(|(category, operations)| {
            let operations = operations
                .iter()
                .map(|operation| ((*operation).to_owned(), Value::Array(Vec::new())))
                .collect::<Map<String, Value>>();
            ((*category).to_owned(), Value::Object(operations))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_has_every_category_and_empty_operations() {
        let document = default_document();

        assert_eq!(document.len(), 4);
        for (category, operations) in DEFAULT_LAYOUT {
            let entry = document
                .get(*category)
                .and_then(Value::as_object)
                .expect("category is an object");
            assert_eq!(entry.len(), operations.len());
            for operation in *operations {
                assert_eq!(entry.get(*operation), Some(&Value::Array(Vec::new())));
            }
        }
    }
}
