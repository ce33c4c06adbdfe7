use serde_json::{Map, Value};

use crate::cipher::{CipherError, FieldCipher};

impl FieldCipher {
    /// Encrypt the named string fields of a record in place.
    ///
    /// Absent fields, empty strings, and non-string values are left untouched,
    /// so optional PII columns can stay null without special-casing callers.
    pub fn encrypt_fields(
        &self,
        record: &mut Map<String, Value>,
        fields: &[&str],
    ) -> Result<(), CipherError> {
        self.apply_fields(record, fields, |c, s| c.encrypt(s))
    }

    /// Decrypt the named string fields of a record in place.
    pub fn decrypt_fields(
        &self,
        record: &mut Map<String, Value>,
        fields: &[&str],
    ) -> Result<(), CipherError> {
        self.apply_fields(record, fields, |c, s| c.decrypt(s))
    }

    fn apply_fields(
        &self,
        record: &mut Map<String, Value>,
        fields: &[&str],
        op: impl Fn(&FieldCipher, &str) -> Result<String, CipherError>,
    ) -> Result<(), CipherError> {
        for name in fields {
            let Some(Value::String(current)) = record.get(*name) else {
                continue;
            };
            if current.is_empty() {
                continue;
            }
            let transformed = op(self, current)?;
            record.insert((*name).to_string(), Value::String(transformed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cipher() -> FieldCipher {
        FieldCipher::new("test-field-secret").unwrap()
    }

    fn record() -> Map<String, Value> {
        json!({
            "id": "u-1",
            "email": "kit@example.com",
            "name": "Kit Carter",
            "bio": "",
            "age": 34,
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn named_fields_roundtrip() {
        let c = cipher();
        let mut rec = record();

        c.encrypt_fields(&mut rec, &["email", "name"]).unwrap();
        assert_ne!(rec["email"], json!("kit@example.com"));
        assert_ne!(rec["name"], json!("Kit Carter"));
        // Untouched fields stay as they were.
        assert_eq!(rec["id"], json!("u-1"));
        assert_eq!(rec["age"], json!(34));

        c.decrypt_fields(&mut rec, &["email", "name"]).unwrap();
        assert_eq!(rec["email"], json!("kit@example.com"));
        assert_eq!(rec["name"], json!("Kit Carter"));
    }

    #[test]
    fn empty_and_absent_fields_untouched() {
        let c = cipher();
        let mut rec = record();

        c.encrypt_fields(&mut rec, &["bio", "phone"]).unwrap();
        assert_eq!(rec["bio"], json!(""));
        assert!(!rec.contains_key("phone"));
    }

    #[test]
    fn non_string_fields_untouched() {
        let c = cipher();
        let mut rec = record();

        c.encrypt_fields(&mut rec, &["age"]).unwrap();
        assert_eq!(rec["age"], json!(34));
    }
}
