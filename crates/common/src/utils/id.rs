use uuid::Uuid;

/// Generate a unique call identifier using UUID v4
pub fn generate_call_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_call_id_format() {
        let call_id = generate_call_id();

        // UUID v4 format: xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx
        assert_eq!(call_id.len(), 36);
        assert_eq!(call_id.chars().filter(|&c| c == '-').count(), 4);
        assert!(Uuid::parse_str(&call_id).is_ok());
    }

    #[test]
    fn test_generate_call_id_uniqueness() {
        let mut ids = HashSet::new();

        for _ in 0..1000 {
            let id = generate_call_id();
            assert!(ids.insert(id), "Generated duplicate call ID");
        }
    }

    #[test]
    fn test_generate_call_id_is_v4() {
        let call_id = generate_call_id();
        let uuid = Uuid::parse_str(&call_id).unwrap();

        assert_eq!(uuid.get_version_num(), 4);
    }
}
