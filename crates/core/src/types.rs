/// Opaque record identifier, assigned at creation and immutable.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new short opaque id (first 8 hex chars of a v4 UUID).
///
/// Short ids keep worker names and result paths readable while remaining
/// unique enough for an in-memory registry.
pub fn new_entity_id() -> EntityId {
    let full = uuid::Uuid::new_v4().simple().to_string();
    full[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_eight_hex_chars() {
        let id = new_entity_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn entity_ids_differ() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
