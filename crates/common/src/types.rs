use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of a pipeline row.
///
/// Every table in the pipeline (raw events, users, orders, identities)
/// keys its rows with one of these. The newtype keeps row keys from being
/// confused with the external numeric ids the commerce platform sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps a UUID read back from storage.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID by value.
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RecordId> for Uuid {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_never_collide() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_round_trips_through_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(RecordId::from_uuid(uuid).as_uuid(), uuid);
    }

    #[test]
    fn test_as_uuid_maps_over_optional_columns() {
        // Nullable foreign-key columns bind as `Option<Uuid>`.
        let id = RecordId::new();
        assert_eq!(Some(id).map(RecordId::as_uuid), Some(id.as_uuid()));
        assert_eq!(None::<RecordId>.map(RecordId::as_uuid), None);
    }

    #[test]
    fn test_serializes_as_a_bare_uuid_string() {
        let id = RecordId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
