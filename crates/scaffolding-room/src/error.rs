//! Error types for the room layer.

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A member with this machine id is already present with a different
    /// name or vendor. Records are never edited in place.
    #[error("machine {machine_id} is already in the room as {existing}")]
    ProfileMismatch {
        machine_id: String,
        existing: String,
    },
}
