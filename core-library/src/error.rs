use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Entity already exists: {entity_type} with id {id}")]
    AlreadyExists { entity_type: String, id: String },
}

impl LibraryError {
    pub fn track_not_found(id: impl ToString) -> Self {
        LibraryError::NotFound {
            entity_type: "Track".to_string(),
            id: id.to_string(),
        }
    }

    pub fn playlist_not_found(id: impl ToString) -> Self {
        LibraryError::NotFound {
            entity_type: "Playlist".to_string(),
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
