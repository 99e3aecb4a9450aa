use thiserror::Error;

#[derive(Error, Debug)]
pub enum TmpError {
    #[error("Failed to load template: {0}")]
    TemplateLoad(String),

    #[error("Unknown hazard key: {0}")]
    UnknownHazardKey(String),

    #[error("Hazard key selected more than once: {0}")]
    DuplicateHazardKey(String),

    #[error("Failed to place field: {0}")]
    FieldPlacement(String),

    #[error("Failed to decode diagram image: {0}")]
    ImageDecode(String),

    #[error("Failed to write document: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TmpError {
    /// Stable tag for JSON callers that branch on the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            TmpError::TemplateLoad(_) => "template_load",
            TmpError::UnknownHazardKey(_) => "unknown_hazard_key",
            TmpError::DuplicateHazardKey(_) => "duplicate_hazard_key",
            TmpError::FieldPlacement(_) => "field_placement",
            TmpError::ImageDecode(_) => "image_decode",
            TmpError::Serialization(_) => "serialization",
            TmpError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, TmpError>;
