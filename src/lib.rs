// Core modules for gantry clearance checking
pub mod geometry;
pub mod mesh;
pub mod beam;
pub mod provider;
pub mod proxy;
pub mod overlaps;
pub mod candidates;
pub mod report;
pub mod session;
pub mod cache;
pub mod config;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use geometry::{AffineTransform, BoundingBox, Point3, RotationOrder};
pub use mesh::{Mesh, MeshError, MeshUnit};
pub use beam::{Beam, BeamSet, Isocenter, FULL_ARC_BEAM};
pub use provider::{HostError, MeshStructureProvider, SolidHandle, StructureProvider};
pub use overlaps::{Callbacks, OverlapMatrix, Overlaps};
pub use config::CollisionConfig;
pub use session::{run_check, AutoReviewer, Disposition, Reviewer};

/// Main result type for collision checking
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for collision checking
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No valid structures found for comparison")]
    NoCandidates,

    #[error("Invalid margin: {0} cm")]
    InvalidMargin(f64),

    #[error("'{0}' was generated by this session and cannot be a candidate")]
    GeneratedCandidate(String),

    #[error("Unsupported patient position: {0}")]
    UnsupportedPatientPosition(String),

    #[error("Full arc check requested but the beam set has no isocenter")]
    MissingIsocenter,

    #[error("Session setup failed: {0}")]
    Setup(HostError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
