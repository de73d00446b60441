use super::table::Joint;

/// Error types for the servo core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServoError {
    #[error("Point ({x}, {y}) is outside the reachable annulus")]
    Unreachable { x: f32, y: f32 },

    #[error("Pulse width {ticks} for {joint} joint outside [{min}, {max}] ticks")]
    OutOfRange {
        joint: Joint,
        ticks: i32,
        min: u16,
        max: u16,
    },

    #[error("Unknown joint index {0}")]
    UnknownJoint(u8),

    #[error("Servo timer already initialized")]
    AlreadyInitialized,

    #[error("Output line error: {0}")]
    Line(String),
}

pub type Result<T> = std::result::Result<T, ServoError>;
