use cryo_traits::AxisId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport timeout on {0}")]
    Timeout(AxisId),
    #[error("{axis} rejected command: {reason}")]
    Rejected { axis: AxisId, reason: String },
    #[error("{axis} setpoint {setpoint} outside [{min}, {max}]")]
    OutOfRange {
        axis: AxisId,
        setpoint: f64,
        min: f64,
        max: f64,
    },
    #[error("simulator state poisoned")]
    Poisoned,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
