//! Maps `Box<dyn Error>` from transport boundaries to typed `CryoError`.
//!
//! The traits in `cryo_traits` use `Box<dyn Error + Send + Sync>` so
//! transports keep their own error types; this module converts those to our
//! typed error enum, with an optional feature-gated path for
//! `cryo_hardware::TransportError` downcasting.

use cryo_traits::AxisId;

use crate::error::{CryoError, UnresponsiveReason};

/// Map a transport-boundary error raised while performing `op` on `axis`.
///
/// Known transport error types are downcast first; anything else falls back
/// to string-based detection of timeouts.
pub fn map_transport_error(
    axis: AxisId,
    op: &str,
    e: &(dyn std::error::Error + 'static),
) -> CryoError {
    #[cfg(feature = "hardware-errors")]
    {
        use cryo_hardware::TransportError;
        if let Some(te) = e.downcast_ref::<TransportError>() {
            return match te {
                TransportError::Timeout(_) => CryoError::HardwareUnresponsive {
                    axis,
                    reason: UnresponsiveReason::Timeout,
                },
                other => CryoError::TransportFault(format!("{axis} {op}: {other}")),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        CryoError::HardwareUnresponsive {
            axis,
            reason: UnresponsiveReason::Timeout,
        }
    } else {
        CryoError::Transport(format!("{axis} {op}: {s}"))
    }
}
