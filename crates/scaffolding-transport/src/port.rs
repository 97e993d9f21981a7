//! Local port allocation.

use std::net::{Ipv4Addr, TcpListener};

use crate::TransportError;

/// Returns a local TCP port that can currently be bound.
///
/// Tries `preferred` first (unless it is 0), then asks the OS for an
/// ephemeral port. The probe socket is released before returning, so the
/// caller must bind the port promptly.
pub fn allocate_port(preferred: u16) -> Result<u16, TransportError> {
    if preferred != 0 {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, preferred)) {
            Ok(_) => return Ok(preferred),
            Err(e) => {
                tracing::info!(
                    port = preferred,
                    error = %e,
                    "preferred port unavailable, allocating an ephemeral one"
                );
            }
        }
    }

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|e| {
        tracing::error!(error = %e, "failed to allocate port");
        TransportError::PortAllocationFailed(e)
    })?;
    let port = listener
        .local_addr()
        .map_err(TransportError::PortAllocationFailed)?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_port_zero_returns_ephemeral_port() {
        let port = allocate_port(0).unwrap();
        assert_ne!(port, 0);
    }

    #[test]
    fn test_allocate_port_free_preferred_is_returned() {
        let free = allocate_port(0).unwrap();
        assert_eq!(allocate_port(free).unwrap(), free);
    }

    #[test]
    fn test_allocate_port_busy_preferred_falls_back() {
        let held = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let busy = held.local_addr().unwrap().port();

        let port = allocate_port(busy).unwrap();

        assert_ne!(port, busy);
        assert_ne!(port, 0);
    }
}
