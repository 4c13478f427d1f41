//! Serial port access for live sessions.

use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use crate::error::SessionError;

/// Open `port` at `baud` as an async stream.
///
/// RTS is released after opening; some boards hold in reset while it is
/// asserted.
pub fn open_port(port: &str, baud: u32) -> Result<SerialStream, SessionError> {
    log::info!("Opening serial port {} at {} baud", port, baud);

    let mut stream = tokio_serial::new(port, baud)
        .open_native_async()
        .map_err(|source| SessionError::Open {
            port: port.to_string(),
            source,
        })?;

    if let Err(e) = stream.write_request_to_send(false) {
        log::warn!("failed to clear RTS on {}: {}", port, e);
    }

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_port_is_open_error() {
        match open_port("/dev/meshstat-no-such-port", 115_200) {
            Err(SessionError::Open { port, .. }) => assert_eq!(port, "/dev/meshstat-no-such-port"),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }
}
