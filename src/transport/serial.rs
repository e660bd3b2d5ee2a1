use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::link::{LinkParts, TransportPort, TransportReader, TransportWriter};
use super::{Result, SessionConfig, TransportError, BAUD_RATE, DATA_BITS, PARITY, STOP_BITS};

const READ_BUF_SIZE: usize = 256;

/// Open the named serial port with the fixed desk configuration and split it
/// into the session's link parts.
pub(crate) fn open_link(config: &SessionConfig) -> Result<LinkParts> {
    // Enumeration failing outright means the host has no usable serial stack.
    serialport::available_ports()
        .map_err(|e| TransportError::CapabilityUnavailable(e.to_string()))?;

    let stream = tokio_serial::new(&config.port_name, BAUD_RATE)
        .data_bits(DATA_BITS)
        .stop_bits(STOP_BITS)
        .parity(PARITY)
        .open_native_async()
        .map_err(|e| TransportError::DeviceError(e.to_string()))?;

    log::info!("Opened serial port {} at {} baud", config.port_name, BAUD_RATE);

    let (read_half, write_half) = tokio::io::split(stream);
    Ok(LinkParts {
        reader: Box::new(SerialReader { half: read_half }),
        writer: Box::new(SerialWriter { half: write_half }),
        port: Box::new(SerialHandle {
            port_name: config.port_name.clone(),
        }),
    })
}

struct SerialReader {
    half: ReadHalf<SerialStream>,
}

#[async_trait]
impl TransportReader for SerialReader {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; READ_BUF_SIZE];
        match self.half.read(&mut buf).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    async fn cancel(&mut self) -> Result<()> {
        // Native reads are dropped with the read loop; nothing is pending here.
        Ok(())
    }
}

struct SerialWriter {
    half: WriteHalf<SerialStream>,
}

#[async_trait]
impl TransportWriter for SerialWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.half.write_all(bytes).await?;
        self.half.flush().await?;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.half.shutdown().await?;
        Ok(())
    }
}

struct SerialHandle {
    port_name: String,
}

#[async_trait]
impl TransportPort for SerialHandle {
    async fn close(&mut self) -> Result<()> {
        // The device handle is owned by the split halves; dropping them closes
        // it. This step only marks the port as released.
        log::info!("Closed serial port {}", self.port_name);
        Ok(())
    }
}
