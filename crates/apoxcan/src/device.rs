use std::io::{Read, Write};

use apoxcan_transport::{Device, SerialDevice, TcpDevice};

/// Either kind of adapter connection, chosen at runtime from the command line.
pub enum AdapterDevice {
    Serial(SerialDevice),
    Tcp(TcpDevice),
}

impl Device for AdapterDevice {
    type Reader = Box<dyn Read + Send>;
    type Writer = Box<dyn Write + Send>;

    fn open(&mut self) -> apoxcan_transport::Result<(Self::Reader, Self::Writer)> {
        match self {
            Self::Serial(device) => {
                let (reader, writer) = device.open()?;
                Ok((Box::new(reader), Box::new(writer)))
            }
            Self::Tcp(device) => {
                let (reader, writer) = device.open()?;
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }

    fn close(&mut self) -> apoxcan_transport::Result<()> {
        match self {
            Self::Serial(device) => device.close(),
            Self::Tcp(device) => device.close(),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Serial(device) => device.name(),
            Self::Tcp(device) => device.name(),
        }
    }
}
