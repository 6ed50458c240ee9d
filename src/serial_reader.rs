/*!
Serial ingestion activity: reads NMEA lines off the configured port and
feeds decoded UTC instants into [`crate::time_ref::TimeRef`].

Reconnects with exponential backoff on transport failure rather than
tearing down the process — a disconnected GPS receiver is an operating
condition, not a fatal error.
*/

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::nmea::{self, NmeaSentenceKind};
use crate::time_ref::TimeRef;

pub struct SerialReader {
    port_name: String,
    baud_rate: u32,
    nmea_type: NmeaSentenceKind,
    time_ref: Arc<TimeRef>,
    shutdown: Arc<AtomicBool>,
}

impl SerialReader {
    pub fn new(
        port_name: String,
        baud_rate: u32,
        nmea_type: NmeaSentenceKind,
        time_ref: Arc<TimeRef>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        SerialReader {
            port_name,
            baud_rate,
            nmea_type,
            time_ref,
            shutdown,
        }
    }

    pub fn run(&self) {
        let mut reconnect_delay = Duration::from_secs(1);
        let max_reconnect_delay = Duration::from_secs(60);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.run_once() {
                Ok(()) => {
                    info!("serial reader stopped");
                    break;
                }
                Err(e) => {
                    error!("serial reader error: {:#}", e);
                    if self.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    warn!("reconnecting to {} in {:?}", self.port_name, reconnect_delay);
                    std::thread::sleep(reconnect_delay);
                    reconnect_delay = std::cmp::min(reconnect_delay * 2, max_reconnect_delay);
                }
            }
        }
    }

    fn run_once(&self) -> anyhow::Result<()> {
        info!(
            "opening serial port {} at {} baud",
            self.port_name, self.baud_rate
        );

        let mut port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(Duration::from_millis(500))
            .open()?;

        let mut buffer = String::new();
        let mut read_buf = [0u8; 512];

        while !self.shutdown.load(Ordering::Relaxed) {
            match port.read(&mut read_buf) {
                Ok(0) => {}
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&read_buf[..n]);
                    buffer.push_str(&chunk);

                    while let Some(pos) = buffer.find('\n') {
                        let mono_before_read = Instant::now();
                        let line: String = buffer.drain(..=pos).collect();
                        let line = line.trim();

                        if line.is_empty() || !line.starts_with(self.nmea_type.prefix()) {
                            continue;
                        }

                        let decoded = nmea::decode(line, self.nmea_type);
                        if decoded == 0.0 {
                            debug!("discarded unparseable sentence: {}", line);
                            continue;
                        }

                        self.time_ref.set(decoded, mono_before_read);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}
