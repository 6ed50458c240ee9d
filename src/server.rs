use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::packet::{self, NtpMode, NtpPacket};
use crate::queue::{WorkItem, WorkQueue};
use crate::serial_reader::SerialReader;
use crate::time_ref::TimeRef;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const QUEUE_POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns the shared `TimeRef` and work queue, and supervises the three
/// pipeline activities.
pub struct NtpServer {
    config: Config,
    time_ref: Arc<TimeRef>,
}

impl NtpServer {
    pub fn new(config: Config) -> Self {
        let time_ref = Arc::new(TimeRef::new(config.serial_delay));
        NtpServer { config, time_ref }
    }

    /// Opens the serial port and UDP socket, launches the three activities,
    /// and blocks until `shutdown` is set, at which point all three are
    /// joined and this returns.
    pub fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let bind_addr = format!("{}:123", self.config.ntp_address);
        let socket = UdpSocket::bind(&bind_addr)
            .with_context(|| format!("failed to bind UDP socket on {}", bind_addr))?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .context("failed to set socket read timeout")?;
        let socket = Arc::new(socket);

        info!("NTP server listening on {}", bind_addr);

        let queue = Arc::new(WorkQueue::new(WorkQueue::DEFAULT_CAPACITY));

        let serial_reader = SerialReader::new(
            self.config.serial_port.clone(),
            self.config.serial_baud,
            self.config.nmea_type,
            Arc::clone(&self.time_ref),
            Arc::clone(&shutdown),
        );
        let serial_handle = std::thread::spawn(move || serial_reader.run());

        let receiver_handle = {
            let socket = Arc::clone(&socket);
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || run_udp_receiver(socket, queue, shutdown))
        };

        let transmitter_handle = {
            let socket = Arc::clone(&socket);
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            let time_ref = Arc::clone(&self.time_ref);
            let serial_error = self.config.serial_error;
            let poll = self.config.ntp_poll;
            std::thread::spawn(move || {
                run_udp_transmitter(socket, queue, shutdown, time_ref, serial_error, poll)
            })
        };

        serial_handle.join().expect("serial reader thread panicked");
        receiver_handle.join().expect("UDP receiver thread panicked");
        transmitter_handle
            .join()
            .expect("UDP transmitter thread panicked");

        info!("NTP server stopped");
        Ok(())
    }
}

fn run_udp_receiver(socket: Arc<UdpSocket>, queue: Arc<WorkQueue>, shutdown: Arc<AtomicBool>) {
    let mut buffer = [0u8; 1500];

    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buffer) {
            Ok((size, client)) => {
                let rx_mono = Instant::now();

                let dropped = queue.push(WorkItem {
                    bytes: buffer[..size].to_vec(),
                    client,
                    rx_mono,
                });
                if dropped {
                    warn!("work queue full, dropped oldest pending reply");
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                error!("UDP receive error: {}", e);
            }
        }
    }
}

fn run_udp_transmitter(
    socket: Arc<UdpSocket>,
    queue: Arc<WorkQueue>,
    shutdown: Arc<AtomicBool>,
    time_ref: Arc<TimeRef>,
    serial_error: f64,
    poll: i8,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let Some(item) = queue.pop_timeout(QUEUE_POP_TIMEOUT) else {
            continue;
        };

        let request = match NtpPacket::from_bytes(&item.bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("dropping malformed packet from {}: {}", item.client, e);
                continue;
            }
        };

        if !matches!(request.mode, NtpMode::Client | NtpMode::SymmetricActive) {
            debug!("dropping request from {} with mode {:?}", item.client, request.mode);
            continue;
        }

        let (now_utc, ref_utc, root_delay) = time_ref.sample();
        let now_mono = Instant::now();
        let rx_utc = now_utc - now_mono.saturating_duration_since(item.rx_mono).as_secs_f64();
        let reply = packet::emit_reply(
            &request,
            rx_utc,
            ref_utc,
            root_delay,
            serial_error,
            poll,
            now_utc,
        );

        if let Err(e) = socket.send_to(&reply.to_bytes(), item.client) {
            error!("failed to send reply to {}: {}", item.client, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::LeapIndicator;

    #[test]
    fn accepted_modes_are_client_and_symmetric_active() {
        assert!(matches!(NtpMode::Client, NtpMode::Client | NtpMode::SymmetricActive));
        assert!(matches!(NtpMode::SymmetricActive, NtpMode::Client | NtpMode::SymmetricActive));
        assert!(!matches!(NtpMode::Broadcast, NtpMode::Client | NtpMode::SymmetricActive));
        assert!(!matches!(NtpMode::SymmetricPassive, NtpMode::Client | NtpMode::SymmetricActive));
    }

    #[test]
    fn emit_reply_used_by_transmitter_has_stratum_one() {
        let mut buf = [0u8; 48];
        buf[0] = 0b00_011_011;
        let req = NtpPacket::from_bytes(&buf).unwrap();
        let reply = packet::emit_reply(&req, 0.0, 0.0, 0.0, 0.0, 6, 0.0);
        assert_eq!(reply.stratum, 1);
        assert_eq!(reply.leap_indicator, LeapIndicator::NoWarning);
    }
}
