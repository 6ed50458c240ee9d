use thiserror::Error;

/// Errors that can occur while parsing a wire-format NTP packet.
#[derive(Error, Debug)]
pub enum NtpError {
    #[error("invalid packet size: expected at least {expected}, got {actual}")]
    InvalidSize { expected: usize, actual: usize },

    #[error("invalid NTP version: {0}")]
    InvalidVersion(u8),
}

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
pub const UTC_TO_NTP: i64 = 2_208_988_800;

/// Advertised clock precision, `2^-16` seconds.
pub const CLK_PRECISION: f64 = 1.0 / 65_536.0;

/// `round(log2(CLK_PRECISION))`, baked in since `CLK_PRECISION` is fixed.
pub const PRECISION_LOG2: i8 = -16;

/// Leap Indicator values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeapIndicator {
    NoWarning = 0,
    LastMinute61Seconds = 1,
    LastMinute59Seconds = 2,
    AlarmCondition = 3,
}

impl From<u8> for LeapIndicator {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => LeapIndicator::NoWarning,
            1 => LeapIndicator::LastMinute61Seconds,
            2 => LeapIndicator::LastMinute59Seconds,
            _ => LeapIndicator::AlarmCondition,
        }
    }
}

/// NTP Mode values. The 3-bit field covers all 8 variants, so decoding never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtpMode {
    Reserved = 0,
    SymmetricActive = 1,
    SymmetricPassive = 2,
    Client = 3,
    Server = 4,
    Broadcast = 5,
    NtpControlMessage = 6,
    ReservedPrivate = 7,
}

impl From<u8> for NtpMode {
    fn from(value: u8) -> Self {
        match value & 0x07 {
            0 => NtpMode::Reserved,
            1 => NtpMode::SymmetricActive,
            2 => NtpMode::SymmetricPassive,
            3 => NtpMode::Client,
            4 => NtpMode::Server,
            5 => NtpMode::Broadcast,
            6 => NtpMode::NtpControlMessage,
            _ => NtpMode::ReservedPrivate,
        }
    }
}

/// Converts UTC seconds since 1970 to an NTP 32.32 fixed-point timestamp.
///
/// Integer and fractional parts are computed separately in integer arithmetic;
/// a float of magnitude `2^62` cannot represent the combined value exactly.
pub fn utc_to_ntp(utc: f64) -> u64 {
    let int_part = utc.floor();
    let frac = (utc - int_part).abs();
    let frac_bits = (frac * (1u64 << 32) as f64).floor() as u64;
    let ntp_seconds = (int_part as i64).wrapping_add(UTC_TO_NTP) as u64;
    (ntp_seconds << 32) | frac_bits
}

/// Inverse of [`utc_to_ntp`].
pub fn ntp_to_utc(raw: u64) -> f64 {
    let ntp_seconds = (raw >> 32) as i64;
    let frac_bits = (raw & 0xFFFF_FFFF) as f64;
    (ntp_seconds - UTC_TO_NTP) as f64 + frac_bits / (1u64 << 32) as f64
}

/// Converts a plain seconds value to a signed 16.16 fixed-point field
/// (used for Root Delay and Root Dispersion).
pub fn to_16_16(x: f64) -> i32 {
    let int_part = x.floor();
    let frac = (x - int_part).abs();
    let frac_bits = (frac * (1u64 << 16) as f64).floor() as i32;
    ((int_part as i32) << 16) | frac_bits
}

/// Inverse of [`to_16_16`].
pub fn from_16_16(v: i32) -> f64 {
    let int_part = v >> 16;
    let frac_bits = (v & 0xFFFF) as f64;
    int_part as f64 + frac_bits / 65_536.0
}

/// A 48-byte NTP header, network byte order throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpPacket {
    pub leap_indicator: LeapIndicator,
    pub version: u8,
    pub mode: NtpMode,

    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,

    pub root_delay: i32,
    pub root_dispersion: i32,
    pub reference_identifier: u32,

    pub reference_timestamp: u64,
    pub originate_timestamp: u64,
    pub receive_timestamp: u64,
    pub transmit_timestamp: u64,
}

impl NtpPacket {
    pub const SIZE: usize = 48;

    /// Parses a request. Rejects anything shorter than 48 bytes or with VN
    /// outside `1..=4`. The mode byte is decoded unconditionally — whether a
    /// given mode earns a reply is a pipeline decision, not a codec one.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NtpError> {
        if bytes.len() < Self::SIZE {
            return Err(NtpError::InvalidSize {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let li_vn_mode = bytes[0];
        let leap_indicator = LeapIndicator::from((li_vn_mode >> 6) & 0x03);
        let version = (li_vn_mode >> 3) & 0x07;
        let mode = NtpMode::from(li_vn_mode & 0x07);

        if version < 1 || version > 4 {
            return Err(NtpError::InvalidVersion(version));
        }

        let stratum = bytes[1];
        let poll = bytes[2] as i8;
        let precision = bytes[3] as i8;

        let root_delay = i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let root_dispersion = i32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let reference_identifier =
            u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        let reference_timestamp = u64::from_be_bytes([
            bytes[16], bytes[17], bytes[18], bytes[19], bytes[20], bytes[21], bytes[22],
            bytes[23],
        ]);
        let originate_timestamp = u64::from_be_bytes([
            bytes[24], bytes[25], bytes[26], bytes[27], bytes[28], bytes[29], bytes[30],
            bytes[31],
        ]);
        let receive_timestamp = u64::from_be_bytes([
            bytes[32], bytes[33], bytes[34], bytes[35], bytes[36], bytes[37], bytes[38],
            bytes[39],
        ]);
        let transmit_timestamp = u64::from_be_bytes([
            bytes[40], bytes[41], bytes[42], bytes[43], bytes[44], bytes[45], bytes[46],
            bytes[47],
        ]);

        Ok(NtpPacket {
            leap_indicator,
            version,
            mode,
            stratum,
            poll,
            precision,
            root_delay,
            root_dispersion,
            reference_identifier,
            reference_timestamp,
            originate_timestamp,
            receive_timestamp,
            transmit_timestamp,
        })
    }

    /// Serialises the packet, mirroring `from_bytes` byte-for-byte.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];

        bytes[0] = ((self.leap_indicator as u8) << 6)
            | ((self.version & 0x07) << 3)
            | (self.mode as u8 & 0x07);
        bytes[1] = self.stratum;
        bytes[2] = self.poll as u8;
        bytes[3] = self.precision as u8;

        bytes[4..8].copy_from_slice(&self.root_delay.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.root_dispersion.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.reference_identifier.to_be_bytes());
        bytes[16..24].copy_from_slice(&self.reference_timestamp.to_be_bytes());
        bytes[24..32].copy_from_slice(&self.originate_timestamp.to_be_bytes());
        bytes[32..40].copy_from_slice(&self.receive_timestamp.to_be_bytes());
        bytes[40..48].copy_from_slice(&self.transmit_timestamp.to_be_bytes());

        bytes
    }
}

/// Builds a Stratum 1 server reply to `req`.
///
/// `now_utc` must be sampled immediately before this call — it becomes the
/// Transmit timestamp, and the caller is expected to serialise and send the
/// result with nothing else in between.
#[allow(clippy::too_many_arguments)]
pub fn emit_reply(
    req: &NtpPacket,
    rx_utc: f64,
    ref_utc: f64,
    root_delay: f64,
    serial_error: f64,
    poll: i8,
    now_utc: f64,
) -> NtpPacket {
    NtpPacket {
        leap_indicator: LeapIndicator::NoWarning,
        version: 3,
        mode: NtpMode::Server,
        stratum: 1,
        poll,
        precision: PRECISION_LOG2,
        root_delay: to_16_16(root_delay),
        root_dispersion: to_16_16(serial_error),
        reference_identifier: u32::from_be_bytes(*b"GPS\0"),
        reference_timestamp: utc_to_ntp(ref_utc),
        originate_timestamp: req.transmit_timestamp,
        receive_timestamp: utc_to_ntp(rx_utc),
        transmit_timestamp: utc_to_ntp(now_utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_round_trip() {
        let utc = 1_718_454_919.5;
        let raw = utc_to_ntp(utc);
        let back = ntp_to_utc(raw);
        assert!((utc - back).abs() < 1e-9);
    }

    #[test]
    fn to_16_16_matches_within_one_lsb() {
        let x = 12345.25_f64;
        let v = to_16_16(x);
        let back = from_16_16(v);
        assert!((x - back).abs() < 2f64.powi(-16));
    }

    #[test]
    fn reject_short_packet() {
        let buf = [0u8; 47];
        assert!(matches!(
            NtpPacket::from_bytes(&buf),
            Err(NtpError::InvalidSize { .. })
        ));
    }

    #[test]
    fn accept_exact_and_overlong_packet() {
        let buf48 = [0u8; 48];
        assert!(NtpPacket::from_bytes(&buf48).is_ok());

        let buf1024 = [0u8; 1024];
        assert!(NtpPacket::from_bytes(&buf1024).is_ok());
    }

    #[test]
    fn reject_invalid_version() {
        let mut buf = [0u8; 48];
        buf[0] = 0b00_000_011; // VN = 0
        assert!(matches!(
            NtpPacket::from_bytes(&buf),
            Err(NtpError::InvalidVersion(0))
        ));

        buf[0] = 0b00_101_011; // VN = 5
        assert!(matches!(
            NtpPacket::from_bytes(&buf),
            Err(NtpError::InvalidVersion(5))
        ));
    }

    #[test]
    fn origin_timestamp_echoes_request_transmit_timestamp() {
        let mut buf = [0u8; 48];
        buf[0] = 0b00_011_011; // LI=0, VN=3, Mode=3 (client)
        buf[40..48].copy_from_slice(&0xDEAD_BEEF_CAFE_BABEu64.to_be_bytes());

        let req = NtpPacket::from_bytes(&buf).unwrap();
        let reply = emit_reply(&req, 0.0, 0.0, 0.0, 0.0, 4, 0.0);

        assert_eq!(reply.originate_timestamp, 0xDEAD_BEEF_CAFE_BABE);
        assert_eq!(reply.to_bytes()[24..32], buf[40..48]);
    }

    #[test]
    fn reply_invariants() {
        let mut buf = [0u8; 48];
        buf[0] = 0b00_011_011;
        let req = NtpPacket::from_bytes(&buf).unwrap();
        let reply = emit_reply(&req, 100.0, 100.0, 0.001, 0.0005, 6, 100.25);

        assert_eq!(reply.stratum, 1);
        assert_eq!(reply.leap_indicator, LeapIndicator::NoWarning);
        assert_eq!(reply.version, 3);
        assert_eq!(reply.mode, NtpMode::Server);
        assert_eq!(reply.reference_identifier, u32::from_be_bytes(*b"GPS\0"));
        assert!(reply.receive_timestamp <= reply.transmit_timestamp);
    }
}
