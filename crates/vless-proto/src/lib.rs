//! VLESS request header parsing and serialization.
//!
//! The parser is sans-io and zero-copy: it is handed the bytes buffered so
//! far and either completes, reports the minimum total length it needs, or
//! rejects the header. The caller owns the read loop.

use std::fmt;

use bytes::{Bytes, BytesMut};

/// Protocol version emitted in the response prefix.
pub const VERSION: u8 = 0x00;

/// The only supported command (TCP tunnel).
pub const CMD_TCP: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x02;
pub const ATYP_IPV6: u8 = 0x03;

/// Request UUID length in bytes.
pub const UUID_LEN: usize = 16;

/// Maximum domain name length (single length byte).
pub const MAX_DOMAIN_LEN: usize = 255;

// version + uuid + addon-length byte
const FIXED_PREFIX: usize = 1 + UUID_LEN + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Request UUID does not match the configured identity.
    InvalidUuid,
    /// Command is not TCP.
    UnsupportedCommand,
    InvalidAddressType,
    /// Domain address with a zero-length name.
    EmptyHostname,
}

/// Parse result for incremental parsing.
///
/// - `Complete(T)` - parsing succeeded, contains the parsed value.
/// - `Incomplete(n)` - buffer too small; `n` is the **minimum total bytes**
///   needed (not the additional bytes needed). Caller should accumulate more
///   data and retry.
/// - `Invalid(e)` - protocol violation, connection should be closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    Complete(T),
    Incomplete(usize),
    Invalid(ParseError),
}

/// Target host carried by a request, borrowed from the parse buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRef<'a> {
    Ipv4([u8; 4]),
    Ipv6([u8; 16]),
    Domain(&'a [u8]),
}

impl HostRef<'_> {
    /// Render the host the way it goes into a dial call.
    ///
    /// IPv6 is rendered as 8 colon-separated hex groups with per-group
    /// leading zeros dropped and **no** `::` run compression. Peers match on
    /// this exact textual form, so RFC 5952 canonicalization is out.
    pub fn to_hostname(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HostRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRef::Ipv4(octets) => write!(
                f,
                "{}.{}.{}.{}",
                octets[0], octets[1], octets[2], octets[3]
            ),
            HostRef::Ipv6(octets) => {
                for i in 0..8 {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    let group = u16::from_be_bytes([octets[2 * i], octets[2 * i + 1]]);
                    write!(f, "{group:x}")?;
                }
                Ok(())
            }
            HostRef::Domain(name) => {
                write!(f, "{}", String::from_utf8_lossy(name))
            }
        }
    }
}

/// A fully parsed request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlessRequest<'a> {
    pub version: u8,
    pub host: HostRef<'a>,
    pub port: u16,
    /// Total header length; `buf[header_len..]` is the first uplink payload.
    pub header_len: usize,
    /// Payload bytes already buffered past the header. May be empty.
    pub payload: &'a [u8],
}

impl VlessRequest<'_> {
    /// The two-byte response prefix sent to the client before any downlink
    /// payload: `[version, 0x00]`.
    #[inline]
    pub fn response_prefix(&self) -> [u8; 2] {
        [self.version, 0x00]
    }
}

/// Parse a request header from the bytes buffered so far.
///
/// The UUID comparison is byte-for-byte over all 16 bytes; lengths always
/// match because both sides are fixed-width.
#[inline]
pub fn parse_request<'a>(
    buf: &'a [u8],
    uuid: &[u8; UUID_LEN],
) -> ParseResult<VlessRequest<'a>> {
    if buf.len() < FIXED_PREFIX {
        return ParseResult::Incomplete(FIXED_PREFIX);
    }

    let version = buf[0];
    if &buf[1..1 + UUID_LEN] != uuid {
        return ParseResult::Invalid(ParseError::InvalidUuid);
    }
    let addon_len = buf[FIXED_PREFIX - 1] as usize;

    // command + port + address type
    let atype_end = FIXED_PREFIX + addon_len + 4;
    if buf.len() < atype_end {
        return ParseResult::Incomplete(atype_end);
    }

    let command = buf[FIXED_PREFIX + addon_len];
    if command != CMD_TCP {
        return ParseResult::Invalid(ParseError::UnsupportedCommand);
    }
    let port = u16::from_be_bytes([
        buf[FIXED_PREFIX + addon_len + 1],
        buf[FIXED_PREFIX + addon_len + 2],
    ]);
    let atype = buf[atype_end - 1];
    let addr_at = atype_end;

    let (host, header_len) = match atype {
        ATYP_IPV4 => {
            let header_len = addr_at + 4;
            if buf.len() < header_len {
                return ParseResult::Incomplete(header_len);
            }
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[addr_at..header_len]);
            (HostRef::Ipv4(octets), header_len)
        }
        ATYP_DOMAIN => {
            if buf.len() < addr_at + 1 {
                return ParseResult::Incomplete(addr_at + 1);
            }
            let name_len = buf[addr_at] as usize;
            if name_len == 0 {
                return ParseResult::Invalid(ParseError::EmptyHostname);
            }
            let header_len = addr_at + 1 + name_len;
            if buf.len() < header_len {
                return ParseResult::Incomplete(header_len);
            }
            (HostRef::Domain(&buf[addr_at + 1..header_len]), header_len)
        }
        ATYP_IPV6 => {
            let header_len = addr_at + 16;
            if buf.len() < header_len {
                return ParseResult::Incomplete(header_len);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[addr_at..header_len]);
            (HostRef::Ipv6(octets), header_len)
        }
        _ => return ParseResult::Invalid(ParseError::InvalidAddressType),
    };

    ParseResult::Complete(VlessRequest {
        version,
        host,
        port,
        header_len,
        payload: &buf[header_len..],
    })
}

/// Serialize a request header (the client side of the handshake).
///
/// Used by tests and by anything that needs to speak the protocol outbound.
/// Domains longer than 255 bytes are truncated by the length byte, so the
/// caller must not pass one.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_request(
    buf: &mut BytesMut,
    uuid: &[u8; UUID_LEN],
    host: &HostRef<'_>,
    port: u16,
) {
    buf.extend_from_slice(&[VERSION]);
    buf.extend_from_slice(uuid);
    buf.extend_from_slice(&[0x00, CMD_TCP]);
    buf.extend_from_slice(&port.to_be_bytes());
    match host {
        HostRef::Ipv4(octets) => {
            buf.extend_from_slice(&[ATYP_IPV4]);
            buf.extend_from_slice(octets);
        }
        HostRef::Ipv6(octets) => {
            buf.extend_from_slice(&[ATYP_IPV6]);
            buf.extend_from_slice(octets);
        }
        HostRef::Domain(name) => {
            debug_assert!(name.len() <= MAX_DOMAIN_LEN);
            buf.extend_from_slice(&[ATYP_DOMAIN, name.len() as u8]);
            buf.extend_from_slice(name);
        }
    }
}

/// Concatenate byte slices into one contiguous buffer.
///
/// Empty input yields an empty buffer; a single slice comes back unchanged.
pub fn concat(chunks: &[&[u8]]) -> Bytes {
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: [u8; UUID_LEN] = [
        0xd3, 0x42, 0xd1, 0x1e, 0xd4, 0x24, 0x4f, 0x8a, 0x90, 0x2b, 0x6e, 0xbd, 0x5e, 0x35,
        0x6c, 0xc4,
    ];

    fn frame(header_tail: &[u8], payload: &[u8]) -> Vec<u8> {
        // version, uuid, addon length 0, then the caller's tail
        concat(&[&[0x00], &UUID, &[0x00], header_tail, payload]).to_vec()
    }

    #[test]
    fn parse_ipv4() {
        // cmd=TCP port=443 atype=IPv4 1.2.3.4
        let buf = frame(&[0x01, 0x01, 0xBB, 0x01, 1, 2, 3, 4], b"HELLO");
        match parse_request(&buf, &UUID) {
            ParseResult::Complete(req) => {
                assert_eq!(req.host.to_hostname(), "1.2.3.4");
                assert_eq!(req.port, 443);
                assert_eq!(req.payload, b"HELLO");
                assert_eq!(req.response_prefix(), [0x00, 0x00]);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn parse_domain() {
        let buf = frame(
            &[0x01, 0x00, 0x50, 0x02, 0x09, b'l', b'o', b'c', b'a', b'l', b'h', b'o', b's', b't'],
            &[0x41, 0x42],
        );
        match parse_request(&buf, &UUID) {
            ParseResult::Complete(req) => {
                assert_eq!(req.host.to_hostname(), "localhost");
                assert_eq!(req.port, 80);
                assert_eq!(req.payload, &[0x41, 0x42]);
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn parse_ipv6_renders_uncompressed_groups() {
        let addr = [
            0x20, 0x01, 0x0D, 0xB8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
        ];
        let buf = frame(&concat(&[&[0x01, 0x01, 0xBB, 0x03], &addr]), b"");
        match parse_request(&buf, &UUID) {
            ParseResult::Complete(req) => {
                // no :: run compression, leading zeros dropped per group
                assert_eq!(req.host.to_hostname(), "2001:db8:0:0:0:0:0:1");
                assert_eq!(req.port, 443);
                assert!(req.payload.is_empty());
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn wrong_uuid_rejected() {
        let mut other = UUID;
        other[15] ^= 0xFF;
        let buf = frame(&[0x01, 0x01, 0xBB, 0x01, 1, 2, 3, 4], b"");
        assert_eq!(
            parse_request(&buf, &other),
            ParseResult::Invalid(ParseError::InvalidUuid)
        );
    }

    #[test]
    fn udp_command_rejected() {
        let buf = frame(&[0x02, 0x01, 0xBB, 0x01, 1, 2, 3, 4], b"");
        assert_eq!(
            parse_request(&buf, &UUID),
            ParseResult::Invalid(ParseError::UnsupportedCommand)
        );
    }

    #[test]
    fn unknown_address_type_rejected() {
        let buf = frame(&[0x01, 0x01, 0xBB, 0x04, 1, 2, 3, 4], b"");
        assert_eq!(
            parse_request(&buf, &UUID),
            ParseResult::Invalid(ParseError::InvalidAddressType)
        );
    }

    #[test]
    fn empty_domain_rejected() {
        let buf = frame(&[0x01, 0x01, 0xBB, 0x02, 0x00], b"");
        assert_eq!(
            parse_request(&buf, &UUID),
            ParseResult::Invalid(ParseError::EmptyHostname)
        );
    }

    #[test]
    fn truncation_reports_incomplete_at_every_offset() {
        let full = frame(
            &[0x01, 0x00, 0x50, 0x02, 0x09, b'l', b'o', b'c', b'a', b'l', b'h', b'o', b's', b't'],
            b"",
        );
        for cut in 0..full.len() {
            match parse_request(&full[..cut], &UUID) {
                ParseResult::Incomplete(need) => {
                    assert!(need > cut, "needed {need} with {cut} buffered");
                    assert!(need <= full.len());
                }
                other => panic!("cut at {cut}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn addons_are_skipped() {
        // addon length 3, three bytes of addon data, then the usual tail
        let buf = concat(&[
            &[0x00],
            &UUID,
            &[0x03, 0xAA, 0xBB, 0xCC],
            &[0x01, 0x01, 0xBB, 0x01, 9, 9, 9, 9],
            b"X",
        ]);
        match parse_request(&buf, &UUID) {
            ParseResult::Complete(req) => {
                assert_eq!(req.host.to_hostname(), "9.9.9.9");
                assert_eq!(req.payload, b"X");
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn encode_then_parse_roundtrip() {
        let mut buf = BytesMut::new();
        encode_request(&mut buf, &UUID, &HostRef::Domain(b"example.com"), 8443);
        buf.extend_from_slice(b"payload");
        match parse_request(&buf, &UUID) {
            ParseResult::Complete(req) => {
                assert_eq!(req.host.to_hostname(), "example.com");
                assert_eq!(req.port, 8443);
                assert_eq!(req.payload, b"payload");
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn concat_preserves_order_and_length() {
        assert!(concat(&[]).is_empty());
        assert_eq!(concat(&[b"abc"]), Bytes::from_static(b"abc"));
        let left = concat(&[concat(&[b"ab", b"cd"]).as_ref(), b"ef"]);
        let right = concat(&[b"ab", concat(&[b"cd", b"ef"]).as_ref()]);
        assert_eq!(left, right);
        assert_eq!(left.len(), 6);
        assert_eq!(left, Bytes::from_static(b"abcdef"));
    }
}
