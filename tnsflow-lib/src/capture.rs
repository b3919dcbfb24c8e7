use crate::error::TnsError;
use bytes::Bytes;
use pcap_parser::{Block, PcapBlockOwned, PcapError, create_reader};
use std::fs::File;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::{debug, info, warn};

/// Legacy pcap magic written by nanosecond-precision capture tools.
const PCAP_MAGIC_NANOSECOND: u32 = 0xA1B2_3C4D;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;
const IP_PROTO_TCP: u8 = 6;
const ETHERNET_HEADER_LEN: usize = 14;

/// One application-layer frame: TCP payload bytes plus the transport
/// metadata the dissector needs.
#[derive(Debug, Clone)]
pub struct Frame {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Capture timestamp, nanoseconds since epoch
    pub timestamp_ns: i64,
    pub payload: Bytes,
}

/// Everything read from one capture file.
#[derive(Debug, Default)]
pub struct CaptureRead {
    /// Frames matching the host/port filter, in file order
    pub frames: Vec<Frame>,
    /// IPv4/TCP packets whose headers were truncated or inconsistent
    pub malformed_frames: u64,
    /// Total packets seen in the capture, matching or not
    pub total_packets: u64,
}

/// Read a pcap or pcapng file and yield, in file order, every TCP frame
/// with a non-empty payload that involves one of the database IPs and
/// the database port, the equivalent of a `host <ip> and port <port>`
/// capture filter.
///
/// pcapng timestamps are interpreted at the default microsecond
/// resolution; per-interface `if_tsresol` options are not honored.
pub fn read_capture<P: AsRef<Path>>(
    path: P,
    db_ips: &[Ipv4Addr],
    db_port: u16,
) -> Result<CaptureRead, TnsError> {
    let file = File::open(path.as_ref())?;
    let mut reader = create_reader(65536, file)
        .map_err(|e| TnsError::Capture(format!("failed to open capture: {e:?}")))?;
    info!(path = %path.as_ref().display(), "opened capture file");

    let mut read = CaptureRead::default();
    // nanoseconds per legacy timestamp fraction unit
    let mut ts_fraction_ns: i64 = 1_000;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        if header.magic_number == PCAP_MAGIC_NANOSECOND {
                            ts_fraction_ns = 1;
                        }
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        read.total_packets += 1;
                        let ts_ns = i64::from(packet.ts_sec) * 1_000_000_000
                            + i64::from(packet.ts_usec) * ts_fraction_ns;
                        dissect_frame(packet.data, ts_ns, db_ips, db_port, &mut read);
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        read.total_packets += 1;
                        let units = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);
                        let ts_ns = (units as i64) * 1_000;
                        dissect_frame(epb.data, ts_ns, db_ips, db_port, &mut read);
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| TnsError::Capture(format!("refill failed: {e:?}")))?;
            }
            Err(e) => return Err(TnsError::Capture(format!("capture read failed: {e:?}"))),
        }
    }

    info!(
        frames = read.frames.len(),
        malformed = read.malformed_frames,
        total = read.total_packets,
        "capture ingested"
    );
    Ok(read)
}

/// Slice one link-layer packet down to its TCP payload and apply the
/// host/port filter. Truncation never panics; it counts as malformed.
fn dissect_frame(data: &[u8], ts_ns: i64, db_ips: &[Ipv4Addr], db_port: u16, read: &mut CaptureRead) {
    let frame = match slice_tcp(data, ts_ns) {
        SlicedFrame::Tcp(frame) => frame,
        SlicedFrame::OtherProtocol => return,
        SlicedFrame::Malformed => {
            warn!("truncated or inconsistent frame, skipping");
            read.malformed_frames += 1;
            return;
        }
    };
    if frame.payload.is_empty() {
        return;
    }
    let host_matches = db_ips.contains(&frame.src_ip) || db_ips.contains(&frame.dst_ip);
    let port_matches = frame.src_port == db_port || frame.dst_port == db_port;
    if host_matches && port_matches {
        debug!(
            src = %frame.src_ip,
            dst = %frame.dst_ip,
            len = frame.payload.len(),
            "frame matched capture filter"
        );
        read.frames.push(frame);
    }
}

enum SlicedFrame {
    Tcp(Frame),
    OtherProtocol,
    Malformed,
}

fn slice_tcp(data: &[u8], ts_ns: i64) -> SlicedFrame {
    if data.len() < ETHERNET_HEADER_LEN {
        return SlicedFrame::Malformed;
    }

    // Ethernet II, skipping any VLAN tags
    let mut ethertype_at = 12;
    let mut ethertype = match be16(data, ethertype_at) {
        Some(v) => v,
        None => return SlicedFrame::Malformed,
    };
    while ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ {
        ethertype_at += 4;
        ethertype = match be16(data, ethertype_at) {
            Some(v) => v,
            None => return SlicedFrame::Malformed,
        };
    }
    if ethertype != ETHERTYPE_IPV4 {
        return SlicedFrame::OtherProtocol;
    }

    // IPv4
    let ip_start = ethertype_at + 2;
    let ip = &data[ip_start..];
    if ip.is_empty() || ip[0] >> 4 != 4 {
        return SlicedFrame::Malformed;
    }
    let ihl = usize::from(ip[0] & 0x0f) * 4;
    let total_len = match be16(ip, 2) {
        Some(v) => usize::from(v),
        None => return SlicedFrame::Malformed,
    };
    if ihl < 20 || total_len < ihl || ip.len() < total_len {
        return SlicedFrame::Malformed;
    }
    if ip[9] != IP_PROTO_TCP {
        return SlicedFrame::OtherProtocol;
    }
    let src_ip = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    let dst_ip = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    // TCP
    let tcp = &ip[ihl..total_len];
    if tcp.len() < 20 {
        return SlicedFrame::Malformed;
    }
    let data_offset = usize::from(tcp[12] >> 4) * 4;
    if data_offset < 20 || tcp.len() < data_offset {
        return SlicedFrame::Malformed;
    }

    SlicedFrame::Tcp(Frame {
        src_ip,
        dst_ip,
        src_port: u16::from_be_bytes([tcp[0], tcp[1]]),
        dst_port: u16::from_be_bytes([tcp[2], tcp[3]]),
        seq: u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]),
        ack: u32::from_be_bytes([tcp[8], tcp[9], tcp[10], tcp[11]]),
        timestamp_ns: ts_ns,
        payload: Bytes::copy_from_slice(&tcp[data_offset..]),
    })
}

fn be16(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(at)?, *data.get(at + 1)?]))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-build an Ethernet/IPv4/TCP packet around a payload.
    fn build_packet(
        src_ip: [u8; 4],
        src_port: u16,
        dst_ip: [u8; 4],
        dst_port: u16,
        seq: u32,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut packet = vec![0u8; ETHERNET_HEADER_LEN];
        packet[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

        let total_len = 20 + 20 + payload.len();
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        ip[8] = 64;
        ip[9] = IP_PROTO_TCP;
        ip[12..16].copy_from_slice(&src_ip);
        ip[16..20].copy_from_slice(&dst_ip);
        packet.extend_from_slice(&ip);

        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[4..8].copy_from_slice(&seq.to_be_bytes());
        tcp[8..12].copy_from_slice(&(seq.wrapping_add(1)).to_be_bytes());
        tcp[12] = 5 << 4;
        packet.extend_from_slice(&tcp);
        packet.extend_from_slice(payload);
        packet
    }

    #[test]
    fn slices_a_tcp_packet() {
        let packet = build_packet([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001, 42, b"payload");
        let frame = match slice_tcp(&packet, 7) {
            SlicedFrame::Tcp(frame) => frame,
            _ => panic!("expected a TCP frame"),
        };
        assert_eq!(frame.src_ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(frame.dst_ip, Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(frame.src_port, 1521);
        assert_eq!(frame.dst_port, 40001);
        assert_eq!(frame.seq, 42);
        assert_eq!(frame.timestamp_ns, 7);
        assert_eq!(frame.payload.as_ref(), b"payload");
    }

    #[test]
    fn vlan_tag_is_skipped() {
        let mut packet = build_packet([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001, 1, b"x");
        // splice a VLAN tag in after the MAC addresses
        let tag = [0x81, 0x00, 0x00, 0x64];
        let mut tagged = packet[..12].to_vec();
        tagged.extend_from_slice(&tag);
        tagged.extend_from_slice(&packet.split_off(12));
        match slice_tcp(&tagged, 0) {
            SlicedFrame::Tcp(frame) => assert_eq!(frame.payload.as_ref(), b"x"),
            _ => panic!("expected a TCP frame behind the VLAN tag"),
        }
    }

    #[test]
    fn truncated_ip_header_is_malformed() {
        let packet = build_packet([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001, 1, b"x");
        assert!(matches!(slice_tcp(&packet[..20], 0), SlicedFrame::Malformed));
    }

    #[test]
    fn non_ipv4_is_other_protocol() {
        let mut packet = build_packet([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001, 1, b"x");
        packet[12..14].copy_from_slice(&0x86DDu16.to_be_bytes()); // IPv6
        assert!(matches!(slice_tcp(&packet, 0), SlicedFrame::OtherProtocol));
    }

    #[test]
    fn filter_requires_host_and_port() {
        let db: Ipv4Addr = [10, 0, 0, 5].into();
        let mut read = CaptureRead::default();

        let matching = build_packet([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001, 1, b"x");
        dissect_frame(&matching, 0, &[db], 1521, &mut read);
        assert_eq!(read.frames.len(), 1);

        let wrong_host = build_packet([10, 9, 9, 9], 1521, [192, 168, 1, 7], 40001, 1, b"x");
        dissect_frame(&wrong_host, 0, &[db], 1521, &mut read);
        let wrong_port = build_packet([10, 0, 0, 5], 1522, [192, 168, 1, 7], 40001, 1, b"x");
        dissect_frame(&wrong_port, 0, &[db], 1521, &mut read);
        let empty_payload = build_packet([10, 0, 0, 5], 1521, [192, 168, 1, 7], 40001, 1, b"");
        dissect_frame(&empty_payload, 0, &[db], 1521, &mut read);
        assert_eq!(read.frames.len(), 1);
        assert_eq!(read.malformed_frames, 0);
    }
}
