//! Per-interface network counters from /proc/net/dev.

use serde::Serialize;

use super::{parse_u64, ParseError};

/// Receive and transmit columns per interface line.
const NET_DEV_FIELDS: usize = 16;

/// Cumulative counters of one network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    /// Interface name (e.g., "eth0", "lo")
    pub interface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkSnapshot {
    pub interfaces: Vec<InterfaceStats>,
}

/// Parses /proc/net/dev.
///
/// ```text
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///     lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
/// ```
pub fn parse_net_dev(content: &str) -> Result<NetworkSnapshot, ParseError> {
    let mut lines = content.lines();
    for _ in 0..2 {
        match lines.next() {
            Some(header) if header.contains('|') => {}
            _ => return Err(ParseError::new("missing net/dev header")),
        }
    }

    let mut interfaces = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        let (name, counters) = line
            .split_once(':')
            .ok_or_else(|| ParseError::new(format!("malformed net/dev line {:?}", line)))?;

        let values = counters
            .split_whitespace()
            .map(|s| parse_u64(s, "net/dev"))
            .collect::<Result<Vec<u64>, _>>()?;
        if values.len() < NET_DEV_FIELDS {
            return Err(ParseError::new(format!(
                "interface {} has {} columns, expected {}",
                name.trim(),
                values.len(),
                NET_DEV_FIELDS
            )));
        }

        interfaces.push(InterfaceStats {
            interface: name.trim().to_string(),
            rx_bytes: values[0],
            rx_packets: values[1],
            rx_errors: values[2],
            tx_bytes: values[8],
            tx_packets: values[9],
            tx_errors: values[10],
        });
    }

    Ok(NetworkSnapshot { interfaces })
}
