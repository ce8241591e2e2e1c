//! Numeric host normalization
//!
//! Resolvers accept IPv4 addresses spelled in many ways: `2130706433`,
//! `0x7f000001`, `0177.0.0.1`, `127.1`. Each of them must be recognised as
//! an IP before the hostname checks run.

use std::net::Ipv4Addr;

/// Parse a host written in any inet_aton form into an IPv4 address.
///
/// Returns `None` when the host is not purely numeric, so ordinary hostnames
/// fall through to the hostname checks.
pub fn parse_numeric_ipv4(host: &str) -> Option<Ipv4Addr> {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return None;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() > 4 {
        return None;
    }

    let mut values = Vec::with_capacity(parts.len());
    for part in &parts {
        values.push(parse_part(part)?);
    }

    let (last, leading) = values.split_last()?;
    if leading.iter().any(|v| *v > 0xff) {
        return None;
    }

    // The final part fills all remaining bytes
    let remaining_bits = 8 * (4 - leading.len() as u32);
    if remaining_bits < 32 && *last >= (1u64 << remaining_bits) {
        return None;
    }
    if *last > u64::from(u32::MAX) {
        return None;
    }

    let mut addr: u64 = 0;
    for (i, v) in leading.iter().enumerate() {
        addr |= v << (24 - 8 * i as u32);
    }
    addr |= last;

    u32::try_from(addr).ok().map(Ipv4Addr::from)
}

fn parse_part(part: &str) -> Option<u64> {
    if part.is_empty() {
        return None;
    }

    let hex = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X"));
    let (digits, radix) = if let Some(hex) = hex {
        (hex, 16)
    } else if part.len() > 1 && part.starts_with('0') {
        (&part[1..], 8)
    } else {
        (part, 10)
    };

    if digits.is_empty() {
        // bare "0x" is zero for inet_aton
        return if radix == 16 { Some(0) } else { None };
    }

    if digits.len() > 32 {
        return None;
    }

    u64::from_str_radix(digits, radix).ok()
}
