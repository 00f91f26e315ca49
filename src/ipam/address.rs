use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map_res};
use nom::sequence::tuple;
use nom::IResult;
use std::net::Ipv4Addr;

use crate::ipam::error::IpamError;

fn octet(input: &str) -> IResult<&str, u8> {
    map_res(digit1, |digits: &str| digits.parse::<u8>())(input)
}

fn dotted_quad(input: &str) -> IResult<&str, [u8; 4]> {
    let (rest, (a, _, b, _, c, _, d)) = tuple((
        octet,
        char('.'),
        octet,
        char('.'),
        octet,
        char('.'),
        octet,
    ))(input)?;
    return Ok((rest, [a, b, c, d]));
}

/// Parse four dot separated decimal octets. Leading zeros are accepted.
pub fn parse_address(input: &str) -> Result<Ipv4Addr, IpamError> {
    match all_consuming(dotted_quad)(input) {
        Ok((_, octets)) => return Ok(Ipv4Addr::from(octets)),
        Err(_) => return Err(IpamError::InvalidAddress(input.to_string())),
    }
}

pub fn to_int(addr: Ipv4Addr) -> u32 {
    return u32::from(addr);
}

pub fn from_int(value: u32) -> Ipv4Addr {
    return Ipv4Addr::from(value);
}

/// Closed interval overlap test.
pub fn ranges_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    return a.0.max(b.0) <= a.1.min(b.1);
}

fn netmask(prefix: u8) -> u32 {
    if prefix == 0 {
        return 0;
    }
    return u32::MAX << (32 - prefix as u32);
}

/// An aligned IPv4 CIDR block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    network: u32,
    prefix: u8,
}

impl Block {
    pub fn new(network: Ipv4Addr, prefix: u32) -> Result<Block, IpamError> {
        if prefix > 32 {
            return Err(IpamError::InvalidPrefix(prefix));
        }
        let prefix = prefix as u8;
        let network_int = to_int(network);
        if network_int & !netmask(prefix) != 0 {
            return Err(IpamError::NetworkNotAligned {
                network: network,
                prefix: prefix,
            });
        }
        return Ok(Block {
            network: network_int,
            prefix: prefix,
        });
    }

    pub fn network(&self) -> Ipv4Addr {
        return from_int(self.network);
    }

    pub fn prefix(&self) -> u8 {
        return self.prefix;
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        return from_int(self.network | !netmask(self.prefix));
    }

    pub fn bounds(&self) -> (u32, u32) {
        return (self.network, to_int(self.broadcast()));
    }

    /// Number of addresses in the block, network and broadcast included.
    pub fn size(&self) -> u64 {
        return 1u64 << (32 - self.prefix as u32);
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let (network, broadcast) = self.bounds();
        let addr = to_int(addr);
        return network <= addr && addr <= broadcast;
    }

    /// First and last host address. /31 and /32 have no network or broadcast
    /// address to exclude.
    pub fn usable_range(&self) -> (u32, u32) {
        let (network, broadcast) = self.bounds();
        if self.prefix >= 31 {
            return (network, broadcast);
        }
        return (network + 1, broadcast - 1);
    }

    pub fn usable_count(&self) -> u64 {
        let (first, last) = self.usable_range();
        return (last - first) as u64 + 1;
    }

    pub fn is_usable(&self, addr: Ipv4Addr) -> bool {
        let (first, last) = self.usable_range();
        let addr = to_int(addr);
        return first <= addr && addr <= last;
    }

    pub fn overlaps(&self, other: &Block) -> bool {
        return ranges_overlap(self.bounds(), other.bounds());
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(network: &str, prefix: u32) -> Block {
        return Block::new(parse_address(network).unwrap(), prefix).unwrap();
    }

    #[test]
    fn parse_canonicalizes() {
        let cases = [
            ("10.0.0.1", "10.0.0.1"),
            ("010.000.000.001", "10.0.0.1"),
            ("0.0.0.0", "0.0.0.0"),
            ("255.255.255.255", "255.255.255.255"),
            ("192.168.007.42", "192.168.7.42"),
        ];
        for (input, canonical) in cases.iter() {
            let addr = parse_address(input).unwrap();
            assert_eq!(from_int(to_int(addr)).to_string(), *canonical);
        }
    }

    #[test]
    fn int_round_trip_at_edges() {
        for value in [0u32, 1, 0x0a00_0001, 0xc0a8_01ff, u32::MAX].iter() {
            assert_eq!(to_int(from_int(*value)), *value);
        }
        assert_eq!(to_int(parse_address("1.2.3.4").unwrap()), 0x0102_0304);
    }

    #[test]
    fn parse_rejects_malformed() {
        for input in [
            "",
            "10.0.0",
            "10.0.0.0.1",
            "10.0.0.256",
            "10.0.0.-1",
            "10..0.1",
            " 10.0.0.1",
            "10.0.0.1 ",
            "a.b.c.d",
            "10.0.0.1/24",
        ]
        .iter()
        {
            match parse_address(input) {
                Err(IpamError::InvalidAddress(raw)) => assert_eq!(raw, *input),
                other => assert!(false, "Expected InvalidAddress for {:?}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn prefix_bounds() {
        assert_eq!(
            Block::new(Ipv4Addr::new(0, 0, 0, 0), 33),
            Err(IpamError::InvalidPrefix(33))
        );
        let all = block("0.0.0.0", 0);
        assert_eq!(all.size(), 1u64 << 32);
        assert_eq!(all.usable_count(), (1u64 << 32) - 2);
        assert!(all.contains(Ipv4Addr::new(255, 255, 255, 255)));
    }

    #[test]
    fn network_must_be_aligned() {
        match Block::new(Ipv4Addr::new(10, 0, 0, 1), 24) {
            Err(IpamError::NetworkNotAligned { prefix, .. }) => assert_eq!(prefix, 24),
            other => assert!(false, "Expected NetworkNotAligned, got {:?}", other),
        }
    }

    #[test]
    fn usable_range_excludes_network_and_broadcast() {
        let b = block("192.168.1.0", 24);
        let (first, last) = b.usable_range();
        assert_eq!(from_int(first), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(from_int(last), Ipv4Addr::new(192, 168, 1, 254));
        assert_eq!(b.usable_count(), 254);
        assert!(!b.is_usable(Ipv4Addr::new(192, 168, 1, 0)));
        assert!(!b.is_usable(Ipv4Addr::new(192, 168, 1, 255)));
        assert!(b.contains(Ipv4Addr::new(192, 168, 1, 255)));
        assert!(!b.contains(Ipv4Addr::new(192, 168, 2, 0)));
    }

    #[test]
    fn point_to_point_and_host_routes() {
        let p2p = block("10.0.0.0", 31);
        assert_eq!(p2p.usable_range(), (0x0a00_0000, 0x0a00_0001));
        assert_eq!(p2p.usable_count(), 2);

        let host = block("10.0.0.7", 32);
        assert_eq!(host.usable_range(), (0x0a00_0007, 0x0a00_0007));
        assert_eq!(host.usable_count(), 1);
        assert!(host.is_usable(Ipv4Addr::new(10, 0, 0, 7)));

        let top = block("255.255.255.255", 32);
        assert_eq!(top.usable_count(), 1);
    }

    #[test]
    fn interval_overlap() {
        assert!(!ranges_overlap((10, 20), (21, 30)));
        assert!(ranges_overlap((10, 20), (20, 25)));
        assert!(ranges_overlap((10, 30), (15, 16)));
        assert!(!ranges_overlap((21, 30), (10, 20)));

        assert!(block("10.0.0.0", 16).overlaps(&block("10.0.5.0", 24)));
        assert!(!block("10.0.0.0", 24).overlaps(&block("10.0.1.0", 24)));
    }
}
