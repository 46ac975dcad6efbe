//! Recipient address decoding.
//!
//! Addresses use Bech32m encoding ([BIP-350]) with one human-readable prefix
//! per network:
//! - Mainnet: `spg1...`
//! - Testnet: `tspg1...`
//! - Regtest: `rspg1...`
//!
//! The data part is a version byte (currently 0) followed by a 32-byte
//! payload. The faucet never inspects the payload; it only needs to know the
//! address is well formed and which network it belongs to.
//!
//! [BIP-350]: https://github.com/bitcoin/bips/blob/master/bip-0350.mediawiki

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;
use crate::traits::AddressValidator;

/// Bech32m checksum constant (BIP-350).
const BECH32M_CONST: u32 = 0x2bc830a3;

/// Bech32 character set for encoding 5-bit values.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Current address version.
pub const ADDRESS_VERSION: u8 = 0;

/// Length of the address payload in bytes.
pub const PAYLOAD_LEN: usize = 32;

/// Network an address (and the faucet) belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
    Regtest,
}

impl Network {
    /// Human-readable prefix for this network.
    pub fn hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "spg",
            Network::Testnet => "tspg",
            Network::Regtest => "rspg",
        }
    }

    /// Look up a network from a human-readable prefix.
    pub fn from_hrp(hrp: &str) -> Result<Self, AddressError> {
        match hrp {
            "spg" => Ok(Network::Mainnet),
            "tspg" => Ok(Network::Testnet),
            "rspg" => Ok(Network::Regtest),
            _ => Err(AddressError::UnknownNetwork(hrp.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(AddressError::UnknownNetwork(other.to_string())),
        }
    }
}

/// A decoded recipient address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    network: Network,
    version: u8,
    payload: [u8; PAYLOAD_LEN],
}

impl Address {
    pub fn new(payload: [u8; PAYLOAD_LEN], network: Network) -> Self {
        Self {
            network,
            version: ADDRESS_VERSION,
            payload,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Encode as a lowercase Bech32m string.
    pub fn encode(&self) -> String {
        let hrp = self.network.hrp();
        let mut data = Vec::with_capacity(1 + (PAYLOAD_LEN * 8).div_ceil(5));
        data.push(self.version);
        data.extend(regroup_bits(&self.payload, 8, 5, true).unwrap_or_default());

        let checksum = create_checksum(hrp, &data);

        let mut out = String::with_capacity(hrp.len() + 1 + data.len() + checksum.len());
        out.push_str(hrp);
        out.push('1');
        out.extend(data.iter().chain(&checksum).map(|&d| CHARSET[d as usize] as char));
        out
    }

    /// Decode a Bech32m address string of any known network.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.chars().any(|c| c.is_ascii_lowercase()) && s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(AddressError::MixedCase);
        }
        let s = s.to_ascii_lowercase();

        let sep = s.rfind('1').ok_or(AddressError::MissingSeparator)?;
        if sep == 0 {
            return Err(AddressError::InvalidHrp);
        }
        // Version char plus six checksum chars.
        if sep + 8 > s.len() {
            return Err(AddressError::InvalidLength);
        }

        let (hrp, data_part) = (&s[..sep], &s[sep + 1..]);
        let data = data_part
            .chars()
            .map(|c| {
                CHARSET
                    .iter()
                    .position(|&ch| ch as char == c)
                    .map(|pos| pos as u8)
                    .ok_or(AddressError::InvalidCharacter(c))
            })
            .collect::<Result<Vec<u8>, _>>()?;

        if !verify_checksum(hrp, &data) {
            return Err(AddressError::InvalidChecksum);
        }

        let body = &data[..data.len() - 6];
        let (&version, rest) = body.split_first().ok_or(AddressError::InvalidLength)?;
        if version != ADDRESS_VERSION {
            return Err(AddressError::InvalidVersion(version));
        }

        let bytes = regroup_bits(rest, 5, 8, false).ok_or(AddressError::InvalidPadding)?;
        let payload: [u8; PAYLOAD_LEN] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength)?;

        let network = Network::from_hrp(hrp)?;
        Ok(Self {
            network,
            version,
            payload,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// [`AddressValidator`] for Bech32m addresses.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bech32mValidator;

impl AddressValidator for Bech32mValidator {
    fn decode(&self, input: &str) -> Result<Address, AddressError> {
        Address::decode(input)
    }

    fn belongs_to_network(&self, address: &Address, network: Network) -> bool {
        address.network() == network
    }
}

// --- Bech32m internals ---

fn polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    values.iter().fold(1u32, |chk, &v| {
        let top = chk >> 25;
        let mut chk = ((chk & 0x1ffffff) << 5) ^ v as u32;
        for (i, g) in GEN.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
        chk
    })
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    hrp.bytes()
        .map(|c| c >> 5)
        .chain(std::iter::once(0))
        .chain(hrp.bytes().map(|c| c & 31))
        .collect()
}

fn create_checksum(hrp: &str, data: &[u8]) -> Vec<u8> {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let pm = polymod(&values) ^ BECH32M_CONST;
    (0..6).map(|i| ((pm >> (5 * (5 - i))) & 31) as u8).collect()
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    polymod(&values) == BECH32M_CONST
}

/// Regroup a bit stream from `from`-bit to `to`-bit values.
fn regroup_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv = (1u32 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        if (value as u32) >> from != 0 {
            return None;
        }
        acc = (acc << from) | value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & maxv) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & maxv) != 0 {
        return None;
    }
    Some(out)
}
