//! Hash algorithms for string sharding keys
//!
//! Numeric sharding keys are used as positions directly. String keys go
//! through one of the algorithms below; the absolute value of the signed
//! 32-bit result (64-bit for `mix`) becomes the position. Characters are
//! fed as UTF-16 code units so positions stay stable for data already
//! placed by other clients of the same cluster.

use crc::{Crc, CRC_16_XMODEM};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TopologyError;

/// CRC16 calculator (XMODEM variant)
static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const ONE_BY_ONE_MASK: i32 = 0x8765_fed1_u32 as i32;
const FNV_OFFSET: i32 = 2_166_136_261_u32 as i32;
const FNV_PRIME: i32 = 16_777_619;

/// Named hash algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashAlgorithm {
    Additive,
    Rotating,
    OneByOne,
    #[default]
    Bernstein,
    Fnv,
    Rs,
    Js,
    Pjw,
    Elf,
    Bkdr,
    Sdbm,
    Djb,
    Dek,
    Ap,
    Java,
    Mix,
    Crc16,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 17] = [
        HashAlgorithm::Additive,
        HashAlgorithm::Rotating,
        HashAlgorithm::OneByOne,
        HashAlgorithm::Bernstein,
        HashAlgorithm::Fnv,
        HashAlgorithm::Rs,
        HashAlgorithm::Js,
        HashAlgorithm::Pjw,
        HashAlgorithm::Elf,
        HashAlgorithm::Bkdr,
        HashAlgorithm::Sdbm,
        HashAlgorithm::Djb,
        HashAlgorithm::Dek,
        HashAlgorithm::Ap,
        HashAlgorithm::Java,
        HashAlgorithm::Mix,
        HashAlgorithm::Crc16,
    ];

    /// Configuration name
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Additive => "additive",
            HashAlgorithm::Rotating => "rotating",
            HashAlgorithm::OneByOne => "oneByOne",
            HashAlgorithm::Bernstein => "bernstein",
            HashAlgorithm::Fnv => "fnv",
            HashAlgorithm::Rs => "rs",
            HashAlgorithm::Js => "js",
            HashAlgorithm::Pjw => "pjw",
            HashAlgorithm::Elf => "elf",
            HashAlgorithm::Bkdr => "bkdr",
            HashAlgorithm::Sdbm => "sdbm",
            HashAlgorithm::Djb => "djb",
            HashAlgorithm::Dek => "dek",
            HashAlgorithm::Ap => "ap",
            HashAlgorithm::Java => "java",
            HashAlgorithm::Mix => "mix",
            HashAlgorithm::Crc16 => "crc16",
        }
    }

    /// Map a string key to a non-negative position
    pub fn position(&self, key: &str) -> u64 {
        let units: Vec<i32> = key.encode_utf16().map(i32::from).collect();
        match self {
            HashAlgorithm::Mix => {
                let high = (java(&units) as i64) << 32;
                // Low word is sign-extended before the OR
                (high | fnv(&units) as i64).unsigned_abs()
            }
            HashAlgorithm::Crc16 => CRC16.checksum(key.as_bytes()) as u64,
            _ => (self.hash32(&units) as i64).unsigned_abs(),
        }
    }

    fn hash32(&self, units: &[i32]) -> i32 {
        match self {
            HashAlgorithm::Additive => additive(units),
            HashAlgorithm::Rotating => rotating(units),
            HashAlgorithm::OneByOne => one_by_one(units),
            HashAlgorithm::Bernstein => bernstein(units),
            HashAlgorithm::Fnv => fnv(units),
            HashAlgorithm::Rs => rs(units),
            HashAlgorithm::Js => js(units),
            HashAlgorithm::Pjw => pjw(units),
            HashAlgorithm::Elf => elf(units),
            HashAlgorithm::Bkdr => bkdr(units),
            HashAlgorithm::Sdbm => sdbm(units),
            HashAlgorithm::Djb => djb(units),
            HashAlgorithm::Dek => dek(units),
            HashAlgorithm::Ap => ap(units),
            HashAlgorithm::Java => java(units),
            HashAlgorithm::Mix | HashAlgorithm::Crc16 => 0,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "");
        Self::ALL
            .iter()
            .copied()
            .find(|algo| algo.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| TopologyError::UnknownHashAlgorithm(s.to_string()))
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashAlgorithm> for String {
    fn from(algo: HashAlgorithm) -> Self {
        algo.name().to_string()
    }
}

fn len_i32(units: &[i32]) -> i32 {
    units.len() as i32
}

fn additive(units: &[i32]) -> i32 {
    let hash = units
        .iter()
        .fold(len_i32(units), |hash, &c| hash.wrapping_add(c));
    hash % 983
}

fn rotating(units: &[i32]) -> i32 {
    let hash = units
        .iter()
        .fold(len_i32(units), |hash, &c| (hash << 4) ^ (hash >> 28) ^ c);
    hash ^ (hash >> 10) ^ (hash >> 20)
}

fn one_by_one(units: &[i32]) -> i32 {
    let mut hash: i32 = 0;
    for &c in units {
        hash = hash.wrapping_add(c);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash & ONE_BY_ONE_MASK
}

fn bernstein(units: &[i32]) -> i32 {
    units
        .iter()
        .fold(0i32, |hash, &c| hash.wrapping_mul(33).wrapping_add(c))
}

fn fnv(units: &[i32]) -> i32 {
    let mut hash = units
        .iter()
        .fold(FNV_OFFSET, |hash, &c| (hash ^ c).wrapping_mul(FNV_PRIME));
    hash = hash.wrapping_add(hash << 13);
    hash ^= hash >> 7;
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 17;
    hash = hash.wrapping_add(hash << 5);
    hash
}

fn rs(units: &[i32]) -> i32 {
    let b: i32 = 378_551;
    let mut a: i32 = 63_689;
    let mut hash: i32 = 0;
    for &c in units {
        hash = hash.wrapping_mul(a).wrapping_add(c);
        a = a.wrapping_mul(b);
    }
    hash & 0x7FFF_FFFF
}

fn js(units: &[i32]) -> i32 {
    let hash = units.iter().fold(1_315_423_911i32, |hash, &c| {
        hash ^ (hash << 5).wrapping_add(c).wrapping_add(hash >> 2)
    });
    hash & 0x7FFF_FFFF
}

fn pjw(units: &[i32]) -> i32 {
    const BITS: i32 = 32;
    const THREE_QUARTERS: i32 = BITS * 3 / 4;
    const ONE_EIGHTH: i32 = BITS / 8;
    const HIGH_BITS: i32 = -1i32 << (BITS - ONE_EIGHTH);
    let mut hash: i32 = 0;
    for &c in units {
        hash = (hash << ONE_EIGHTH).wrapping_add(c);
        let test = hash & HIGH_BITS;
        if test != 0 {
            hash = (hash ^ (test >> THREE_QUARTERS)) & !HIGH_BITS;
        }
    }
    hash & 0x7FFF_FFFF
}

fn elf(units: &[i32]) -> i32 {
    let mut hash: i32 = 0;
    for &c in units {
        hash = (hash << 4).wrapping_add(c);
        let x = hash & (0xF000_0000_u32 as i32);
        if x != 0 {
            hash ^= x >> 24;
            hash &= !x;
        }
    }
    hash & 0x7FFF_FFFF
}

fn bkdr(units: &[i32]) -> i32 {
    let hash = units
        .iter()
        .fold(0i32, |hash, &c| hash.wrapping_mul(131).wrapping_add(c));
    hash & 0x7FFF_FFFF
}

fn sdbm(units: &[i32]) -> i32 {
    let hash = units.iter().fold(0i32, |hash, &c| {
        c.wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash)
    });
    hash & 0x7FFF_FFFF
}

fn djb(units: &[i32]) -> i32 {
    let hash = units
        .iter()
        .fold(5381i32, |hash, &c| (hash << 5).wrapping_add(hash).wrapping_add(c));
    hash & 0x7FFF_FFFF
}

fn dek(units: &[i32]) -> i32 {
    let hash = units
        .iter()
        .fold(len_i32(units), |hash, &c| ((hash << 5) ^ (hash >> 27)) ^ c);
    hash & 0x7FFF_FFFF
}

fn ap(units: &[i32]) -> i32 {
    let mut hash: i32 = 0;
    for (i, &c) in units.iter().enumerate() {
        hash ^= if i & 1 == 0 {
            (hash << 7) ^ c ^ (hash >> 3)
        } else {
            !((hash << 11) ^ c ^ (hash >> 5))
        };
    }
    hash
}

fn java(units: &[i32]) -> i32 {
    units
        .iter()
        .fold(0i32, |hash, &c| hash.wrapping_mul(31).wrapping_add(c))
}
