use crate::core::error::{Error, Result};
use crate::core::ratio::Info;

/// Amounts and capacities: non-negative 128-bit-wide fixed-point.
pub type FixedPoint = u128;

/// Scaling factors: 64-bit-wide.
pub type Num = u64;

/// An opaque 32-byte hash (transaction hash or script code hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Byte32(pub [u8; 32]);

impl Byte32 {
    pub const ZERO: Byte32 = Byte32([0u8; 32]);
}

/// How a script's `code_hash` should be interpreted. Opaque to the core beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptHashType {
    Data,
    Type,
    Data1,
    Data2,
}

/// A script handle. The core never interprets a script's contents, only compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script {
    pub code_hash: Byte32,
    pub hash_type: ScriptHashType,
    pub args: Vec<u8>,
}

/// `(txHash, index)` identifying a cell as an output of a past transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub tx_hash: Byte32,
    pub index: u32,
}

/// The non-data part of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellOutput {
    pub capacity: FixedPoint,
    pub lock: Script,
    pub type_: Option<Script>,
}

/// A live, on-chain cell as handed back by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub out_point: OutPoint,
    pub output: CellOutput,
    pub data: Vec<u8>,
}

/// Tagged reference to an order's master witness cell.
///
/// A freshly minted order always carries a `Relative` reference; `AddMatch` rewrites it to
/// `Absolute` so every later descendant keeps pointing at the same witness cell regardless of
/// where in its own transaction it happens to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterRef {
    /// `distance` is added to the order cell's own output index to find the master, within the
    /// same transaction. The canonical mint uses `distance = +1`.
    Relative { distance: i32 },
    /// Points directly at the master cell's outpoint.
    Absolute { out_point: OutPoint },
}

impl MasterRef {
    pub fn is_mint(&self) -> bool {
        matches!(self, MasterRef::Relative { .. })
    }

    /// Resolves this reference to the master cell's outpoint, given the order cell's own
    /// outpoint.
    pub fn resolve(&self, order_out_point: &OutPoint) -> Result<OutPoint> {
        match self {
            MasterRef::Relative { distance } => {
                let index = order_out_point.index as i64 + *distance as i64;
                if index < 0 || index > u32::MAX as i64 {
                    return Err(Error::invalid_entity(
                        "MasterRef",
                        format!("relative distance {distance} resolves out of range"),
                    ));
                }
                Ok(OutPoint {
                    tx_hash: order_out_point.tx_hash,
                    index: index as u32,
                })
            }
            MasterRef::Absolute { out_point } => Ok(*out_point),
        }
    }
}

/// The decoded payload of an order cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderData {
    pub udt_amount: FixedPoint,
    pub master: MasterRef,
    pub info: Info,
}

impl OrderData {
    pub fn is_mint(&self) -> bool {
        self.master.is_mint()
    }

    pub fn validate(&self) -> Result<()> {
        self.info.validate()
    }

    /// Encodes to the on-chain little-endian packed layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&self.udt_amount.to_le_bytes());

        match self.master {
            MasterRef::Relative { distance } => {
                buf.push(0u8);
                buf.extend_from_slice(&[0u8; 32]);
                buf.extend_from_slice(&distance.to_le_bytes());
            }
            MasterRef::Absolute { out_point } => {
                buf.push(1u8);
                buf.extend_from_slice(&out_point.tx_hash.0);
                buf.extend_from_slice(&(out_point.index as u64).to_le_bytes());
            }
        }

        let info = &self.info;
        buf.extend_from_slice(&info.ckb_to_udt.ckb_scale.to_le_bytes());
        buf.extend_from_slice(&info.ckb_to_udt.udt_scale.to_le_bytes());
        buf.extend_from_slice(&info.udt_to_ckb.ckb_scale.to_le_bytes());
        buf.extend_from_slice(&info.udt_to_ckb.udt_scale.to_le_bytes());
        buf.push(info.ckb_min_match_log);

        buf
    }

    /// Decodes the on-chain little-endian packed layout, rejecting truncated or
    /// semantically-invalid payloads.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let udt_amount = cur.take_u128()?;

        let tag = cur.take_u8()?;
        let master = match tag {
            0 => {
                let padding = cur.take_array::<32>()?;
                if padding != [0u8; 32] {
                    return Err(Error::Decode(
                        "relative master padding must be 32 zero bytes".into(),
                    ));
                }
                let distance = i32::from_le_bytes(cur.take_array::<4>()?);
                MasterRef::Relative { distance }
            }
            1 => {
                let tx_hash = Byte32(cur.take_array::<32>()?);
                let index = cur.take_u64()?;
                if index > u32::MAX as u64 {
                    return Err(Error::Decode("absolute master index out of range".into()));
                }
                MasterRef::Absolute {
                    out_point: OutPoint {
                        tx_hash,
                        index: index as u32,
                    },
                }
            }
            other => return Err(Error::Decode(format!("unknown master tag {other}"))),
        };

        let ckb_to_udt = super::ratio::Ratio {
            ckb_scale: cur.take_u64()?,
            udt_scale: cur.take_u64()?,
        };
        let udt_to_ckb = super::ratio::Ratio {
            ckb_scale: cur.take_u64()?,
            udt_scale: cur.take_u64()?,
        };
        let ckb_min_match_log = cur.take_u8()?;
        cur.finish()?;

        let data = OrderData {
            udt_amount,
            master,
            info: Info {
                ckb_to_udt,
                udt_to_ckb,
                ckb_min_match_log,
            },
        };
        data.validate()?;
        Ok(data)
    }
}

impl TryFrom<&[u8]> for OrderData {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        OrderData::decode(bytes)
    }
}

/// A tiny fixed-layout reader; not a general parser, just sequential consumption with bounds
/// checks so `decode` never panics on truncated input.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::Decode("unexpected end of order cell data".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array::<8>()?))
    }

    fn take_u128(&mut self) -> Result<u128> {
        Ok(u128::from_le_bytes(self.take_array::<16>()?))
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(Error::Decode("trailing bytes after order cell data".into()));
        }
        Ok(())
    }
}
