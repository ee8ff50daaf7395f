//! Bounded frame building and reading
//!
//! Every byte written or read goes through `FrameWriter` / `FrameReader`, which
//! check lengths up front and fail with a `FrameError` instead of indexing out
//! of bounds.
//!
//! Vendor datapoint record layout (all multi-byte fields big-endian):
//!
//! ```text
//! +-------+------+--------+------------+
//! | dp_id | type | length |   data     |
//! |  u8   |  u8  |  u16   | length B   |
//! +-------+------+--------+------------+
//! ```
//!
//! A vendor payload is a 16-bit sequence number followed by one or more
//! records. Both dialects wrap their payload in a ZCL header (frame control,
//! transaction sequence, command id).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest frame either dialect will build
pub const MAX_FRAME_LEN: usize = 255;

/// Manufacturer-specific cluster carrying datapoints
pub const VENDOR_CLUSTER: u16 = 0xEF00;

/// Vendor cluster command ids
pub mod vendor_cmd {
    pub const DATA_REQUEST: u8 = 0x00;
    pub const DATA_RESPONSE: u8 = 0x01;
    pub const DATA_REPORT: u8 = 0x02;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Frame would exceed {limit} bytes")]
    Overflow { limit: usize },
    #[error("Unknown datapoint type tag {0}")]
    UnknownType(u8),
}

/// Append-only frame builder with a hard size limit
#[derive(Debug, Clone)]
pub struct FrameWriter {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::with_limit(MAX_FRAME_LEN)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit.min(64)),
            limit,
        }
    }

    fn reserve(&self, n: usize) -> Result<(), FrameError> {
        if self.buf.len() + n > self.limit {
            return Err(FrameError::Overflow { limit: self.limit });
        }
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<&mut Self, FrameError> {
        self.reserve(1)?;
        self.buf.push(value);
        Ok(self)
    }

    pub fn put_u16_be(&mut self, value: u16) -> Result<&mut Self, FrameError> {
        self.put_bytes(&value.to_be_bytes())
    }

    pub fn put_u16_le(&mut self, value: u16) -> Result<&mut Self, FrameError> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_i16_le(&mut self, value: i16) -> Result<&mut Self, FrameError> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_i32_be(&mut self, value: i32) -> Result<&mut Self, FrameError> {
        self.put_bytes(&value.to_be_bytes())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, FrameError> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received frame
#[derive(Debug, Clone)]
pub struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        if n > self.remaining() {
            return Err(FrameError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16_be(&mut self) -> Result<u16, FrameError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u16_le(&mut self) -> Result<u16, FrameError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Everything not read yet
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

/// Datapoint type tag as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DpType {
    Raw = 0,
    Bool = 1,
    Value = 2,
    String = 3,
    Enum = 4,
    Bitmap = 5,
}

impl DpType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Raw),
            1 => Some(Self::Bool),
            2 => Some(Self::Value),
            3 => Some(Self::String),
            4 => Some(Self::Enum),
            5 => Some(Self::Bitmap),
            _ => None,
        }
    }
}

/// One datapoint record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpRecord {
    pub dp_id: u8,
    pub dp_type: DpType,
    pub data: Vec<u8>,
}

impl DpRecord {
    pub fn new(dp_id: u8, dp_type: DpType, data: Vec<u8>) -> Self {
        Self { dp_id, dp_type, data }
    }

    pub fn write_to(&self, w: &mut FrameWriter) -> Result<(), FrameError> {
        let len = u16::try_from(self.data.len()).map_err(|_| FrameError::Overflow {
            limit: u16::MAX as usize,
        })?;
        w.put_u8(self.dp_id)?
            .put_u8(self.dp_type as u8)?
            .put_u16_be(len)?
            .put_bytes(&self.data)?;
        Ok(())
    }

    pub fn read_from(r: &mut FrameReader<'_>) -> Result<Self, FrameError> {
        let dp_id = r.u8()?;
        let tag = r.u8()?;
        let dp_type = DpType::from_u8(tag).ok_or(FrameError::UnknownType(tag))?;
        let len = r.u16_be()? as usize;
        let data = r.take(len)?.to_vec();
        Ok(Self { dp_id, dp_type, data })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let mut w = FrameWriter::new();
        self.write_to(&mut w)?;
        Ok(w.finish())
    }
}

/// Payload of the manufacturer-specific cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorFrame {
    pub seq: u16,
    pub records: Vec<DpRecord>,
}

impl VendorFrame {
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        let mut r = FrameReader::new(payload);
        let seq = r.u16_be()?;
        let mut records = Vec::new();
        while !r.is_empty() {
            records.push(DpRecord::read_from(&mut r)?);
        }
        Ok(Self { seq, records })
    }

    pub fn write_to(&self, w: &mut FrameWriter) -> Result<(), FrameError> {
        w.put_u16_be(self.seq)?;
        for record in &self.records {
            record.write_to(w)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let mut w = FrameWriter::new();
        self.write_to(&mut w)?;
        Ok(w.finish())
    }
}

/// ZCL frame control: command is specific to the addressed cluster
pub const FC_CLUSTER_SPECIFIC: u8 = 0x01;
/// ZCL frame control: profile-wide command (read/write attributes)
pub const FC_GLOBAL: u8 = 0x00;

/// Header shared by both dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZclHeader {
    pub frame_control: u8,
    pub seq: u8,
    pub command_id: u8,
}

impl ZclHeader {
    pub fn write_to(&self, w: &mut FrameWriter) -> Result<(), FrameError> {
        w.put_u8(self.frame_control)?
            .put_u8(self.seq)?
            .put_u8(self.command_id)?;
        Ok(())
    }

    pub fn read_from(r: &mut FrameReader<'_>) -> Result<Self, FrameError> {
        Ok(Self {
            frame_control: r.u8()?,
            seq: r.u8()?,
            command_id: r.u8()?,
        })
    }
}

/// Wire bytes ready for the transport, addressed to one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub cluster: u16,
    pub bytes: Vec<u8>,
}

impl OutboundFrame {
    /// Wrap a single datapoint record into a vendor data request
    pub fn vendor(zcl_seq: u8, dp_seq: u16, record: DpRecord) -> Result<Self, FrameError> {
        let mut w = FrameWriter::new();
        ZclHeader {
            frame_control: FC_CLUSTER_SPECIFIC,
            seq: zcl_seq,
            command_id: vendor_cmd::DATA_REQUEST,
        }
        .write_to(&mut w)?;
        VendorFrame {
            seq: dp_seq,
            records: vec![record],
        }
        .write_to(&mut w)?;
        Ok(Self {
            cluster: VENDOR_CLUSTER,
            bytes: w.finish(),
        })
    }
}
