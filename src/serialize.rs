//! Versioned map codec: bit-packed, run-length-encoded, checksummed
//!
//! Layout (little-endian):
//! ```text
//! magic "WMG1" | version u16 | seed u64 | width u16 | height u16
//! | catalog checksum u32 | tile bit width u8 | run count u32
//! | runs, bit-packed: tile id (bit width) + run length (16 bits)
//! | zone count u16 | zone records | payload CRC32 u32
//! ```
//! The catalog checksum makes decoding against a mismatched catalog fail
//! loudly instead of silently misreading tile ids; the trailing CRC covers
//! everything after the magic. `decode(encode(m)) == m` for every valid map.

use thiserror::Error;

use crate::catalog::{TileCatalog, TileId};
use crate::generator::MapModel;
use crate::grid::Grid;
use crate::zones::PlacedZone;

pub const MAGIC: &[u8; 4] = b"WMG1";
pub const FORMAT_VERSION: u16 = 1;

/// Longest run one record can carry (16-bit length field).
const MAX_RUN: usize = u16::MAX as usize;

/// Decode-side failures.
#[derive(Debug, Error)]
pub enum CorruptDataError {
    #[error("not a serialized map (bad magic)")]
    BadMagic,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("map was encoded with a different tile catalog")]
    CatalogMismatch,
    #[error("map has degenerate dimensions")]
    BadDimensions,
    #[error("buffer truncated")]
    Truncated,
    #[error("payload checksum mismatch")]
    PayloadChecksumMismatch,
    #[error("tile id {0} is outside the catalog")]
    InvalidTileId(u8),
    #[error("runs cover {found} cells, grid has {expected}")]
    CellCountMismatch { found: usize, expected: usize },
    #[error("malformed zone record")]
    MalformedZoneRecord,
}

/// The encoded map would not fit the caller's byte budget.
#[derive(Debug, Error)]
#[error("encoded map is {len} bytes, budget is {budget}")]
pub struct SizeExceededError {
    pub len: usize,
    pub budget: usize,
}

/// Bits needed to store ids `0..count`, at least one.
fn tile_bit_width(count: usize) -> u32 {
    debug_assert!(count >= 1);
    (usize::BITS - (count - 1).leading_zeros()).max(1)
}

/// Encode a resolved map. Fails rather than exceed `byte_budget`.
pub fn encode(
    model: &MapModel,
    catalog: &TileCatalog,
    byte_budget: usize,
) -> Result<Vec<u8>, SizeExceededError> {
    let grid = model.grid();
    let (width, height) = model.dimensions();
    let bit_width = tile_bit_width(catalog.len());

    // Run-length encode the row-major tile stream.
    let mut runs: Vec<(TileId, usize)> = Vec::new();
    for (_, _, cell) in grid.iter() {
        let id = cell.resolved.expect("MapModel grids are fully resolved");
        match runs.last_mut() {
            Some((last, len)) if *last == id && *len < MAX_RUN => *len += 1,
            _ => runs.push((id, 1)),
        }
    }

    let mut packer = BitWriter::new();
    for &(id, len) in &runs {
        packer.write(id.0 as u64, bit_width);
        packer.write(len as u64, 16);
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&model.seed().to_le_bytes());
    buf.extend_from_slice(&(width as u16).to_le_bytes());
    buf.extend_from_slice(&(height as u16).to_le_bytes());
    buf.extend_from_slice(&catalog.checksum().to_le_bytes());
    buf.push(bit_width as u8);
    buf.extend_from_slice(&(runs.len() as u32).to_le_bytes());
    buf.extend_from_slice(&packer.finish());

    buf.extend_from_slice(&(model.zones().len() as u16).to_le_bytes());
    for zone in model.zones() {
        write_zone(&mut buf, zone);
    }

    let crc = crc32fast::hash(&buf[MAGIC.len()..]);
    buf.extend_from_slice(&crc.to_le_bytes());

    if buf.len() > byte_budget {
        return Err(SizeExceededError {
            len: buf.len(),
            budget: byte_budget,
        });
    }
    Ok(buf)
}

/// Decode a map produced by [`encode`], validating version, catalog
/// checksum and payload integrity.
pub fn decode(
    bytes: &[u8],
    catalog: &TileCatalog,
    expected_checksum: u32,
) -> Result<MapModel, CorruptDataError> {
    let mut reader = ByteReader::new(bytes);
    if reader.take(MAGIC.len())? != &MAGIC[..] {
        return Err(CorruptDataError::BadMagic);
    }
    let version = reader.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(CorruptDataError::UnsupportedVersion(version));
    }

    // Integrity first, then fields: everything after the magic up to the
    // trailing CRC must hash to the CRC.
    if bytes.len() < MAGIC.len() + 4 {
        return Err(CorruptDataError::Truncated);
    }
    let payload = &bytes[MAGIC.len()..bytes.len() - 4];
    let stored_crc = u32::from_le_bytes(
        bytes[bytes.len() - 4..]
            .try_into()
            .expect("slice is 4 bytes"),
    );
    if crc32fast::hash(payload) != stored_crc {
        return Err(CorruptDataError::PayloadChecksumMismatch);
    }

    let seed = reader.read_u64()?;
    let width = reader.read_u16()? as usize;
    let height = reader.read_u16()? as usize;
    if width == 0 || height == 0 {
        return Err(CorruptDataError::BadDimensions);
    }

    let checksum = reader.read_u32()?;
    if checksum != expected_checksum {
        return Err(CorruptDataError::CatalogMismatch);
    }

    let bit_width = reader.read_u8()? as u32;
    if bit_width != tile_bit_width(catalog.len()) {
        return Err(CorruptDataError::CatalogMismatch);
    }

    let run_count = reader.read_u32()? as usize;
    let packed_bits = run_count * (bit_width as usize + 16);
    let packed_bytes = packed_bits.div_ceil(8);
    let mut unpacker = BitReader::new(reader.take(packed_bytes)?);

    let mut grid = Grid::new(width, height, catalog.full_domain());
    let expected = width * height;
    let mut filled = 0usize;
    for _ in 0..run_count {
        let id = unpacker.read(bit_width)? as u8;
        let len = unpacker.read(16)? as usize;
        if id as usize >= catalog.len() {
            return Err(CorruptDataError::InvalidTileId(id));
        }
        if filled + len > expected {
            return Err(CorruptDataError::CellCountMismatch {
                found: filled + len,
                expected,
            });
        }
        for i in filled..filled + len {
            grid.set_resolved(i % width, i / width, TileId(id));
        }
        filled += len;
    }
    if filled != expected {
        return Err(CorruptDataError::CellCountMismatch {
            found: filled,
            expected,
        });
    }

    let zone_count = reader.read_u16()? as usize;
    let mut zones = Vec::with_capacity(zone_count);
    for _ in 0..zone_count {
        zones.push(read_zone(&mut reader, width, height)?);
    }

    Ok(MapModel::from_parts(seed, grid, zones, version))
}

fn write_zone(buf: &mut Vec<u8>, zone: &PlacedZone) {
    buf.extend_from_slice(&(zone.name.len() as u16).to_le_bytes());
    buf.extend_from_slice(zone.name.as_bytes());
    buf.extend_from_slice(&(zone.center.0 as u16).to_le_bytes());
    buf.extend_from_slice(&(zone.center.1 as u16).to_le_bytes());
    buf.extend_from_slice(&(zone.radius as u16).to_le_bytes());
    buf.extend_from_slice(&(zone.min_separation as u16).to_le_bytes());
    buf.extend_from_slice(&(zone.anchors.len() as u16).to_le_bytes());
    for &(dx, dy) in &zone.anchors {
        buf.extend_from_slice(&dx.to_le_bytes());
        buf.extend_from_slice(&dy.to_le_bytes());
    }
}

fn read_zone(
    reader: &mut ByteReader,
    width: usize,
    height: usize,
) -> Result<PlacedZone, CorruptDataError> {
    let name_len = reader.read_u16()? as usize;
    let name = String::from_utf8(reader.take(name_len)?.to_vec())
        .map_err(|_| CorruptDataError::MalformedZoneRecord)?;
    let cx = reader.read_u16()? as usize;
    let cy = reader.read_u16()? as usize;
    let radius = reader.read_u16()? as u32;
    let min_separation = reader.read_u16()? as u32;
    if cx >= width || cy >= height {
        return Err(CorruptDataError::MalformedZoneRecord);
    }
    let anchor_count = reader.read_u16()? as usize;
    let mut anchors = Vec::with_capacity(anchor_count);
    for _ in 0..anchor_count {
        let dx = reader.read_u16()? as i16;
        let dy = reader.read_u16()? as i16;
        anchors.push((dx, dy));
    }
    Ok(PlacedZone {
        name,
        center: (cx, cy),
        radius,
        min_separation,
        anchors,
    })
}

/// Packs fixed-width values LSB-first into a byte stream.
struct BitWriter {
    buf: Vec<u8>,
    acc: u64,
    nbits: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            acc: 0,
            nbits: 0,
        }
    }

    fn write(&mut self, value: u64, width: u32) {
        debug_assert!(width >= 1 && width <= 32 && value >> width == 0);
        self.acc |= value << self.nbits;
        self.nbits += width;
        while self.nbits >= 8 {
            self.buf.push(self.acc as u8);
            self.acc >>= 8;
            self.nbits -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            self.buf.push(self.acc as u8);
        }
        self.buf
    }
}

/// Counterpart of [`BitWriter`].
struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    acc: u64,
    nbits: u32,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            acc: 0,
            nbits: 0,
        }
    }

    fn read(&mut self, width: u32) -> Result<u64, CorruptDataError> {
        while self.nbits < width {
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Err(CorruptDataError::Truncated);
            };
            self.acc |= (byte as u64) << self.nbits;
            self.pos += 1;
            self.nbits += 8;
        }
        let value = self.acc & ((1u64 << width) - 1);
        self.acc >>= width;
        self.nbits -= width;
        Ok(value)
    }
}

/// Byte-aligned header reader with truncation checks.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CorruptDataError> {
        if self.pos + n > self.bytes.len() {
            return Err(CorruptDataError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, CorruptDataError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, CorruptDataError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("2 bytes")))
    }

    fn read_u32(&mut self) -> Result<u32, CorruptDataError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn read_u64(&mut self) -> Result<u64, CorruptDataError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }
}
