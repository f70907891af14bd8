//! geometry.rs — the on-disk geometry block
//!
//! Block 0 of the backing device encodes `{release_version, nonce, uuid,
//! region_table[INDEX,DATA], index_config{mem, checkpoint_frequency,
//! sparse}}`, little-endian packed, with a trailing CRC-32 so a truncated
//! or corrupted block is rejected rather than silently misread. Read once
//! during construction through [`crate::engine::EngineFacade::read_geometry_block`].

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::ErrorKind;

pub const GEOMETRY_BLOCK_SIZE: usize = 4096;

const MAGIC: &[u8; 8] = b"VDOGEOM1";
/// The only value the index's flat-page layout may take in this admission
/// front-end: there is no flat-page index support here, so a block
/// claiming otherwise is not one this crate can safely admit.
const CANONICAL_FLAT_PAGE_ORIGIN: u64 = 1;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One entry of the region table: an identifying tag plus its starting
/// block offset on the backing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionEntry {
    pub id: u8,
    pub offset_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    pub mem_gb: u32,
    pub checkpoint_frequency: u32,
    pub sparse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryState {
    pub release_version: u32,
    pub nonce: u64,
    pub uuid: [u8; 16],
    pub region_index: RegionEntry,
    pub region_data: RegionEntry,
    pub index_config: IndexConfig,
}

/// The part of the header laid down before the trailing CRC; kept as a
/// named constant so encode/decode agree on where the checksum starts.
const HEADER_SIZE: usize = MAGIC.len()
    + 4 // release_version
    + 8 // flat_page_origin
    + 8 // flat_page_count
    + 8 // nonce
    + 16 // uuid
    + 1 + 8 // region_index
    + 1 + 8 // region_data
    + 4 + 4 + 1; // index_config

pub fn encode(state: &GeometryState) -> [u8; GEOMETRY_BLOCK_SIZE] {
    let mut buf = [0u8; GEOMETRY_BLOCK_SIZE];
    let mut w = 0;

    buf[w..w + MAGIC.len()].copy_from_slice(MAGIC);
    w += MAGIC.len();

    buf[w..w + 4].copy_from_slice(&state.release_version.to_le_bytes());
    w += 4;

    buf[w..w + 8].copy_from_slice(&CANONICAL_FLAT_PAGE_ORIGIN.to_le_bytes());
    w += 8;
    buf[w..w + 8].copy_from_slice(&0u64.to_le_bytes());
    w += 8;

    buf[w..w + 8].copy_from_slice(&state.nonce.to_le_bytes());
    w += 8;

    buf[w..w + 16].copy_from_slice(&state.uuid);
    w += 16;

    buf[w] = state.region_index.id;
    w += 1;
    buf[w..w + 8].copy_from_slice(&state.region_index.offset_blocks.to_le_bytes());
    w += 8;

    buf[w] = state.region_data.id;
    w += 1;
    buf[w..w + 8].copy_from_slice(&state.region_data.offset_blocks.to_le_bytes());
    w += 8;

    buf[w..w + 4].copy_from_slice(&state.index_config.mem_gb.to_le_bytes());
    w += 4;
    buf[w..w + 4].copy_from_slice(&state.index_config.checkpoint_frequency.to_le_bytes());
    w += 4;
    buf[w] = state.index_config.sparse as u8;
    w += 1;

    debug_assert_eq!(w, HEADER_SIZE);

    let checksum = CRC32.checksum(&buf[..HEADER_SIZE]);
    buf[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&checksum.to_le_bytes());

    buf
}

pub fn decode(block: &[u8]) -> Result<GeometryState, ErrorKind> {
    if block.len() != GEOMETRY_BLOCK_SIZE {
        return Err(ErrorKind::BadState(format!(
            "geometry block has {} bytes, expected {}",
            block.len(),
            GEOMETRY_BLOCK_SIZE
        )));
    }
    if &block[..MAGIC.len()] != MAGIC {
        return Err(ErrorKind::BadState("geometry block magic mismatch".into()));
    }

    let checksum = CRC32.checksum(&block[..HEADER_SIZE]);
    let stored = u32::from_le_bytes(block[HEADER_SIZE..HEADER_SIZE + 4].try_into().unwrap());
    if checksum != stored {
        return Err(ErrorKind::BadState("geometry block checksum mismatch".into()));
    }

    let mut r = MAGIC.len();
    let release_version = u32::from_le_bytes(block[r..r + 4].try_into().unwrap());
    r += 4;

    let flat_page_origin = u64::from_le_bytes(block[r..r + 8].try_into().unwrap());
    r += 8;
    if flat_page_origin != CANONICAL_FLAT_PAGE_ORIGIN {
        return Err(ErrorKind::BadState("geometry block flat_page_origin is not canonical".into()));
    }
    let flat_page_count = u64::from_le_bytes(block[r..r + 8].try_into().unwrap());
    r += 8;
    if flat_page_count != 0 {
        return Err(ErrorKind::BadState("geometry block flat_page_count must be zero".into()));
    }

    let nonce = u64::from_le_bytes(block[r..r + 8].try_into().unwrap());
    r += 8;

    let mut uuid = [0u8; 16];
    uuid.copy_from_slice(&block[r..r + 16]);
    r += 16;

    let region_index = RegionEntry {
        id: block[r],
        offset_blocks: {
            r += 1;
            let v = u64::from_le_bytes(block[r..r + 8].try_into().unwrap());
            r += 8;
            v
        },
    };

    let region_data = RegionEntry {
        id: block[r],
        offset_blocks: {
            r += 1;
            let v = u64::from_le_bytes(block[r..r + 8].try_into().unwrap());
            r += 8;
            v
        },
    };

    let mem_gb = u32::from_le_bytes(block[r..r + 4].try_into().unwrap());
    r += 4;
    let checkpoint_frequency = u32::from_le_bytes(block[r..r + 4].try_into().unwrap());
    r += 4;
    let sparse = block[r] != 0;
    r += 1;

    debug_assert_eq!(r, HEADER_SIZE);

    Ok(GeometryState {
        release_version,
        nonce,
        uuid,
        region_index,
        region_data,
        index_config: IndexConfig {
            mem_gb,
            checkpoint_frequency,
            sparse,
        },
    })
}
