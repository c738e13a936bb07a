//! Raw SQLite page access: b-tree walking and table-leaf cell decoding.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
const PAGE_TABLE_INTERIOR: u8 = 0x05;
const PAGE_TABLE_LEAF: u8 = 0x0D;
const MAX_FIELDS: usize = 2000;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(Vec<u8>),
    Blob(Vec<u8>),
}

/// Database text encoding from header offset 56.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    /// Unset or unknown values read as UTF-8, matching SQLite.
    fn from_header(raw: u32) -> Self {
        match raw {
            2 => Self::Utf16Le,
            3 => Self::Utf16Be,
            _ => Self::Utf8,
        }
    }

    /// Re-encode stored text as UTF-8. Unpaired surrogates and a dangling
    /// odd byte become U+FFFD.
    pub fn to_utf8(self, bytes: Vec<u8>) -> Vec<u8> {
        let unit: fn([u8; 2]) -> u16 = match self {
            Self::Utf8 => return bytes,
            Self::Utf16Le => u16::from_le_bytes,
            Self::Utf16Be => u16::from_be_bytes,
        };
        let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
        let mut text: String = char::decode_utf16(units)
            .map(|decoded| decoded.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        if bytes.len() % 2 == 1 {
            text.push(char::REPLACEMENT_CHARACTER);
        }
        text.into_bytes()
    }
}

/// One decoded table-leaf cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub pgno: u32,
    pub rowid: i64,
    pub values: Vec<SqlValue>,
}

pub struct PageFile {
    file: File,
    page_size: usize,
    usable_size: usize,
    page_count: u32,
    encoding: TextEncoding,
}

impl PageFile {
    /// Returns `Ok(None)` when the file is not a SQLite database.
    pub fn open(path: &Path) -> std::io::Result<Option<Self>> {
        let mut file = File::open(path)?;
        let mut header = [0u8; 100];
        if file.read_exact(&mut header).is_err() {
            return Ok(None);
        }
        if &header[..SQLITE_HEADER.len()] != SQLITE_HEADER {
            return Ok(None);
        }

        let mut page_size = u16::from_be_bytes([header[16], header[17]]) as usize;
        if page_size == 1 {
            page_size = 65_536;
        }
        if !(512..=65_536).contains(&page_size) || !page_size.is_power_of_two() {
            return Ok(None);
        }
        let reserved = header[20] as usize;
        let usable_size = page_size.saturating_sub(reserved);
        let encoding = TextEncoding::from_header(u32::from_be_bytes([
            header[56], header[57], header[58], header[59],
        ]));

        // The on-disk length is authoritative; the header count may be stale.
        let file_len = file.metadata()?.len();
        let page_count = u32::try_from(file_len.div_ceil(page_size as u64)).unwrap_or(u32::MAX);

        Ok(Some(Self {
            file,
            page_size,
            usable_size,
            page_count,
            encoding,
        }))
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Page numbers are 1-based. Short trailing pages are zero-padded.
    pub fn read_page(&mut self, pgno: u32) -> Option<Vec<u8>> {
        if pgno == 0 || pgno > self.page_count {
            return None;
        }
        let offset = u64::from(pgno - 1) * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset)).ok()?;
        let mut page = vec![0u8; self.page_size];
        let mut filled = 0;
        while filled < page.len() {
            match self.file.read(&mut page[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => return None,
            }
        }
        if filled == 0 {
            return None;
        }
        Some(page)
    }

    /// Page type byte, skipping the database header on page 1.
    pub fn page_type(page: &[u8], pgno: u32) -> Option<u8> {
        page.get(header_offset(pgno)).copied()
    }

    /// Collect the leaf and overflow pages reachable from a table b-tree root.
    /// Non-table roots (indexes, WITHOUT ROWID tables) yield an empty set.
    pub fn walk_table(&mut self, root: u32) -> TreePages {
        let mut out = TreePages::default();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(pgno) = stack.pop() {
            if !visited.insert(pgno) {
                continue;
            }
            let Some(page) = self.read_page(pgno) else {
                continue;
            };
            match Self::page_type(&page, pgno) {
                Some(PAGE_TABLE_INTERIOR) => {
                    stack.extend(interior_children(&page, pgno, self.page_count));
                }
                Some(PAGE_TABLE_LEAF) => {
                    out.leaves.insert(pgno);
                    for cell_offset in cell_offsets(&page, pgno) {
                        let chain = self.overflow_chain(&page, cell_offset);
                        out.overflow.extend(chain);
                    }
                }
                _ => {}
            }
        }

        out
    }

    /// Decode every table-leaf cell of `page`. Undecodable cells are skipped.
    /// Text values come back as UTF-8 whatever the database encoding.
    pub fn leaf_cells(&mut self, page: &[u8], pgno: u32) -> Vec<Cell> {
        let mut out = Vec::new();
        for cell_offset in cell_offsets(page, pgno) {
            let Some((rowid, payload)) = self.extract_payload(page, cell_offset) else {
                continue;
            };
            if let Some(values) = parse_record(&payload) {
                let values = values
                    .into_iter()
                    .map(|value| match value {
                        SqlValue::Text(bytes) => SqlValue::Text(self.encoding.to_utf8(bytes)),
                        other => other,
                    })
                    .collect();
                out.push(Cell {
                    pgno,
                    rowid,
                    values,
                });
            }
        }
        out
    }

    fn extract_payload(&mut self, page: &[u8], cell_offset: usize) -> Option<(i64, Vec<u8>)> {
        let (payload_len, len_size) = read_varint(page.get(cell_offset..)?)?;
        let (rowid, rowid_size) = read_varint(page.get(cell_offset + len_size..)?)?;
        let payload_start = cell_offset + len_size + rowid_size;
        let payload_len = usize::try_from(payload_len).ok()?;
        // A payload can never exceed the whole file.
        if payload_len > self.page_size.saturating_mul(self.page_count as usize) {
            return None;
        }
        let local_len = local_payload_len(payload_len, self.usable_size);
        let local_end = payload_start.checked_add(local_len)?;
        if local_end > page.len() {
            return None;
        }

        let mut out = Vec::with_capacity(payload_len);
        out.extend_from_slice(&page[payload_start..local_end]);

        if payload_len > local_len {
            let mut overflow_page = read_u32(page, local_end)?;
            let mut remaining = payload_len - local_len;
            let overflow_payload = self.usable_size.saturating_sub(4);
            let mut seen = HashSet::new();
            while overflow_page > 0 && remaining > 0 {
                if !seen.insert(overflow_page) {
                    return None;
                }
                let buf = self.read_page(overflow_page)?;
                let next_page = read_u32(&buf, 0)?;
                let take = remaining.min(overflow_payload);
                if 4 + take > buf.len() {
                    return None;
                }
                out.extend_from_slice(&buf[4..4 + take]);
                remaining -= take;
                overflow_page = next_page;
            }
            if remaining > 0 {
                return None;
            }
        }

        Some((rowid as i64, out))
    }

    fn overflow_chain(&mut self, page: &[u8], cell_offset: usize) -> Vec<u32> {
        let mut chain = Vec::new();
        let Some((payload_len, len_size)) = page.get(cell_offset..).and_then(read_varint) else {
            return chain;
        };
        let Some((_, rowid_size)) = page.get(cell_offset + len_size..).and_then(read_varint)
        else {
            return chain;
        };
        let Ok(payload_len) = usize::try_from(payload_len) else {
            return chain;
        };
        let local_len = local_payload_len(payload_len, self.usable_size);
        if payload_len <= local_len {
            return chain;
        }
        let ptr_offset = cell_offset + len_size + rowid_size + local_len;
        let mut next = read_u32(page, ptr_offset).unwrap_or(0);
        while next > 0 && next <= self.page_count && !chain.contains(&next) {
            chain.push(next);
            next = self
                .read_page(next)
                .and_then(|buf| read_u32(&buf, 0))
                .unwrap_or(0);
        }
        chain
    }
}

#[derive(Debug, Default)]
pub struct TreePages {
    pub leaves: HashSet<u32>,
    pub overflow: HashSet<u32>,
}

fn header_offset(pgno: u32) -> usize {
    if pgno == 1 { 100 } else { 0 }
}

fn cell_offsets(page: &[u8], pgno: u32) -> Vec<usize> {
    let base = header_offset(pgno);
    if page.len() < base + 8 {
        return Vec::new();
    }
    let cell_count = u16::from_be_bytes([page[base + 3], page[base + 4]]) as usize;
    let header_len = if page[base] == PAGE_TABLE_INTERIOR { 12 } else { 8 };
    let ptr_start = base + header_len;

    let mut out = Vec::with_capacity(cell_count);
    for cell_index in 0..cell_count {
        let ptr_offset = ptr_start + cell_index * 2;
        if ptr_offset + 1 >= page.len() {
            break;
        }
        let cell_offset = u16::from_be_bytes([page[ptr_offset], page[ptr_offset + 1]]) as usize;
        if cell_offset < ptr_start || cell_offset >= page.len() {
            continue;
        }
        out.push(cell_offset);
    }
    out
}

fn interior_children(page: &[u8], pgno: u32, page_count: u32) -> Vec<u32> {
    let base = header_offset(pgno);
    let mut out = Vec::new();
    for cell_offset in cell_offsets(page, pgno) {
        if let Some(child) = read_u32(page, cell_offset) {
            out.push(child);
        }
    }
    if let Some(right) = read_u32(page, base + 8) {
        out.push(right);
    }
    out.retain(|&child| child > 0 && child <= page_count);
    out
}

/// Decode a record payload into values. Returns `None` for malformed records.
pub fn parse_record(payload: &[u8]) -> Option<Vec<SqlValue>> {
    let (header_size, header_len) = read_varint(payload)?;
    let header_size = usize::try_from(header_size).ok()?;
    if header_size < header_len || header_size > payload.len() {
        return None;
    }

    let mut serials = Vec::new();
    let mut pos = header_len;
    while pos < header_size {
        let (serial, consumed) = read_varint(&payload[pos..header_size])?;
        serials.push(serial);
        pos += consumed;
        if serials.len() > MAX_FIELDS {
            return None;
        }
    }
    if serials.is_empty() {
        return None;
    }

    let mut values = Vec::with_capacity(serials.len());
    let mut data_pos = header_size;
    for serial in serials {
        let len = serial_len(serial)?;
        let next_pos = data_pos.checked_add(len)?;
        let bytes = payload.get(data_pos..next_pos)?;
        let value = match serial {
            0 => SqlValue::Null,
            1..=6 => SqlValue::Integer(decode_int(bytes)?),
            7 => {
                let raw: [u8; 8] = bytes.try_into().ok()?;
                SqlValue::Real(f64::from_be_bytes(raw))
            }
            8 => SqlValue::Integer(0),
            9 => SqlValue::Integer(1),
            n if n % 2 == 0 => SqlValue::Blob(bytes.to_vec()),
            _ => SqlValue::Text(bytes.to_vec()),
        };
        values.push(value);
        data_pos = next_pos;
    }

    Some(values)
}

fn serial_len(serial: u64) -> Option<usize> {
    let len = match serial {
        0 | 8 | 9 => 0,
        1 => 1,
        2 => 2,
        3 => 3,
        4 => 4,
        5 => 6,
        6 | 7 => 8,
        10 | 11 => return None,
        n if n % 2 == 0 => (n - 12) / 2,
        n => (n - 13) / 2,
    };
    usize::try_from(len).ok()
}

fn decode_int(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: i128 = 0;
    for &b in bytes {
        value = (value << 8) | i128::from(b);
    }
    let bits = (bytes.len() * 8) as u32;
    let sign_bit = 1i128 << (bits - 1);
    if value & sign_bit != 0 {
        let mask = (1i128 << bits) - 1;
        value = value - mask - 1;
    }
    i64::try_from(value).ok()
}

fn local_payload_len(payload_len: usize, usable_size: usize) -> usize {
    if usable_size <= 32 {
        return payload_len.min(usable_size.saturating_sub(4));
    }
    let max_local = usable_size.saturating_sub(35);
    let min_local = (usable_size.saturating_sub(12) * 32 / 255).saturating_sub(23);
    if payload_len <= max_local {
        payload_len
    } else {
        let mut local = min_local + ((payload_len - min_local) % (usable_size - 4));
        if local > max_local {
            local = min_local;
        }
        local
    }
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_varint(data: &[u8]) -> Option<(u64, usize)> {
    if data.is_empty() {
        return None;
    }
    let mut value = 0u64;
    for i in 0..8 {
        let byte = *data.get(i)?;
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    let byte = *data.get(8)?;
    value = (value << 8) | u64::from(byte);
    Some((value, 9))
}
