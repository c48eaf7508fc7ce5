//! page/record — кадрирование одной записи внутри page-файла.
//!
//! Формат (8 байт заголовка + payload, записи идут подряд без выравнивания):
//! - [0..4)  len    u32 LE — длина payload в байтах
//! - [4..8)  crc32c u32 LE — CRC32C(payload)
//! - [8..8+len) payload

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Write};

pub const REC_HDR_SIZE: usize = 8;
pub const REC_OFF_LEN: usize = 0;
pub const REC_OFF_CRC32: usize = 4;

/// Полный размер записи на диске для payload заданной длины.
#[inline]
pub fn record_len(payload_len: usize) -> u64 {
    (REC_HDR_SIZE + payload_len) as u64
}

/// Построить заголовок записи для payload.
pub fn build_hdr(payload: &[u8]) -> Result<[u8; REC_HDR_SIZE]> {
    if payload.len() > u32::MAX as usize {
        return Err(anyhow!(
            "payload too large for page record: {} bytes (max {})",
            payload.len(),
            u32::MAX
        ));
    }
    let mut hdr = [0u8; REC_HDR_SIZE];
    LittleEndian::write_u32(
        &mut hdr[REC_OFF_LEN..REC_OFF_LEN + 4],
        payload.len() as u32,
    );
    LittleEndian::write_u32(
        &mut hdr[REC_OFF_CRC32..REC_OFF_CRC32 + 4],
        crc32c::crc32c(payload),
    );
    Ok(hdr)
}

/// Записать [header][payload] по текущей позиции writer'а.
/// Возвращает число записанных байт.
pub fn write_record<W: Write>(writer: &mut W, payload: &[u8]) -> Result<u64> {
    let hdr = build_hdr(payload)?;
    writer.write_all(&hdr)?;
    if !payload.is_empty() {
        writer.write_all(payload)?;
    }
    Ok(record_len(payload.len()))
}

/// Прочитать одну запись по текущей позиции reader'а.
///
/// `limit` — сколько байт от текущей позиции опубликовано писателем; запись,
/// которая не умещается в limit, считается повреждением (писатель публикует
/// только целые записи).
pub fn read_record<R: Read>(reader: &mut R, limit: u64) -> Result<(Vec<u8>, u64)> {
    if limit < REC_HDR_SIZE as u64 {
        return Err(anyhow!(
            "truncated page record header: {} bytes available",
            limit
        ));
    }
    let mut hdr = [0u8; REC_HDR_SIZE];
    reader.read_exact(&mut hdr)?;

    let len = LittleEndian::read_u32(&hdr[REC_OFF_LEN..REC_OFF_LEN + 4]) as usize;
    let total = record_len(len);
    if total > limit {
        return Err(anyhow!(
            "page record overruns published bytes: len={} available={}",
            len,
            limit - REC_HDR_SIZE as u64
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let stored = LittleEndian::read_u32(&hdr[REC_OFF_CRC32..REC_OFF_CRC32 + 4]);
    let calc = crc32c::crc32c(&payload);
    if stored != calc {
        return Err(anyhow!(
            "page record CRC mismatch (stored={}, calc={}, len={})",
            stored,
            calc,
            len
        ));
    }
    Ok((payload, total))
}
