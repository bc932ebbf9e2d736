use std::sync::atomic::{AtomicU8, Ordering};

pub(crate) fn divide_by_8_round_up(i: u32) -> u32 {
    let mut result = i >> 3;
    if (i & 0x07) > 0 {
        result += 1;
    }
    result
}

/// (byte index, bit offset within that byte) for register `reg_num` packed at `reg_width` bits.
#[inline(always)]
pub(crate) fn calc_position(reg_num: u32, reg_width: u8) -> (usize, u8) {
    let addr = reg_num * (reg_width as u32);
    let idx = addr >> 3;
    let pos = addr & 0x07;
    (idx.try_into().unwrap(), pos.try_into().unwrap())
}

/// Reads an `n_bits`-wide field starting at bit `pos` of byte `idx`, straddling into `idx + 1`
/// when `pos + n_bits > 8`. Each byte touched is a single atomic load, so this never observes a
/// torn write even when the writer was serialized under a different stripe lock than the reader.
#[inline(always)]
pub(crate) fn read_u8_bits(buf: &[AtomicU8], idx: usize, pos: u8, n_bits: u8) -> u8 {
    debug_assert!(pos < 8);
    let byte = buf[idx].load(Ordering::Relaxed);

    if pos + n_bits <= 8 {
        let mask: u32 = (1 << n_bits) - 1;
        let mask_offset = 8 - (pos + n_bits);
        return (byte >> mask_offset) & (mask as u8);
    }

    let n_bits_upper = 8 - pos;
    let n_bits_lower = n_bits - n_bits_upper;
    let mask_upper = (1 << n_bits_upper) - 1;

    let next = buf[idx + 1].load(Ordering::Relaxed);
    let upper = (byte & mask_upper) << n_bits_lower;
    let lower = next >> (8 - n_bits_lower);
    upper | lower
}

/// Writes an `n_bits`-wide field starting at bit `pos` of byte `idx`, straddling into `idx + 1`
/// as needed. Each byte touched is updated via a compare-exchange retry loop so that concurrent
/// writers to neighboring fields sharing the same byte never clobber each other's bits.
#[inline(always)]
pub(crate) fn write_u8_bits(buf: &[AtomicU8], idx: usize, pos: u8, value: u8, n_bits: u8) {
    debug_assert!(pos < 8);

    if pos + n_bits <= 8 {
        let mut mask: u32 = (1 << n_bits) - 1;
        let mask_offset = 8 - (pos + n_bits);
        mask <<= mask_offset;
        let set_bits = value << mask_offset;
        cas_merge(&buf[idx], !(mask as u8), set_bits);
        return;
    }

    let n_bits_upper = 8 - pos;
    let n_bits_lower = n_bits - n_bits_upper;

    let mask_upper: u8 = (1 << n_bits_upper) - 1;
    let mask_lower: u8 = 0xFF >> n_bits_lower;

    let upper_value = (value >> n_bits_lower) & mask_upper;
    let lower_value = value << (8 - n_bits_lower);

    cas_merge(&buf[idx], !mask_upper, upper_value);
    cas_merge(&buf[idx + 1], mask_lower, lower_value);
}

/// Atomically replaces the bits cleared by `keep_mask` with `set_bits`: `new = (old & keep_mask) | set_bits`.
#[inline(always)]
fn cas_merge(cell: &AtomicU8, keep_mask: u8, set_bits: u8) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let new = (current & keep_mask) | set_bits;
        match cell.compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}
