//! Adler-32-style rolling checksum revisions.
//!
//! Three historical revisions share the same shape: two accumulators, `a`
//! seeded with 1, packed as `(b << 16) | a`. They differ in how the
//! accumulators are reduced:
//!
//! - v1 truncates both halves to 16 bits (wrap at 65536, never mod 65521).
//!   This is the wire-default `"Adler32"`; its arithmetic is pinned by
//!   compatibility fixtures and must not be corrected.
//! - v2 reduces mod 65521 in `calculate`, but its `rotate` feeds
//!   possibly-negative intermediates through truncated `%` before the 16-bit
//!   cast, so rotate and calculate can disagree. Kept for reading old
//!   streams only.
//! - v3 is the corrected revision: rotate renormalizes negative residues by
//!   adding the modulus back.

const MODULUS: i64 = 65521;

pub(crate) fn v1_calculate(data: &[u8]) -> u32 {
    let mut a: u16 = 1;
    let mut b: u16 = 0;
    for &byte in data {
        a = a.wrapping_add(u16::from(byte));
        b = b.wrapping_add(a);
    }
    (u32::from(b) << 16) | u32::from(a)
}

pub(crate) fn v1_rotate(checksum: u32, remove: u8, add: u8, window: usize) -> u32 {
    let b = (checksum >> 16) as u16;
    let a = checksum as u16;

    let a = (i64::from(a) - i64::from(remove) + i64::from(add)) as u16;
    let b = (i64::from(b) - (window as i64 * i64::from(remove)) + i64::from(a) - 1) as u16;

    (u32::from(b) << 16) | u32::from(a)
}

pub(crate) fn v2_calculate(data: &[u8]) -> u32 {
    let mut a: i64 = 1;
    let mut b: i64 = 0;
    for &byte in data {
        a = (a + i64::from(byte)) % MODULUS;
        b = (b + a) % MODULUS;
    }
    ((b as u32) << 16) | (a as u32)
}

pub(crate) fn v2_rotate(checksum: u32, remove: u8, add: u8, window: usize) -> u32 {
    let b = (checksum >> 16) as u16;
    let a = checksum as u16;

    // Truncated % can leave a negative residue here; the 16-bit cast then
    // wraps it. That disagreement with v2_calculate is the recorded behavior.
    let a = ((i64::from(a) - i64::from(remove) + i64::from(add)) % MODULUS) as u16;
    let b = ((i64::from(b) - (window as i64 * i64::from(remove)) + i64::from(a) - 1) % MODULUS)
        as u16;

    (u32::from(b) << 16) | u32::from(a)
}

pub(crate) fn v3_calculate(data: &[u8]) -> u32 {
    let mut a: i64 = 1;
    let mut b: i64 = 0;
    for &byte in data {
        a += i64::from(byte);
        if a >= MODULUS {
            a -= MODULUS;
        }
        b += a;
        if b >= MODULUS {
            b -= MODULUS;
        }
    }
    ((b as u32) << 16) | (a as u32)
}

pub(crate) fn v3_rotate(checksum: u32, remove: u8, add: u8, window: usize) -> u32 {
    let b = (checksum >> 16) as u16;
    let a = checksum as u16;

    let mut temp = i64::from(a) - i64::from(remove) + i64::from(add);
    if temp < 0 {
        temp += MODULUS;
    } else if temp >= MODULUS {
        temp -= MODULUS;
    }
    let a = temp as u16;

    let mut temp =
        (i64::from(b) - (window as i64 * i64::from(remove)) + i64::from(a) - 1) % MODULUS;
    if temp < 0 {
        temp += MODULUS;
    }
    let b = temp as u16;

    (u32::from(b) << 16) | u32::from(a)
}
