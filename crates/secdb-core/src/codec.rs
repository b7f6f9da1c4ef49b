//! Tagged record codec for the event stream.
//!
//! Three record kinds share the stream; the first byte dispatches:
//!
//! ```text
//! Full MD (0xC0)
//! ┌──────┬────────────────┬───────────────────────────────────────────┐
//! │ 0xC0 │ timestamp      │ depth bid levels, then depth ask levels:  │
//! │      │ (8 bytes BE)   │ SVarint(price) UVarint(size) each         │
//! └──────┴────────────────┴───────────────────────────────────────────┘
//!
//! Delta MD (0x80)
//! ┌──────┬────────────────┬──────────────────┬────────────────────────┐
//! │ 0x80 │ UVarint        │ ceil(2*depth/8)  │ per set bit, in order: │
//! │      │ ts delta (ms)  │ bitmask bytes    │ SVarint(dprice)        │
//! │      │                │                  │ SVarint(dsize)         │
//! └──────┴────────────────┴──────────────────┴────────────────────────┘
//!
//! Trade (0xA0)
//! ┌──────┬────────────────┬──────────────────┬──────────┬────────────┐
//! │ 0xA0 │ timestamp      │ UVarint trade_id │ SVarint  │ UVarint    │
//! │      │ (8 bytes BE)   │                  │ price    │ volume     │
//! └──────┴────────────────┴──────────────────┴──────────┴────────────┘
//! ```
//!
//! The delta bitmask flags which levels changed, one bit per level per
//! side: from the LSB of byte 0, `bid0 .. bid_{d-1}, ask0 .. ask_{d-1}`,
//! widened to whole bytes. Unset levels carry over from the previous
//! snapshot verbatim.
//!
//! The first MD of each chunk is written full so a seek can land there
//! with no prior state; every later MD in the same chunk is a delta
//! against its predecessor. Trades never participate in delta chains.
//!
//! Decoding distinguishes truncation ([`Error::Truncated`], the torn-tail
//! signal) from corruption ([`Error::CorruptStream`]): an unknown tag, a
//! delta without a preceding snapshot, bitmask bits beyond `2*depth`, or
//! a delta that overflows a reconstructed timestamp, price, or size are
//! never tolerated.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::event::{Event, Level, MdSnapshot, Trade};
use crate::varint;

/// Tag byte of a self-contained MD snapshot.
pub const TAG_FULL_MD: u8 = 0xC0;
/// Tag byte of an MD snapshot delta-encoded against its predecessor.
pub const TAG_DELTA_MD: u8 = 0x80;
/// Tag byte of a trade.
pub const TAG_TRADE: u8 = 0xA0;

/// Encode a full MD snapshot. The snapshot must already hold exactly
/// `depth` levels per side.
pub fn encode_full_md(buf: &mut impl BufMut, md: &MdSnapshot) {
    buf.put_u8(TAG_FULL_MD);
    buf.put_u64(md.timestamp);
    for level in md.bid.iter().chain(md.ask.iter()) {
        varint::encode_svarint(buf, level.price);
        varint::encode_uvarint(buf, level.size);
    }
}

/// Encode an MD snapshot as a delta against `prev`. Both snapshots must
/// hold the same number of levels per side and `md` must not precede
/// `prev` in time.
pub fn encode_delta_md(buf: &mut impl BufMut, md: &MdSnapshot, prev: &MdSnapshot) {
    debug_assert_eq!(md.bid.len(), prev.bid.len());
    debug_assert_eq!(md.ask.len(), prev.ask.len());
    debug_assert!(md.timestamp >= prev.timestamp);

    let depth = md.bid.len();
    buf.put_u8(TAG_DELTA_MD);
    varint::encode_uvarint(buf, md.timestamp - prev.timestamp);

    let pairs = || {
        md.bid
            .iter()
            .zip(prev.bid.iter())
            .chain(md.ask.iter().zip(prev.ask.iter()))
    };

    // depth is capped at 32 per side, so 8 mask bytes always suffice
    let mut mask = [0u8; 8];
    for (bit, (current, old)) in pairs().enumerate() {
        if current != old {
            mask[bit / 8] |= 1 << (bit % 8);
        }
    }
    buf.put_slice(&mask[..mask_len(depth)]);

    for (current, old) in pairs() {
        if current != old {
            varint::encode_svarint(buf, current.price - old.price);
            varint::encode_svarint(buf, current.size as i64 - old.size as i64);
        }
    }
}

/// Encode a trade.
pub fn encode_trade(buf: &mut impl BufMut, trade: &Trade) {
    buf.put_u8(TAG_TRADE);
    buf.put_u64(trade.timestamp);
    varint::encode_uvarint(buf, trade.trade_id);
    varint::encode_svarint(buf, trade.price);
    varint::encode_uvarint(buf, trade.volume);
}

/// Decode one record from the cursor.
///
/// `prev` is the reconstructed state of the most recent MD on this stream;
/// a delta record without it is corruption, not truncation.
pub fn decode_record(
    buf: &mut impl Buf,
    depth: usize,
    prev: Option<&MdSnapshot>,
) -> Result<Event> {
    if !buf.has_remaining() {
        return Err(Error::Truncated);
    }
    let tag = buf.get_u8();
    match tag {
        TAG_FULL_MD => decode_full_md(buf, depth).map(Event::Md),
        TAG_DELTA_MD => {
            let prev = prev.ok_or_else(|| {
                Error::CorruptStream("delta record without a preceding snapshot".to_string())
            })?;
            decode_delta_md(buf, depth, prev).map(Event::Md)
        }
        TAG_TRADE => decode_trade(buf).map(Event::Trade),
        other => Err(Error::CorruptStream(format!(
            "unknown record tag 0x{other:02X}"
        ))),
    }
}

fn mask_len(depth: usize) -> usize {
    (2 * depth + 7) / 8
}

fn decode_timestamp(buf: &mut impl Buf) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(Error::Truncated);
    }
    Ok(buf.get_u64())
}

fn decode_side(buf: &mut impl Buf, depth: usize) -> Result<Vec<Level>> {
    let mut side = Vec::with_capacity(depth);
    for _ in 0..depth {
        let price = varint::decode_svarint(buf)?;
        let size = varint::decode_uvarint(buf)?;
        side.push(Level { price, size });
    }
    Ok(side)
}

fn decode_full_md(buf: &mut impl Buf, depth: usize) -> Result<MdSnapshot> {
    let timestamp = decode_timestamp(buf)?;
    let bid = decode_side(buf, depth)?;
    let ask = decode_side(buf, depth)?;
    Ok(MdSnapshot { timestamp, bid, ask })
}

fn decode_delta_md(buf: &mut impl Buf, depth: usize, prev: &MdSnapshot) -> Result<MdSnapshot> {
    if prev.bid.len() != depth || prev.ask.len() != depth {
        return Err(Error::CorruptStream(format!(
            "anchor snapshot has {}x{} levels, expected depth {depth}",
            prev.bid.len(),
            prev.ask.len(),
        )));
    }

    let ts_delta = varint::decode_uvarint(buf)?;

    let mask_len = mask_len(depth);
    if buf.remaining() < mask_len {
        return Err(Error::Truncated);
    }
    let mut mask = [0u8; 8];
    buf.copy_to_slice(&mut mask[..mask_len]);

    for bit in 2 * depth..mask_len * 8 {
        if mask[bit / 8] & (1 << (bit % 8)) != 0 {
            return Err(Error::CorruptStream(format!(
                "delta bitmask flags level {bit}, beyond depth {depth}"
            )));
        }
    }

    let mut md = prev.clone();
    md.timestamp = prev.timestamp.checked_add(ts_delta).ok_or_else(|| {
        Error::CorruptStream("timestamp delta overflows the reconstructed timestamp".to_string())
    })?;
    for bit in 0..2 * depth {
        if mask[bit / 8] & (1 << (bit % 8)) == 0 {
            continue;
        }
        let dprice = varint::decode_svarint(buf)?;
        let dsize = varint::decode_svarint(buf)?;
        let level = if bit < depth {
            &mut md.bid[bit]
        } else {
            &mut md.ask[bit - depth]
        };
        level.price = level.price.checked_add(dprice).ok_or_else(|| {
            Error::CorruptStream(format!("price delta overflows at level {bit}"))
        })?;
        level.size = apply_size_delta(level.size, dsize).ok_or_else(|| {
            Error::CorruptStream(format!("size delta overflows at level {bit}"))
        })?;
    }
    Ok(md)
}

fn apply_size_delta(size: u64, delta: i64) -> Option<u64> {
    if delta >= 0 {
        size.checked_add(delta as u64)
    } else {
        size.checked_sub(delta.unsigned_abs())
    }
}

fn decode_trade(buf: &mut impl Buf) -> Result<Trade> {
    let timestamp = decode_timestamp(buf)?;
    let trade_id = varint::decode_uvarint(buf)?;
    let price = varint::decode_svarint(buf)?;
    let volume = varint::decode_uvarint(buf)?;
    Ok(Trade {
        timestamp,
        trade_id,
        price,
        volume,
    })
}
