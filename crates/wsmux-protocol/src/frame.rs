//! Binary batch envelope.
//!
//! Layout, all integers little-endian u32:
//!
//! ```text
//! [count][len0][msg0 bytes][len1][msg1 bytes]...
//! ```
//!
//! Only used for two or more messages; a lone message goes out as a plain
//! text frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

const U32_LEN: usize = 4;

/// Exact size of the envelope for `msgs`.
pub fn encoded_len<B: AsRef<[u8]>>(msgs: &[B]) -> usize {
    U32_LEN + msgs.iter().map(|m| U32_LEN + m.as_ref().len()).sum::<usize>()
}

/// Append the envelope for `msgs` to `out`.
pub fn encode_batch_into<B, W>(msgs: &[B], out: &mut W) -> Result<(), ProtocolError>
where
    B: AsRef<[u8]>,
    W: BufMut,
{
    let count = u32::try_from(msgs.len()).map_err(|_| ProtocolError::OversizedElement(msgs.len()))?;
    out.put_u32_le(count);
    for msg in msgs {
        let msg = msg.as_ref();
        let len = u32::try_from(msg.len()).map_err(|_| ProtocolError::OversizedElement(msg.len()))?;
        out.put_u32_le(len);
        out.put_slice(msg);
    }
    Ok(())
}

pub fn encode_batch<B: AsRef<[u8]>>(msgs: &[B]) -> Result<Bytes, ProtocolError> {
    let mut out = BytesMut::with_capacity(encoded_len(msgs));
    encode_batch_into(msgs, &mut out)?;
    Ok(out.freeze())
}

/// Split an envelope back into its messages, in order.
pub fn decode_batch(frame: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
    let mut buf = frame;
    if buf.remaining() < U32_LEN {
        return Err(ProtocolError::TruncatedBatch("missing count"));
    }
    let count = buf.get_u32_le() as usize;
    // count is untrusted; don't let it drive the allocation
    let mut msgs = Vec::with_capacity(count.min(buf.remaining() / U32_LEN));
    for _ in 0..count {
        if buf.remaining() < U32_LEN {
            return Err(ProtocolError::TruncatedBatch("missing length prefix"));
        }
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len {
            return Err(ProtocolError::TruncatedBatch("message shorter than its length prefix"));
        }
        msgs.push(Bytes::copy_from_slice(&buf[..len]));
        buf.advance(len);
    }
    if buf.has_remaining() {
        return Err(ProtocolError::TrailingBytes(buf.remaining()));
    }
    Ok(msgs)
}
