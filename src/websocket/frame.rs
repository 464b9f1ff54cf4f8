//! Frame header layout, opcodes and payload masking.
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |           (16/64)             |
//! |N|V|V|V|       |S|             |                               |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                    Masking-key, if MASK set                   |
//! +---------------------------------------------------------------+
//! ```

/// Final fragment of a message.
pub const FLAG_FIN: u8 = 0x80;
/// Reserved bit 1.
pub const FLAG_RSV1: u8 = 0x40;
/// Reserved bit 2.
pub const FLAG_RSV2: u8 = 0x20;
/// Reserved bit 3.
pub const FLAG_RSV3: u8 = 0x10;
/// All bits a caller may set on an outbound message.
pub const RESERVED_FLAGS: u8 = FLAG_RSV1 | FLAG_RSV2 | FLAG_RSV3;

const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;

/// Largest possible header: 2 fixed bytes, 8 length bytes, 4 key bytes.
pub const MAX_HEADER_LEN: usize = 14;

/// Frame opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any opcode this client does not assign a meaning to.
    Reserved(u8),
}

impl OpCode {
    /// The 4-bit wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Reserved(value) => value & OPCODE_MASK,
        }
    }

    /// Whether this is a control opcode (close, ping, pong and the reserved 0xB-0xF range).
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x08 != 0
    }
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        match value & OPCODE_MASK {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }
}

/// A decoded or to-be-encoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    /// Reserved bits (RSV1-RSV3) in their wire positions.
    pub flags: u8,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: u64,
}

impl FrameHeader {
    /// Number of bytes the encoded header occupies.
    pub fn encoded_len(&self) -> usize {
        header_len(self.payload_len, self.mask.is_some())
    }

    /// Encode into a fixed array, returning it with the number of bytes used.
    pub fn encode(&self) -> ([u8; MAX_HEADER_LEN], usize) {
        let mut out = [0u8; MAX_HEADER_LEN];
        out[0] = (self.flags & RESERVED_FLAGS) | self.opcode.as_u8();
        if self.fin {
            out[0] |= FLAG_FIN;
        }
        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };

        let mut pos = 2;
        if self.payload_len < 126 {
            out[1] = mask_bit | self.payload_len as u8;
        } else if self.payload_len <= u16::MAX as u64 {
            out[1] = mask_bit | 126;
            out[2..4].copy_from_slice(&(self.payload_len as u16).to_be_bytes());
            pos = 4;
        } else {
            out[1] = mask_bit | 127;
            out[2..10].copy_from_slice(&self.payload_len.to_be_bytes());
            pos = 10;
        }

        if let Some(key) = self.mask {
            out[pos..pos + 4].copy_from_slice(&key);
            pos += 4;
        }
        (out, pos)
    }

    /// Decode the two fixed header bytes into (fin, flags, opcode, masked, 7-bit length).
    pub fn split_prefix(b0: u8, b1: u8) -> (bool, u8, OpCode, bool, u8) {
        (
            b0 & FLAG_FIN != 0,
            b0 & RESERVED_FLAGS,
            OpCode::from(b0),
            b1 & MASK_BIT != 0,
            b1 & 0x7F,
        )
    }
}

/// Header size for a payload of `payload_len` bytes.
pub fn header_len(payload_len: u64, masked: bool) -> usize {
    let base = if payload_len < 126 {
        2
    } else if payload_len <= u16::MAX as u64 {
        4
    } else {
        10
    };
    if masked {
        base + 4
    } else {
        base
    }
}

/// XOR `data` with `key`, where `data[0]` sits at `offset` within the frame payload.
pub fn apply_mask(key: [u8; 4], offset: usize, data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(offset + i) & 3];
    }
}

/// Fresh masking key from the thread-local CSPRNG.
pub fn random_mask_key() -> [u8; 4] {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for value in 0u8..16 {
            assert_eq!(OpCode::from(value).as_u8(), value);
        }
        assert_eq!(OpCode::from(0x1), OpCode::Text);
        assert_eq!(OpCode::from(0xA), OpCode::Pong);
        assert_eq!(OpCode::from(0x3), OpCode::Reserved(0x3));
        assert!(OpCode::Ping.is_control());
        assert!(!OpCode::Binary.is_control());
    }

    #[test]
    fn test_header_len_boundaries() {
        assert_eq!(header_len(0, false), 2);
        assert_eq!(header_len(125, false), 2);
        assert_eq!(header_len(126, false), 4);
        assert_eq!(header_len(65535, false), 4);
        assert_eq!(header_len(65536, false), 10);
        assert_eq!(header_len(125, true), 6);
        assert_eq!(header_len(65536, true), 14);
    }

    #[test]
    fn test_encode_short_unmasked() {
        let header = FrameHeader {
            fin: true,
            flags: 0,
            opcode: OpCode::Text,
            mask: None,
            payload_len: 5,
        };
        let (bytes, len) = header.encode();
        assert_eq!(&bytes[..len], &[0x81, 0x05]);
    }

    #[test]
    fn test_encode_extended_masked() {
        let header = FrameHeader {
            fin: false,
            flags: FLAG_RSV1,
            opcode: OpCode::Continuation,
            mask: Some([1, 2, 3, 4]),
            payload_len: 300,
        };
        let (bytes, len) = header.encode();
        assert_eq!(len, header.encoded_len());
        assert_eq!(&bytes[..len], &[0x40, 0xFE, 0x01, 0x2C, 1, 2, 3, 4]);
    }

    #[test]
    fn test_encode_64bit_length() {
        let header = FrameHeader {
            fin: true,
            flags: 0,
            opcode: OpCode::Binary,
            mask: None,
            payload_len: 70_000,
        };
        let (bytes, len) = header.encode();
        assert_eq!(len, 10);
        assert_eq!(bytes[1], 127);
        assert_eq!(u64::from_be_bytes(bytes[2..10].try_into().unwrap()), 70_000);
    }

    #[test]
    fn test_mask_offset_wraps_key() {
        let key = [0xAA, 0xBB, 0xCC, 0xDD];
        let mut whole = *b"hello world";
        apply_mask(key, 0, &mut whole);

        let mut split = *b"hello world";
        let (head, tail) = split.split_at_mut(3);
        apply_mask(key, 0, head);
        apply_mask(key, 3, tail);
        assert_eq!(whole, split);

        apply_mask(key, 0, &mut whole);
        assert_eq!(&whole, b"hello world");
    }
}
