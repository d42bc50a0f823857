use std::{
    convert::TryInto,
    io::{Cursor, Read},
    mem::size_of,
};

use crate::error::{CheckpointErrorKind, SmallError};

pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decodeable {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self;
}

pub fn read_into<T: Decodeable, R: std::io::Read>(reader: &mut R) -> T {
    T::decode_from(reader)
}

pub fn read_exact<R: std::io::Read>(
    reader: &mut R,
    bytes_count: usize,
) -> Vec<u8> {
    let mut buffer = vec![0u8; bytes_count];
    reader
        .read_exact(&mut buffer)
        .expect(&format!("io error, expect {}", bytes_count));
    buffer
}

pub fn decode_bytes<T: Decodeable>(bytes: &[u8]) -> T {
    let mut reader = Cursor::new(bytes);
    T::decode_from(&mut reader)
}

pub struct SmallWriter {
    buf: Vec<u8>,
}

impl SmallWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) {
        self.buf.extend_from_slice(obj.encode().as_slice());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }
}

/// A NUL-terminated string, the layout `open_file_name` uses in the
/// table-blob of a checkpoint record (unlike `io.rs`'s length-prefixed
/// `String` impl, which is used nowhere in the wire format below).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CStr0(pub String);

impl Encodeable for CStr0 {
    fn encode(&self) -> Vec<u8> {
        let mut buf = self.0.as_bytes().to_vec();
        buf.push(0);
        buf
    }
}

impl Decodeable for CStr0 {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            reader.read_exact(&mut byte).expect("io error, expect 1");
            if byte[0] == 0 {
                break;
            }
            bytes.push(byte[0]);
        }
        CStr0(String::from_utf8(bytes).expect("invalid utf8 in c-string"))
    }
}

/// 1 byte (0 for false, 1 for true).
impl Encodeable for bool {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decodeable for bool {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        u8::decode_from(reader) == 1
    }
}

macro_rules! impl_serialization {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }

            impl Decodeable for $t {
                fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
                    let bytes = read_exact(reader, size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_serialization!(for u8, u16, u32, u64, i8, i16, i32, i64);

pub fn io_error(kind: CheckpointErrorKind, e: impl std::fmt::Display) -> SmallError {
    SmallError::new(kind, &e.to_string())
}
