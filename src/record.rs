//! The checkpoint record itself (§6.1): the log payload written by the
//! executor, and its decode for tests and for a recovering engine.

use std::{convert::TryInto, io::Cursor};

use crate::{
    io::{decode_bytes, read_exact, read_into, CStr0, Decodeable, Encodeable, SmallWriter},
    lsn::Lsn,
};

/// One entry of the table-blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecordEntry {
    pub short_id: u16,
    pub index_file_descriptor: i32,
    pub data_file_descriptor: i32,
    pub lsn_of_file_id: Lsn,
    pub open_file_name: String,
}

impl Encodeable for TableRecordEntry {
    fn encode(&self) -> Vec<u8> {
        let mut w = SmallWriter::new();
        w.write(&self.short_id);
        w.write(&self.index_file_descriptor);
        w.write(&self.data_file_descriptor);
        w.write(&self.lsn_of_file_id.raw());
        w.write(&CStr0(self.open_file_name.clone()));
        w.to_bytes()
    }
}

impl Decodeable for TableRecordEntry {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let short_id = read_into(reader);
        let index_file_descriptor = read_into(reader);
        let data_file_descriptor = read_into(reader);
        let lsn_of_file_id = Lsn::from_raw(read_into(reader));
        let open_file_name = CStr0::decode_from(reader).0;
        TableRecordEntry {
            short_id,
            index_file_descriptor,
            data_file_descriptor,
            lsn_of_file_id,
            open_file_name,
        }
    }
}

/// The concatenation of the five blobs described in §3/§6.1: horizon,
/// two transaction-manager blobs, the table-blob, and the page-blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub horizon: Lsn,
    pub txn_blob_a: Vec<u8>,
    pub txn_blob_b: Vec<u8>,
    pub tables: Vec<TableRecordEntry>,
    /// Opaque page-cache payload, not interpreted by this crate beyond
    /// the leading count used by the pacer.
    pub page_payload: Vec<u8>,
}

impl CheckpointRecord {
    /// Build the page-blob (§6.1: `u32` dirty-page count followed by
    /// opaque payload) from a page count and the cache's raw bytes.
    pub fn make_page_blob(dirty_page_count: u32, raw_payload: &[u8]) -> Vec<u8> {
        let mut w = SmallWriter::new();
        w.write(&dirty_page_count);
        w.write_bytes(raw_payload);
        w.to_bytes()
    }

    /// Count carried in the page-blob's leading `u32` — the pacer
    /// budget for `pages_to_flush_before_next_checkpoint` (§4.3 step 7).
    pub fn dirty_page_count(&self) -> u32 {
        if self.page_payload.len() < 4 {
            return 0;
        }
        u32::from_le_bytes(self.page_payload[..4].try_into().unwrap())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = SmallWriter::new();
        w.write(&self.horizon.raw());

        // Transaction-manager blobs are opaque to this crate; frame
        // each with its own length so the record is self-delimiting
        // end to end (the real log framework instead bounds the whole
        // record, making this framing redundant but harmless there).
        w.write(&(self.txn_blob_a.len() as u32));
        w.write_bytes(&self.txn_blob_a);
        w.write(&(self.txn_blob_b.len() as u32));
        w.write_bytes(&self.txn_blob_b);

        w.write(&(self.tables.len() as u32));
        for t in &self.tables {
            w.write(t);
        }

        // The page-blob is the last field in the record, so it needs
        // no extra framing: it already begins with its own count
        // (§6.1) and simply runs to the end of the payload.
        w.write_bytes(&self.page_payload);

        w.to_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let mut reader = Cursor::new(bytes);

        let horizon = Lsn::from_raw(read_into(&mut reader));

        let len_a: u32 = read_into(&mut reader);
        let txn_blob_a = read_exact(&mut reader, len_a as usize);
        let len_b: u32 = read_into(&mut reader);
        let txn_blob_b = read_exact(&mut reader, len_b as usize);

        let nb_stored: u32 = read_into(&mut reader);
        let mut tables = Vec::with_capacity(nb_stored as usize);
        for _ in 0..nb_stored {
            tables.push(TableRecordEntry::decode_from(&mut reader));
        }

        let mut page_payload = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut page_payload)
            .expect("io error reading page blob");

        CheckpointRecord {
            horizon,
            txn_blob_a,
            txn_blob_b,
            tables,
            page_payload,
        }
    }
}
