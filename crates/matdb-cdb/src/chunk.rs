//! Chunk framing: `tag[4]`, `size: u32`, then `size` body bytes.

use matdb_common::ChunkReader;

use crate::error::{Error, Result};

pub const BETH: [u8; 4] = *b"BETH";
pub const STRT: [u8; 4] = *b"STRT";
pub const TYPE: [u8; 4] = *b"TYPE";
pub const CLAS: [u8; 4] = *b"CLAS";
pub const LIST: [u8; 4] = *b"LIST";
pub const MAPC: [u8; 4] = *b"MAPC";
pub const OBJT: [u8; 4] = *b"OBJT";
pub const DIFF: [u8; 4] = *b"DIFF";
pub const USER: [u8; 4] = *b"USER";
pub const USRD: [u8; 4] = *b"USRD";

/// Highest `BETH` version this reader understands.
pub const MAX_VERSION: u32 = 4;

/// One framed chunk.
#[derive(Debug, Clone)]
pub(crate) struct Chunk<'a> {
    pub tag: [u8; 4],
    /// Absolute offset of the chunk header.
    pub offset: usize,
    pub body: ChunkReader<'a>,
}

impl Chunk<'_> {
    pub fn tag_name(&self) -> String {
        tag_name(&self.tag)
    }
}

pub(crate) fn tag_name(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Sequential reader of top-level chunks.
#[derive(Debug)]
pub(crate) struct ChunkStream<'a> {
    reader: ChunkReader<'a>,
    done: bool,
}

impl<'a> ChunkStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ChunkReader::new(data, 0),
            done: false,
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.reader.offset()
    }

    /// Read the next chunk; `None` at end of buffer or at a zero tag.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>> {
        if self.done || self.reader.remaining() < 4 {
            self.done = true;
            return Ok(None);
        }
        let offset = self.reader.offset();
        let tag = self.reader.read_tag()?;
        if tag == [0; 4] {
            self.done = true;
            return Ok(None);
        }
        let size = self.reader.read_u32()? as usize;
        let body = self.reader.sub_reader(size)?;
        Ok(Some(Chunk { tag, offset, body }))
    }

    /// Read the next chunk, requiring one of `tags`.
    pub fn expect_chunk(&mut self, tags: &[[u8; 4]], expected: &'static str) -> Result<Chunk<'a>> {
        let offset = self.offset();
        match self.next_chunk()? {
            Some(chunk) if tags.contains(&chunk.tag) => Ok(chunk),
            Some(chunk) => Err(Error::UnexpectedChunk {
                offset: chunk.offset,
                expected,
                found: chunk.tag_name(),
            }),
            None => Err(Error::UnexpectedChunk {
                offset,
                expected,
                found: "end of stream".to_string(),
            }),
        }
    }
}
