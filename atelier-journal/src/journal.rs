use atelier_core::error::{MarketError, MarketResult};
use atelier_core::events::{EventRecord, EventSubscriber};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DIGEST_LEN: usize = 32;

/// Largest payload a frame may carry
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Append-only, file-backed event journal.
///
/// Each record is written as one frame:
/// `[u64 LE payload length][BLAKE3 digest of payload][bincode payload]`.
/// Payloads are limited to [`MAX_FRAME_LEN`] bytes.
pub struct FileEventJournal {
    /// Path to the journal file
    path: PathBuf,

    /// File handle for appending
    file: Mutex<BufWriter<File>>,
}

impl FileEventJournal {
    /// Open (or create) a journal at `path`, appending after existing frames
    pub fn open(path: &Path) -> MarketResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                MarketError::Journal(format!("Failed to open journal {}: {}", path.display(), e))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and flush it to the file
    pub fn append(&self, record: &EventRecord) -> MarketResult<()> {
        let payload = bincode::serialize(record)?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(MarketError::Journal(format!(
                "Event #{} encodes to {} bytes, above the {} byte frame limit",
                record.sequence,
                payload.len(),
                MAX_FRAME_LEN
            )));
        }
        let digest = blake3::hash(&payload);

        let mut file = self
            .file
            .lock()
            .map_err(|e| MarketError::poisoned("journal", e))?;

        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(digest.as_bytes())?;
        file.write_all(&payload)?;
        file.flush()?;

        debug!(
            "Journaled {} event #{} to {}",
            record.event.name(),
            record.sequence,
            self.path.display()
        );
        Ok(())
    }

    /// Replay every frame in the journal, oldest first
    pub fn records(&self) -> MarketResult<JournalIterator> {
        let file = File::open(&self.path)?;
        Ok(JournalIterator {
            reader: BufReader::new(file),
            finished: false,
        })
    }
}

impl EventSubscriber for FileEventJournal {
    fn on_event(&self, record: &EventRecord) -> MarketResult<()> {
        self.append(record)
    }
}

/// Iterator over journal frames.
///
/// Stops after the first error: a corrupt frame makes the position of every
/// following frame unreliable.
pub struct JournalIterator {
    reader: BufReader<File>,
    finished: bool,
}

impl JournalIterator {
    fn read_frame(&mut self) -> Option<MarketResult<EventRecord>> {
        let mut len_buf = [0u8; 8];
        match self.reader.read_exact(&mut len_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // End of file
                return None;
            }
            Err(e) => return Some(Err(MarketError::from(e))),
        }

        let mut digest = [0u8; DIGEST_LEN];
        if let Err(e) = self.reader.read_exact(&mut digest) {
            return Some(Err(MarketError::from(e)));
        }

        let payload_len = match usize::try_from(u64::from_le_bytes(len_buf)) {
            Ok(len) if len <= MAX_FRAME_LEN => len,
            _ => {
                return Some(Err(MarketError::Journal(format!(
                    "Frame length {} exceeds the {} byte limit",
                    u64::from_le_bytes(len_buf),
                    MAX_FRAME_LEN
                ))))
            }
        };
        let mut payload = vec![0u8; payload_len];
        if let Err(e) = self.reader.read_exact(&mut payload) {
            return Some(Err(MarketError::from(e)));
        }

        if blake3::hash(&payload) != blake3::Hash::from(digest) {
            return Some(Err(MarketError::Journal(
                "Frame checksum mismatch".to_string(),
            )));
        }

        Some(bincode::deserialize(&payload).map_err(MarketError::from))
    }
}

impl Iterator for JournalIterator {
    type Item = MarketResult<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.read_frame();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}
