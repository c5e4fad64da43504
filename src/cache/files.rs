//! The index + data file pair behind each cache.

use std::fs;
use std::path::{Path, PathBuf};

use super::{CacheError, CacheResult};
use crate::stream::{Record, RecordStream, SeekOrigin, StreamError};

/// An open index file and its companion data file.
#[derive(Debug)]
pub(crate) struct CacheFiles {
    index_path: PathBuf,
    index: RecordStream,
    data: RecordStream,
}

impl CacheFiles {
    /// Create `dir` if needed, then open (or create) both files.
    ///
    /// A new index gets the `version` byte; an existing one must start with it.
    pub(crate) fn open(dir: &Path, index_name: &str, data_name: &str, version: u8) -> CacheResult<Self> {
        fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let index_path = dir.join(index_name);
        let mut index = RecordStream::new(&index_path);
        index.open()?;
        if index.size()? == 0 {
            index.write_u8(version)?;
            index.sync()?;
        } else {
            index.seek(SeekOrigin::Start)?;
            let found = index.read_u8()?;
            if found != version {
                return Err(CacheError::VersionMismatch {
                    found,
                    expected: version,
                });
            }
        }

        let mut data = RecordStream::new(dir.join(data_name));
        data.open()?;

        Ok(Self {
            index_path,
            index,
            data,
        })
    }

    /// Read every index record after the version byte.
    pub(crate) fn replay<I: Record>(&mut self) -> CacheResult<Vec<I>> {
        self.index.seek(SeekOrigin::Set(1))?;
        let mut records = Vec::new();
        while !self.index.at_end()? {
            match self.index.read_record::<I>() {
                Ok(record) => records.push(record),
                Err(StreamError::UnexpectedEof) => {
                    return Err(CacheError::Truncated(self.index_path.clone()))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(records)
    }

    /// Current length of the data file.
    pub(crate) fn data_len(&mut self) -> CacheResult<u64> {
        Ok(self.data.size()?)
    }

    /// Append a payload, then the index record pointing at it.
    ///
    /// Both files are synced, the data file first. An index record never
    /// points at a payload that is not on disk.
    pub(crate) fn append<I, D>(&mut self, data: &D, index_for: impl FnOnce(i64) -> I) -> CacheResult<i64>
    where
        I: Record,
        D: Record,
    {
        let offset = self.data.seek(SeekOrigin::End)? as i64;
        self.data.write_record(data)?;
        self.data.sync()?;

        self.index.seek(SeekOrigin::End)?;
        self.index.write_record(&index_for(offset))?;
        self.index.sync()?;
        Ok(offset)
    }

    /// Read the payload stored at `offset`.
    pub(crate) fn read<D: Record>(&mut self, offset: i64) -> CacheResult<D> {
        let offset = u64::try_from(offset)
            .map_err(|_| StreamError::Corrupt(format!("negative offset {}", offset)))?;
        self.data.seek(SeekOrigin::Set(offset))?;
        Ok(self.data.read_record()?)
    }
}
