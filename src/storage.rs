//! Image access: the scoped image session and a directory backed store.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::hal::Storage;
use crate::protocol::BLOCK_SIZE;

/// Open image `name`, check it fits in `max_size` bytes, and run `f` with
/// its handle and size. The handle is closed on every path.
pub fn with_image<S, T, F>(storage: &mut S, name: &str, max_size: u64, f: F) -> Result<T, Error>
where
    S: Storage,
    F: FnOnce(&mut S, &mut S::Handle, u64) -> Result<T, Error>,
{
    let mut handle = match storage.open(name) {
        Ok(Some(h)) => h,
        Ok(None) => {
            error!("Image not found: {}", name);
            return Err(Error::FileNotFound);
        }
        Err(e) => {
            error!("Failed to open image {}: {:?}", name, e);
            return Err(Error::CannotOpenFile);
        }
    };

    let result = check_size(storage, &handle, max_size)
        .and_then(|size| f(storage, &mut handle, size));

    storage.close(handle);

    result
}

fn check_size<S: Storage>(storage: &mut S, handle: &S::Handle, max_size: u64) -> Result<u64, Error> {
    let size = storage.size(handle).map_err(|e| {
        error!("Failed to query image size: {:?}", e);
        Error::Unknown
    })?;
    info!("Found image, size: {} bytes", size);

    if size == 0 {
        error!("Image is empty");
        return Err(Error::FileEmpty);
    }
    if size > max_size {
        error!("Image too large: {} bytes (max: {})", size, max_size);
        return Err(Error::FileTooLarge { size, max: max_size });
    }

    Ok(size)
}

/// Fill `block` from the image's current position, returning the number of
/// bytes read; 0 at the end of the image
pub fn read_block<S: Storage>(
    storage: &mut S,
    handle: &mut S::Handle,
    block: &mut [u8; BLOCK_SIZE],
) -> Result<usize, S::Error> {
    let mut n = 0;
    while n < BLOCK_SIZE {
        match storage.read(handle, &mut block[n..])? {
            0 => break,
            r => n += r,
        }
    }
    Ok(n)
}

/// Images stored as files in a directory
pub struct DirStorage {
    base: PathBuf,
}

impl DirStorage {
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }
}

impl Storage for DirStorage {
    type Error = io::Error;
    type Handle = File;

    fn mount(&mut self) -> Result<(), Self::Error> {
        let meta = std::fs::metadata(&self.base)?;
        if !meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", self.base.display()),
            ));
        }
        debug!("Image store at {}", self.base.display());
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<Option<Self::Handle>, Self::Error> {
        match File::open(self.base.join(name)) {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn size(&mut self, handle: &Self::Handle) -> Result<u64, Self::Error> {
        Ok(handle.metadata()?.len())
    }

    fn read(&mut self, handle: &mut Self::Handle, buff: &mut [u8]) -> Result<usize, Self::Error> {
        handle.read(buff)
    }

    fn rewind(&mut self, handle: &mut Self::Handle) -> Result<(), Self::Error> {
        handle.seek(SeekFrom::Start(0)).map(|_| ())
    }

    fn close(&mut self, handle: Self::Handle) {
        drop(handle);
    }
}
