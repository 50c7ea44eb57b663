//! Dimension probing from format headers.
//!
//! Reads only as much of the stream as the format's header needs; the raster
//! is never decoded. A stream no codec recognizes is a normal negative result
//! (`Ok(None)`), which is how uploads are classified as image or generic file.
//! Only a failing reader is an error.

use crate::types::Dimensions;
use image::{ImageError, ImageFormat, ImageReader};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// Probe a seekable stream.
pub fn probe_reader<R: BufRead + Seek>(reader: R) -> io::Result<Option<Dimensions>> {
    let reader = ImageReader::new(reader).with_guessed_format()?;
    match reader.format() {
        Some(ImageFormat::Avif) => probe_avif(reader.into_inner()),
        Some(_) => match reader.into_dimensions() {
            Ok((width, height)) => Ok(known(width, height)),
            Err(ImageError::IoError(e)) if e.kind() != io::ErrorKind::UnexpectedEof => Err(e),
            Err(_) => Ok(None),
        },
        None => {
            let mut inner = reader.into_inner();
            if sniff_avif(&mut inner)? {
                probe_avif(inner)
            } else {
                Ok(None)
            }
        }
    }
}

/// Probe a file on disk.
pub fn probe_file(path: &Path) -> io::Result<Option<Dimensions>> {
    probe_reader(BufReader::new(File::open(path)?))
}

/// Probe an in-memory buffer.
pub fn probe_bytes(bytes: &[u8]) -> Option<Dimensions> {
    // A cursor never fails to read.
    probe_reader(Cursor::new(bytes)).ok().flatten()
}

/// Whether `bytes` is an image any registered codec recognizes.
pub fn is_image(bytes: &[u8]) -> bool {
    probe_bytes(bytes).is_some()
}

fn known(width: u32, height: u32) -> Option<Dimensions> {
    let dims = Dimensions::new(width, height);
    dims.is_known().then_some(dims)
}

/// ISO-BMFF `ftyp` box with an AVIF brand.
fn sniff_avif<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    reader.seek(SeekFrom::Start(0))?;
    let mut head = [0u8; 12];
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }
    Ok(&head[4..8] == b"ftyp" && matches!(&head[8..12], b"avif" | b"avis"))
}

fn probe_avif<R: Read + Seek>(mut reader: R) -> io::Result<Option<Dimensions>> {
    reader.seek(SeekFrom::Start(0))?;
    let Ok(avif) = avif_parse::read_avif(&mut reader) else {
        return Ok(None);
    };
    let Ok(meta) = avif.primary_item_metadata() else {
        return Ok(None);
    };
    Ok(known(meta.max_frame_width.get(), meta.max_frame_height.get()))
}
