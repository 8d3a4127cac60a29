use crate::error::{ClassifierError, Result};
use image::{DynamicImage, ImageReader};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

// EXIF lives in the first segments of the file.
const EXIF_HEADER_BYTES: u64 = 128 * 1024;

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `path`, sorted by name. Hidden files are skipped.
pub fn list_image_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Err(ClassifierError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", path.display()),
        )));
    }

    let mut images = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let path = entry.path();
        if is_file && !hidden && is_image_file(&path) {
            images.push(path);
        }
    }

    images.sort();
    Ok(images)
}

/// Decodes an image file and applies its EXIF orientation.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let context = path.display().to_string();
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|source| ClassifierError::ImageDecode {
            context: context.clone(),
            source,
        })?;

    let orientation = read_orientation(path);
    Ok(apply_orientation(img, orientation))
}

/// Decodes an in-memory upload. Orientation is honoured when the bytes carry EXIF.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()
        .map_err(|source| ClassifierError::ImageDecode {
            context: format!("({} bytes)", bytes.len()),
            source,
        })?;

    let orientation = orientation_from_container(&mut Cursor::new(bytes));
    Ok(apply_orientation(img, orientation))
}

/// EXIF orientation tag of the file, 1 when absent or unreadable.
fn read_orientation(path: &Path) -> u32 {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return 1,
    };

    let mut header_buf = Vec::with_capacity(EXIF_HEADER_BYTES as usize);
    if file.take(EXIF_HEADER_BYTES).read_to_end(&mut header_buf).is_err() {
        return 1;
    }
    orientation_from_container(&mut Cursor::new(&header_buf))
}

fn orientation_from_container<R: std::io::BufRead + std::io::Seek>(reader: &mut R) -> u32 {
    let exif = match exif::Reader::new().read_from_container(reader) {
        Ok(e) => e,
        Err(_) => return 1,
    };

    match exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        Some(field) => match field.value {
            exif::Value::Short(ref v) => v.first().map(|&o| o as u32).unwrap_or(1),
            exif::Value::Long(ref v) => v.first().copied().unwrap_or(1),
            _ => 1,
        },
        None => 1,
    }
}

pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate90(),
        6 => img.rotate90(),
        7 => img.fliph().rotate270(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Folder name for a label: anything outside `[A-Za-z0-9 _-]` becomes `_`.
pub fn label_folder_name(label: &str) -> String {
    let name: String = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim();
    if name.is_empty() {
        "_".to_string()
    } else {
        name.to_string()
    }
}

/// Moves (or copies) `file` into `<base>/<label folder>/`, returning the new path.
/// An existing file at the destination is never replaced; the new one is filed as
/// `name (1).ext`, `name (2).ext` and so on.
pub fn file_into_label_folder(file: &Path, base: &Path, label: &str, copy: bool) -> Result<PathBuf> {
    let dest_dir = base.join(label_folder_name(label));
    std::fs::create_dir_all(&dest_dir)?;

    let file_name = file.file_name().ok_or_else(|| {
        ClassifierError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("no file name: {}", file.display()),
        ))
    })?;
    let dest_path = free_destination(&dest_dir, Path::new(file_name))?;

    if copy {
        std::fs::copy(file, &dest_path)?;
    } else {
        std::fs::rename(file, &dest_path)?;
    }
    Ok(dest_path)
}

fn free_destination(dir: &Path, file_name: &Path) -> Result<PathBuf> {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 1..10_000 {
        let candidate = dir.join(format!("{stem} ({n}){ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(ClassifierError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for {} in {}", file_name.display(), dir.display()),
    )))
}
