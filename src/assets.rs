//! Image loading for the sign appendix.
//!
//! Images are read and decoded once per document, deduplicated by the SHA-256
//! of their bytes, and kept in a form both backends can emit directly.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::GenericImageView;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum AssetError {
    NotFound(PathBuf),
    Unreadable { path: PathBuf, source: std::io::Error },
    Undecodable { path: PathBuf, reason: String },
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotFound(path) => write!(f, "image not found: {}", path.display()),
            AssetError::Unreadable { path, source } => {
                write!(f, "image unreadable: {}: {}", path.display(), source)
            }
            AssetError::Undecodable { path, reason } => {
                write!(f, "image undecodable: {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::Unreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Reference to a decoded image held by an [`ImageStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl ImageHandle {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// Soft mask plane of an image with transparency.
#[derive(Debug, Clone)]
pub struct AlphaPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Pixel payload in PDF image XObject terms.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub bits_per_component: u8,
    pub filter: &'static str,
    pub data: Vec<u8>,
    pub alpha: Option<AlphaPlane>,
}

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub handle: ImageHandle,
    pub mime: &'static str,
    /// Original file bytes, embedded as a data URI by the HTML backend.
    pub source: Vec<u8>,
    pub pdf: ImageData,
}

#[derive(Debug, Default)]
pub struct ImageStore {
    by_digest: HashMap<[u8; 32], usize>,
    images: Vec<StoredImage>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_image(&mut self, path: &Path) -> Result<ImageHandle, AssetError> {
        let bytes = std::fs::read(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(path.to_path_buf()),
            _ => AssetError::Unreadable {
                path: path.to_path_buf(),
                source: err,
            },
        })?;
        self.insert_bytes(path, bytes)
    }

    fn insert_bytes(&mut self, path: &Path, bytes: Vec<u8>) -> Result<ImageHandle, AssetError> {
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        if let Some(&index) = self.by_digest.get(&digest) {
            return Ok(self.images[index].handle.clone());
        }
        let (mime, pdf) = decode_image_bytes(&bytes).map_err(|reason| AssetError::Undecodable {
            path: path.to_path_buf(),
            reason,
        })?;
        let handle = ImageHandle {
            id: format!("Im{}", self.images.len() + 1),
            width: pdf.width,
            height: pdf.height,
        };
        self.by_digest.insert(digest, self.images.len());
        self.images.push(StoredImage {
            handle: handle.clone(),
            mime,
            source: bytes,
            pdf,
        });
        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Option<&StoredImage> {
        self.images.iter().find(|image| image.handle.id == id)
    }

    pub fn images(&self) -> &[StoredImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// JPEG passes through as DCT data; anything else becomes flate-compressed
/// RGB with an optional alpha plane.
fn decode_image_bytes(data: &[u8]) -> Result<(&'static str, ImageData), String> {
    let format = image::guess_format(data).map_err(|err| err.to_string())?;
    let decoded = image::load_from_memory(data).map_err(|err| err.to_string())?;
    let (width, height) = decoded.dimensions();

    if format == image::ImageFormat::Jpeg {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "/DeviceGray",
            _ => "/DeviceRGB",
        };
        return Ok((
            "image/jpeg",
            ImageData {
                width,
                height,
                color_space,
                bits_per_component: 8,
                filter: "/DCTDecode",
                data: data.to_vec(),
                alpha: None,
            },
        ));
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    let alpha = alpha.iter().any(|&a| a != 255).then(|| AlphaPlane {
        width,
        height,
        data: flate_compress(&alpha),
    });
    Ok((
        "image/png",
        ImageData {
            width,
            height,
            color_space: "/DeviceRGB",
            bits_per_component: 8,
            filter: "/FlateDecode",
            data: flate_compress(&rgb),
            alpha,
        },
    ))
}

pub(crate) fn flate_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn missing_file_is_not_found() {
        let mut store = ImageStore::new();
        let err = store
            .load_image(Path::new("/nonexistent/cartello.jpg"))
            .expect_err("missing");
        assert!(matches!(err, AssetError::NotFound(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_bytes_are_undecodable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rotto.png");
        std::fs::write(&path, b"not an image").expect("write");
        let mut store = ImageStore::new();
        let err = store.load_image(&path).expect_err("corrupt");
        assert!(matches!(err, AssetError::Undecodable { .. }));
    }

    #[test]
    fn identical_images_share_one_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bytes = png_bytes(4, 2, [200, 10, 10, 255]);
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        std::fs::write(&first, &bytes).expect("write");
        std::fs::write(&second, &bytes).expect("write");

        let mut store = ImageStore::new();
        let a = store.load_image(&first).expect("load a");
        let b = store.load_image(&second).expect("load b");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!((a.width, a.height), (4, 2));
        assert!((a.aspect_ratio() - 2.0).abs() < f32::EPSILON);

        let stored = store.get(&a.id).expect("stored");
        assert_eq!(stored.mime, "image/png");
        assert_eq!(stored.pdf.filter, "/FlateDecode");
        assert!(stored.pdf.alpha.is_none());
    }

    #[test]
    fn transparency_produces_a_soft_mask() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trasparente.png");
        std::fs::write(&path, png_bytes(2, 2, [0, 0, 0, 128])).expect("write");
        let mut store = ImageStore::new();
        let handle = store.load_image(&path).expect("load");
        assert!(store.get(&handle.id).and_then(|s| s.pdf.alpha.as_ref()).is_some());
    }
}
