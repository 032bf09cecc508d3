use base64::{ engine::general_purpose::STANDARD, Engine as _ };
use log::{ debug, warn };
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;

const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Base64 text of an uploaded image, ready to embed in a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        EncodedImage(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Encodes every present blob, skipping `None` entries and keeping order.
pub fn images_to_base64<I, B>(images: I) -> Vec<EncodedImage>
    where I: IntoIterator<Item = Option<B>>, B: AsRef<[u8]>
{
    images
        .into_iter()
        .flatten()
        .map(|blob| EncodedImage::from_bytes(blob.as_ref()))
        .collect()
}

/// Reads image files from disk. Unreadable or unsupported files become `None`.
pub fn load_images<P: AsRef<Path>>(paths: &[P]) -> Vec<Option<Vec<u8>>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false);
            if !supported {
                warn!("Skipping '{}': only jpg, jpeg and png images are accepted", path.display());
                return None;
            }
            match fs::read(path) {
                Ok(bytes) => {
                    debug!("Loaded image '{}' ({} bytes)", path.display(), bytes.len());
                    Some(bytes)
                }
                Err(e) => {
                    warn!("Failed to read image '{}': {}", path.display(), e);
                    None
                }
            }
        })
        .collect()
}
