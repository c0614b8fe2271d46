mod data_url;

pub use data_url::{DataUrlError, ImagePayload, DEFAULT_IMAGE_MIME};
