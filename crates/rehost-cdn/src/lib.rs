//! Image hosting for the rehost migration.
//!
//! The [`ImageHost`] trait is what the migration worker uploads through.
//! [`CloudinaryClient`] implements it with signed multipart uploads.

mod cloudinary;
mod error;
mod host;

pub use cloudinary::{CLOUDINARY_API_URL, CloudinaryClient, CloudinaryCredentials, sign, string_to_sign};
pub use error::HostError;
pub use host::{ImageHost, UploadOptions, UploadedImage};
