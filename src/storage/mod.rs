//! # Almacenamiento
//!
//! Persistencia de los archivos subidos mientras el servidor vive.

pub mod temp_files;

pub use temp_files::TempFileStore;
