//! # Almacén de Archivos Temporales
//! src/storage/temp_files.rs
//!
//! Guarda una copia de cada archivo subido para que el handler externo
//! pueda leerlo incluso después de que la respuesta HTTP ya se envió.
//!
//! Retención: las entradas viven hasta `clear()` (llamado por
//! `Server::stop`) o hasta que el handler las libera con `release()`.
//! Nada se borra automáticamente al terminar un request.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::TempPath;
use tracing::{debug, warn};

/// Tamaño del buffer de copia
const COPY_BUFFER_SIZE: usize = 8192;

/// Prefijo de los archivos creados por el store
const FILE_PREFIX: &str = "upload-";

/// Almacén thread-safe de archivos temporales
pub struct TempFileStore {
    /// Directorio donde se crean los archivos
    dir: PathBuf,

    /// Archivos vivos; `TempPath` borra el archivo cuando se cierra
    entries: Arc<Mutex<Vec<TempPath>>>,
}

impl TempFileStore {
    /// Crea el store (y su directorio si no existe)
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            entries: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Directorio de trabajo del store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserva un nuevo archivo vacío con nombre único y retorna su ruta
    pub fn create_entry(&self) -> io::Result<PathBuf> {
        let temp = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .tempfile_in(&self.dir)?;

        // Cerrar el handle; el archivo sigue vivo mientras exista el TempPath
        let temp_path = temp.into_temp_path();
        let path = temp_path.to_path_buf();

        self.lock_entries().push(temp_path);
        debug!(path = %path.display(), "Temp file entry created");

        Ok(path)
    }

    /// Copia byte a byte `source` en `dest`
    ///
    /// Ambos archivos se cierran al salir, también en los caminos de error.
    pub fn copy_into(&self, source: &Path, dest: &Path) -> io::Result<u64> {
        let mut input = File::open(source)?;
        let mut output = File::create(dest)?;

        let mut buf = [0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let n = match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            output.write_all(&buf[..n])?;
            total += n as u64;
        }

        output.flush()?;
        Ok(total)
    }

    /// Crea una entrada nueva con el contenido de `source`
    pub fn store_copy(&self, source: &Path) -> io::Result<PathBuf> {
        let dest = self.create_entry()?;
        let bytes = self.copy_into(source, &dest)?;
        debug!(dest = %dest.display(), bytes, "Upload copied into temp store");
        Ok(dest)
    }

    /// Borra una entrada antes del shutdown
    ///
    /// Retorna `false` si la ruta no pertenece al store (o ya se liberó).
    pub fn release(&self, path: &Path) -> bool {
        let entry = {
            let mut entries = self.lock_entries();
            let idx = entries.iter().position(|p| &**p == path);
            idx.map(|idx| entries.swap_remove(idx))
        };

        match entry {
            Some(temp_path) => {
                if let Err(e) = temp_path.close() {
                    warn!(path = %path.display(), error = %e, "Failed to delete released temp file");
                }
                true
            }
            None => false,
        }
    }

    /// Borra todos los archivos del store
    ///
    /// Retorna cuántos se eliminaron. Los fallos se registran y no detienen
    /// la limpieza del resto.
    pub fn clear(&self) -> usize {
        let entries: Vec<TempPath> = self.lock_entries().drain(..).collect();
        let mut removed = 0;

        for temp_path in entries {
            let path = temp_path.to_path_buf();
            match temp_path.close() {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete temp file"),
            }
        }

        debug!(removed, "Temp file store cleared");
        removed
    }

    /// Cantidad de archivos vivos
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<TempPath>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for TempFileStore {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            entries: Arc::clone(&self.entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TempFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TempFileStore::new(dir.path().join("uploads")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_entry_is_unique() {
        let (_dir, store) = store();

        let a = store.create_entry().unwrap();
        let b = store.create_entry().unwrap();

        assert_ne!(a, b);
        assert!(a.exists());
        assert!(a.starts_with(store.dir()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_copy_into_is_byte_identical() {
        let (dir, store) = store();

        // Más grande que el buffer para forzar varias vueltas
        let data: Vec<u8> = (0..COPY_BUFFER_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let source = dir.path().join("source.bin");
        fs::write(&source, &data).unwrap();

        let dest = store.create_entry().unwrap();
        let copied = store.copy_into(&source, &dest).unwrap();

        assert_eq!(copied, data.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_copy_from_missing_source_fails() {
        let (dir, store) = store();
        let dest = store.create_entry().unwrap();

        let result = store.copy_into(&dir.path().join("nope"), &dest);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_clear_removes_everything() {
        let (_dir, store) = store();

        let paths: Vec<PathBuf> = (0..5).map(|_| store.create_entry().unwrap()).collect();
        assert_eq!(store.clear(), 5);

        assert!(store.is_empty());
        for path in paths {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_clear_tolerates_externally_deleted_file() {
        let (_dir, store) = store();

        let gone = store.create_entry().unwrap();
        let kept = store.create_entry().unwrap();
        fs::remove_file(&gone).unwrap();

        assert_eq!(store.clear(), 1);
        assert!(!kept.exists());
    }

    #[test]
    fn test_release_single_entry() {
        let (_dir, store) = store();

        let a = store.create_entry().unwrap();
        let b = store.create_entry().unwrap();

        assert!(store.release(&a));
        assert!(!a.exists());
        assert!(b.exists());

        // Segunda vez: ya no pertenece al store
        assert!(!store.release(&a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let (_dir, store) = store();
        let other = store.clone();

        let path = store.create_entry().unwrap();
        assert_eq!(other.clear(), 1);
        assert!(!path.exists());
    }
}
