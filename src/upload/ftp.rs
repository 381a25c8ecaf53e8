//! Server-side FTP import status

use crate::api::FtpFile;

#[derive(Debug, Default, Clone)]
pub struct FtpImport {
    active: bool,
    pending: usize,
    processed: Vec<FtpFile>,
}

impl FtpImport {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn processed(&self) -> &[FtpFile] {
        &self.processed
    }

    /// Begin an import of `files` files. Returns false when the server found
    /// nothing to import.
    pub fn start(&mut self, files: usize) -> bool {
        if files == 0 {
            return false;
        }
        self.active = true;
        self.pending = files;
        self.processed.clear();
        true
    }

    pub fn file_processed(&mut self, file: FtpFile) {
        self.pending = self.pending.saturating_sub(1);
        self.processed.push(file);
    }

    pub fn finish(&mut self) {
        self.active = false;
        self.pending = 0;
    }

    pub fn failed(&self) -> impl Iterator<Item = &FtpFile> {
        self.processed.iter().filter(|f| !f.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processed(name: &str, success: bool) -> FtpFile {
        FtpFile {
            file_name: name.to_string(),
            key: if success { String::new() } else { "bad_file".to_string() },
            success,
        }
    }

    #[test]
    fn test_import_lifecycle() {
        let mut ftp = FtpImport::default();
        assert!(ftp.start(2));
        ftp.file_processed(processed("a.mp3", true));
        ftp.file_processed(processed("b.mp3", false));
        assert_eq!(ftp.pending(), 0);
        assert_eq!(ftp.failed().count(), 1);

        ftp.finish();
        assert!(!ftp.is_active());
        assert_eq!(ftp.processed().len(), 2);

        assert!(ftp.start(1));
        assert!(ftp.processed().is_empty());
    }

    #[test]
    fn test_empty_import_does_not_start() {
        let mut ftp = FtpImport::default();
        assert!(!ftp.start(0));
        assert!(!ftp.is_active());
    }
}
