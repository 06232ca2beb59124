use std::{
    collections::BTreeSet,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDate, NaiveDateTime};
use flate2::{write::GzEncoder, Compression};
use log::{debug, info};

use crate::{
    config::{Paths, RefFilter},
    field::Field,
};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O failure on {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("invalid extraction file pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to read an extraction file path")]
    Glob(#[from] glob::GlobError),
    #[error("{0:?} is not a valid UTF-8 path")]
    NonUtf8(PathBuf),
    #[error("all the time-stamped directory names {0:?}_1 to _99 are taken")]
    TimestampExhausted(PathBuf),
    #[error("failed to write the outcomes table")]
    Csv(#[from] csv::Error),
    #[error("failed to write the manifest")]
    Json(#[from] serde_json::Error),
}
type Result<T> = std::result::Result<T, ArchiveError>;

trait IoContext<T> {
    fn context<P: AsRef<Path>>(self, path: P) -> Result<T>;
}
impl<T> IoContext<T> for io::Result<T> {
    fn context<P: AsRef<Path>>(self, path: P) -> Result<T> {
        self.map_err(|e| ArchiveError::Io(e, path.as_ref().to_path_buf()))
    }
}

/// Patterns of the extraction, stacking and fitting products
pub const PRODUCT_PATTERNS: [&str; 3] = ["*1D*", "*2D*", "*stack*"];

/// Name of an extraction set: the magnitude limit if one is given, the catalog name otherwise
pub fn archive_basename(catalog_name: &str, mag_lim: Option<f64>) -> String {
    match mag_lim {
        Some(mag_lim) => format!("maglim{mag_lim}"),
        None => catalog_name.to_string(),
    }
}

/// Extraction products moved into an archive directory
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveDir {
    pub field: String,
    pub basename: String,
    pub ref_filter: RefFilter,
    pub dir: PathBuf,
    pub moved: Vec<PathBuf>,
}

/// Moves the products out of the working directory into
/// `<extractions>/<field>/<basename>_<ref filter>_<YYYY-MM-DD>/` and tars them
///
/// Nothing is rolled back if a move fails midway.
#[derive(Debug, Clone)]
pub struct Archiver {
    extractions: PathBuf,
    workdir: PathBuf,
}
impl Archiver {
    pub fn new<P: AsRef<Path>>(extractions: P, workdir: P) -> Self {
        Self {
            extractions: extractions.as_ref().to_path_buf(),
            workdir: workdir.as_ref().to_path_buf(),
        }
    }
    pub fn from_paths(paths: &Paths) -> Self {
        Self::new(&paths.extractions, &paths.outputs)
    }
    /// Product files in the working directory, each listed once
    pub fn products(&self) -> Result<Vec<PathBuf>> {
        let dir = self
            .workdir
            .to_str()
            .ok_or_else(|| ArchiveError::NonUtf8(self.workdir.clone()))?;
        let dir = glob::Pattern::escape(dir);
        let mut files = BTreeSet::new();
        for pattern in PRODUCT_PATTERNS {
            let pattern = format!("{}/{pattern}", dir);
            for path in glob::glob(&pattern)? {
                let path = path?;
                if path.is_file() {
                    files.insert(path);
                }
            }
        }
        Ok(files.into_iter().collect())
    }
    pub fn target_dir(
        &self,
        field: &Field,
        basename: &str,
        ref_filter: RefFilter,
        date: NaiveDate,
    ) -> PathBuf {
        self.extractions.join(field.name()).join(format!(
            "{basename}_{ref_filter}_{}",
            date.format("%Y-%m-%d")
        ))
    }
    /// Moves the products into the archive directory of the given date
    pub fn collect(
        &self,
        field: &Field,
        basename: &str,
        ref_filter: RefFilter,
        date: NaiveDate,
    ) -> Result<ArchiveDir> {
        let files = self.products()?;
        let dir = self.target_dir(field, basename, ref_filter, date);
        fs::create_dir_all(&dir).context(&dir)?;
        info!(
            "Moving {} extractions from {basename} to {dir:?}",
            files.len()
        );
        let mut moved = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let to = dir.join(name);
            move_file(&file, &to).context(&file)?;
            debug!("{file:?} -> {to:?}");
            moved.push(to);
        }
        Ok(ArchiveDir {
            field: field.to_string(),
            basename: basename.to_string(),
            ref_filter,
            dir,
            moved,
        })
    }
    /// Path of the tarball of an archive directory
    pub fn tarball(&self, archive: &ArchiveDir) -> PathBuf {
        self.extractions.join(&archive.field).join(format!(
            "{}_extractions_{}_{}_plus.tar.gz",
            archive.field, archive.basename, archive.ref_filter
        ))
    }
    /// Writes the content of the archive directory into a gzipped tarball next to it
    pub fn compress(&self, archive: &ArchiveDir) -> Result<PathBuf> {
        let tarball = self.tarball(archive);
        let file = File::create(&tarball).context(&tarball)?;
        let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        tar.append_dir_all(".", &archive.dir).context(&archive.dir)?;
        tar.into_inner()
            .and_then(|gz| gz.finish())
            .context(&tarball)?;
        info!("Archived {:?}", tarball);
        Ok(tarball)
    }
    /// Moves today's products into their archive directory and tars it
    pub fn archive(
        &self,
        field: &Field,
        basename: &str,
        ref_filter: RefFilter,
    ) -> Result<(ArchiveDir, PathBuf)> {
        let archive = self.collect(field, basename, ref_filter, Local::now().date_naive())?;
        let tarball = self.compress(&archive)?;
        Ok((archive, tarball))
    }
}

/// Renames `from` into `to`, copying and removing across file systems
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

/// Creates the time-stamped directory `<dest>/YYYY.MM.DD.hh:mm:ss`
///
/// If it already exists, `_1` up to `_99` is appended to the name.
pub fn make_timestamp_dir<P: AsRef<Path>>(dest: P) -> Result<PathBuf> {
    make_timestamp_dir_at(dest, Local::now().naive_local())
}
/// Creates the time-stamped directory for the given time
pub fn make_timestamp_dir_at<P: AsRef<Path>>(dest: P, time: NaiveDateTime) -> Result<PathBuf> {
    let dest = dest.as_ref();
    fs::create_dir_all(dest).context(dest)?;
    let path = dest.join(time.format("%Y.%m.%d.%H:%M:%S").to_string());
    let mut name = path.clone().into_os_string();
    for num in 0..100 {
        if num > 0 {
            name = path.clone().into_os_string();
            name.push(format!("_{num}"));
        }
        match fs::create_dir(&name) {
            Ok(()) => return Ok(PathBuf::from(name)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(ArchiveError::Io(e, name.into())),
        }
    }
    Err(ArchiveError::TimestampExhausted(path))
}

#[cfg(test)]
mod tests {
    use std::{error::Error, io::Read};

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn basename() {
        assert_eq!(archive_basename("emitters", None), "emitters");
        assert_eq!(archive_basename("maglim", Some(26.)), "maglim26");
        assert_eq!(archive_basename("z3", Some(25.5)), "maglim25.5");
    }

    #[test]
    fn moves_products_only() -> std::result::Result<(), Box<dyn Error>> {
        let workdir = tempfile::tempdir()?;
        let extractions = tempfile::tempdir()?;
        for name in ["a.1D.x", "b.2D.y", "c.stack.z", "d.other", "e.2D.stack.png"] {
            fs::write(workdir.path().join(name), name)?;
        }
        let archiver = Archiver::new(extractions.path(), workdir.path());
        let field = Field::new("GS5")?;
        let date = NaiveDate::from_ymd_opt(2017, 8, 14).ok_or("bad date")?;
        let archive = archiver.collect(&field, "maglim26", RefFilter::F125W, date)?;
        let dir = extractions.path().join("GS5").join("maglim26_F125W_2017-08-14");
        assert_eq!(archive.dir, dir);
        for name in ["a.1D.x", "b.2D.y", "c.stack.z", "e.2D.stack.png"] {
            assert!(dir.join(name).is_file(), "{name}");
            assert!(!workdir.path().join(name).exists(), "{name}");
        }
        assert_eq!(archive.moved.len(), 4);
        assert!(workdir.path().join("d.other").is_file());
        assert!(!dir.join("d.other").exists());
        Ok(())
    }

    #[test]
    fn tarball_next_to_archive() -> std::result::Result<(), Box<dyn Error>> {
        let workdir = tempfile::tempdir()?;
        let extractions = tempfile::tempdir()?;
        fs::write(workdir.path().join("GS5-13-000-G102_00312.2D.fits"), b"2D")?;
        let archiver = Archiver::new(extractions.path(), workdir.path());
        let (archive, tarball) =
            archiver.archive(&Field::new("GS5")?, "emitters", RefFilter::F105W)?;
        assert_eq!(
            tarball,
            extractions
                .path()
                .join("GS5")
                .join("GS5_extractions_emitters_F105W_plus.tar.gz")
        );
        assert_eq!(archive.dir.parent(), tarball.parent());
        let mut tar = tar::Archive::new(GzDecoder::new(File::open(&tarball)?));
        let mut found = false;
        for entry in tar.entries()? {
            let mut entry = entry?;
            if entry.path()?.ends_with("GS5-13-000-G102_00312.2D.fits") {
                let mut contents = String::new();
                entry.read_to_string(&mut contents)?;
                assert_eq!(contents, "2D");
                found = true;
            }
        }
        assert!(found);
        Ok(())
    }

    #[test]
    fn timestamp_dirs_are_unique() -> std::result::Result<(), Box<dyn Error>> {
        let dest = tempfile::tempdir()?;
        let time = NaiveDate::from_ymd_opt(2017, 8, 14)
            .and_then(|d| d.and_hms_opt(9, 5, 3))
            .ok_or("bad time")?;
        let first = make_timestamp_dir_at(dest.path(), time)?;
        let second = make_timestamp_dir_at(dest.path(), time)?;
        assert_eq!(first, dest.path().join("2017.08.14.09:05:03"));
        assert_eq!(second, dest.path().join("2017.08.14.09:05:03_1"));
        assert!(first.is_dir() && second.is_dir());
        Ok(())
    }

    #[test]
    fn timestamp_dirs_run_out() -> std::result::Result<(), Box<dyn Error>> {
        let dest = tempfile::tempdir()?;
        let time = NaiveDate::from_ymd_opt(2017, 8, 14)
            .and_then(|d| d.and_hms_opt(9, 5, 3))
            .ok_or("bad time")?;
        for _ in 0..100 {
            make_timestamp_dir_at(dest.path(), time)?;
        }
        assert!(matches!(
            make_timestamp_dir_at(dest.path(), time),
            Err(ArchiveError::TimestampExhausted(_))
        ));
        Ok(())
    }
}
