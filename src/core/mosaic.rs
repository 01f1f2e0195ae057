//! On-disk layout of an ImageMosaic: time-stamped granules plus the property
//! files GeoServer uses to index them by time.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::debug;
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const INDEXER_FILE: &str = "indexer.properties";
pub const TIMEREGEX_FILE: &str = "timeregex.properties";

const INDEXER: &str = "TimeAttribute=date\n\
PropertyCollectors=TimestampFileNameExtractorSPI[timeregex](date)\n\
Schema=*the_geom:Polygon,location:String,date:java.util.Date";

// Granules are named <something>_time_<YYYYMMDD>.tif
const TIMEREGEX: &str = "regex=(?<=_time_)[0-9]{8}";

/// File name of a granule, unique per export and carrying its start date.
pub fn granule_file_name(map: &str, start: NaiveDate) -> String {
    format!(
        "{}_{}_time_{}.tif",
        map,
        Uuid::new_v4(),
        start.format("%Y%m%d")
    )
}

/// Creates the mosaic directory, refusing to reuse one that already holds
/// files (the layer is most likely published already).
pub fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        if fs::read_dir(dir)?.next().is_some() {
            bail!(
                "Directory {} is not empty! As data is shared between GeoServer and GRASS GIS, layer might already exist.",
                dir.display()
            );
        }
    } else {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create directory {}", dir.display()))?;
    }
    open_permissions(dir)
}

/// GeoServer usually runs as another user than GRASS, so owner and others
/// need rwx on the directory (permissions are overwritten, not extended).
#[cfg(unix)]
fn open_permissions(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o707))
        .with_context(|| format!("Could not set permissions of {}", dir.display()))
}

#[cfg(not(unix))]
fn open_permissions(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Writes `indexer.properties` and `timeregex.properties` unless present.
pub fn write_aux_files(dir: &Path) -> Result<()> {
    for (name, content) in [(INDEXER_FILE, INDEXER), (TIMEREGEX_FILE, TIMEREGEX)] {
        let path = dir.join(name);
        if !path.is_file() {
            fs::write(&path, content)
                .with_context(|| format!("Could not write {}", path.display()))?;
        }
    }
    Ok(())
}

/// Zips all files below `dir` (paths relative to `dir`) into `archive`.
///
/// Returns the archive size in bytes.
pub fn zip_dir(dir: &Path, archive: &Path) -> Result<u64> {
    let file = File::create(archive)
        .with_context(|| format!("Could not create archive {}", archive.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .strip_prefix(dir)?
            .to_str()
            .with_context(|| format!("File name is invalid UTF8 {:?}", entry.path()))?
            .replace('\\', "/");
        debug!("adding {} to {}", name, archive.display());
        zip.start_file(name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
    }
    zip.finish()?;
    Ok(fs::metadata(archive)?.len())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn test_granule_file_name() {
        let name = granule_file_name("lst_255", NaiveDate::from_ymd_opt(2015, 3, 1).unwrap());
        assert!(name.starts_with("lst_255_"));
        assert!(name.ends_with("_time_20150301.tif"));
        assert_ne!(
            name,
            granule_file_name("lst_255", NaiveDate::from_ymd_opt(2015, 3, 1).unwrap())
        );
    }

    #[test]
    fn test_prepare_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("geodata").join("mosaic");
        prepare_dir(&dir).unwrap();
        assert!(dir.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o707);
        }
    }

    #[test]
    fn test_prepare_dir_rejects_non_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("granule.tif"), b"tif").unwrap();
        let e = prepare_dir(tmp.path()).unwrap_err();
        assert!(e.to_string().contains("is not empty!"));
    }

    #[test]
    fn test_aux_files_are_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(TIMEREGEX_FILE), "regex=custom").unwrap();
        write_aux_files(tmp.path()).unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join(TIMEREGEX_FILE)).unwrap(),
            "regex=custom"
        );
        let indexer = fs::read_to_string(tmp.path().join(INDEXER_FILE)).unwrap();
        assert!(indexer.starts_with("TimeAttribute=date\n"));
    }

    #[test]
    fn test_zip_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("mosaic");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a_time_20150101.tif"), b"granule").unwrap();
        write_aux_files(&dir).unwrap();
        let archive = tmp.path().join("mosaic.zip");

        let size = zip_dir(&dir, &archive).unwrap();
        assert!(size > 0);

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut names: Vec<_> = zip.file_names().map(str::to_owned).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["a_time_20150101.tif", INDEXER_FILE, TIMEREGEX_FILE]
        );
        let mut content = String::new();
        zip.by_name("a_time_20150101.tif")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "granule");
    }
}
