//! Packaged-model archives
//!
//! A packaged model is a ZIP archive with a fixed layout: the model
//! document, the meta-schema it was validated against, one flat file per
//! external CV under `cv/`, and a `signatures.txt` manifest carrying the
//! expected content digests. Opening a package verifies every digest;
//! emitting one recomputes them and writes the manifest last.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::info;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::digest::{self, CvStream, DigestSet, Sha1Hex};
use crate::error::{ModelError, Result};
use crate::load::{self, CvSource, LoadOptions};
use crate::model::Model;
use crate::project::xml::model_to_xml;

/// Archive member names
pub const MODEL_MEMBER: &str = "bp-model.xml";
pub const SCHEMA_MEMBER: &str = "bp-schema.xsd";
pub const SIGNATURES_MEMBER: &str = "signatures.txt";
pub const CV_DIR: &str = "cv/";

/// Load a packaged model with default options
pub fn load_package(path: &Path) -> Result<Model> {
    load_package_with(path, &LoadOptions::default())
}

/// Load a packaged model, verifying every manifest digest
pub fn load_package_with(path: &Path, options: &LoadOptions) -> Result<Model> {
    let file = fs::File::open(path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| ModelError::corrupt(path.display().to_string(), e.to_string()))?;

    let model_bytes = read_member(&mut archive, MODEL_MEMBER)?;
    let schema_bytes = read_member(&mut archive, SCHEMA_MEMBER)?;
    let signatures_bytes = read_member(&mut archive, SIGNATURES_MEMBER)?;
    let signatures = digest::parse_signatures(&String::from_utf8_lossy(&signatures_bytes))?;
    let source_mtime = member_mtime(&mut archive, MODEL_MEMBER);

    let mut cv_source = ZipCvSource { archive };
    let model = load::build_model(
        &model_bytes,
        schema_bytes,
        &mut cv_source,
        options,
        source_mtime,
    )?;

    verify_digest(&signatures, "schemaSHA1", &model.digests.schema)?;
    verify_digest(&signatures, "modelSHA1", &model.digests.model)?;
    // the CV stream cannot be recomputed when CV parsing was skipped
    if !options.skip_cv_parse {
        verify_digest(&signatures, "cvSHA1", &model.digests.cv)?;
    }

    info!(project = %model.project, path = %path.display(), "package loaded");
    Ok(model)
}

/// Emit a packaged archive for a resolved model.
///
/// External CV paths are flattened into collision-free names under `cv/`;
/// the model document is re-serialized with the rewritten paths; the
/// signatures manifest is computed over the emitted bytes and written last.
pub fn emit_package(model: &Model, dest: &Path) -> Result<()> {
    // flatten CV paths, resolving collisions case-insensitively so the
    // result is stable on case-insensitive filesystems
    let mut flat_paths: HashMap<String, String> = HashMap::new();
    let mut taken: Vec<String> = Vec::new();
    let mut cv_contents: Vec<(String, String)> = Vec::new();
    for (id, entry) in model.cvs.iter() {
        let Some(cv) = entry.as_simple() else { continue };
        let Some(original) = &cv.file else { continue };
        let Some(content) = &cv.source_text else {
            return Err(ModelError::CvUnresolved { cv: id.to_string() });
        };
        let flat = flatten_name(original, &mut taken);
        flat_paths.insert(id.to_string(), format!("{CV_DIR}{flat}"));
        cv_contents.push((format!("{CV_DIR}{flat}"), content.clone()));
    }

    let xml = model_to_xml(model, &flat_paths);
    let model_bytes = xml.as_bytes();

    let mut cv_stream = CvStream::new(model_bytes);
    for (_, content) in &cv_contents {
        cv_stream.update(content.as_bytes());
    }
    let (cv_digest, _) = cv_stream.finish();
    let digests = DigestSet {
        schema: Sha1Hex::from_bytes(&model.schema_bytes),
        model: Sha1Hex::from_bytes(model_bytes),
        cv: cv_digest,
        full: Sha1Hex::default(),
    };

    let file = fs::File::create(dest)?;
    let mut writer = ZipWriter::new(file);
    let options: FileOptions =
        FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    // the model member keeps the source document's modification time
    let model_options = match model.source_mtime.and_then(zip_datetime) {
        Some(dt) => options.last_modified_time(dt),
        None => options,
    };
    start_file(&mut writer, MODEL_MEMBER, model_options)?;
    writer.write_all(model_bytes)?;

    start_file(&mut writer, SCHEMA_MEMBER, options)?;
    writer.write_all(&model.schema_bytes)?;

    for (member, content) in &cv_contents {
        start_file(&mut writer, member, options)?;
        writer.write_all(content.as_bytes())?;
    }

    // signatures last
    start_file(&mut writer, SIGNATURES_MEMBER, options)?;
    writer.write_all(digest::write_signatures(&digests).as_bytes())?;

    writer
        .finish()
        .map_err(|e| ModelError::corrupt(dest.display().to_string(), e.to_string()))?;
    info!(project = %model.project, path = %dest.display(), "package emitted");
    Ok(())
}

/// Reads CV members from the open archive by their in-document path
struct ZipCvSource {
    archive: ZipArchive<fs::File>,
}

impl CvSource for ZipCvSource {
    fn read(&mut self, path: &str) -> Result<Vec<u8>> {
        read_member(&mut self.archive, path)
    }
}

fn read_member(archive: &mut ZipArchive<fs::File>, name: &str) -> Result<Vec<u8>> {
    let mut member = archive
        .by_name(name)
        .map_err(|e| ModelError::corrupt(name, e.to_string()))?;
    let mut buf = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut buf)?;
    Ok(buf)
}

fn member_mtime(archive: &mut ZipArchive<fs::File>, name: &str) -> Option<SystemTime> {
    let member = archive.by_name(name).ok()?;
    let dt = member.last_modified();
    let naive = chrono::NaiveDate::from_ymd_opt(
        dt.year() as i32,
        dt.month() as u32,
        dt.day() as u32,
    )?
    .and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)?;
    let utc: DateTime<Utc> = DateTime::from_naive_utc_and_offset(naive, Utc);
    SystemTime::UNIX_EPOCH.checked_add(std::time::Duration::from_secs(utc.timestamp().max(0) as u64))
}

fn zip_datetime(mtime: SystemTime) -> Option<zip::DateTime> {
    let utc: DateTime<Utc> = mtime.into();
    zip::DateTime::from_date_and_time(
        utc.year() as u16,
        utc.month() as u8,
        utc.day() as u8,
        utc.hour() as u8,
        utc.minute() as u8,
        utc.second() as u8,
    )
    .ok()
}

fn start_file(writer: &mut ZipWriter<fs::File>, name: &str, options: FileOptions) -> Result<()> {
    writer
        .start_file(name, options)
        .map_err(|e| ModelError::corrupt(name, e.to_string()))
}

fn verify_digest(
    signatures: &HashMap<String, Sha1Hex>,
    key: &str,
    computed: &Sha1Hex,
) -> Result<()> {
    let expected = signatures.get(key).ok_or_else(|| {
        ModelError::corrupt(SIGNATURES_MEMBER, format!("missing key: {key}"))
    })?;
    if expected != computed {
        return Err(ModelError::corrupt(
            SIGNATURES_MEMBER,
            format!("{key} mismatch: expected {expected}, computed {computed}"),
        ));
    }
    Ok(())
}

/// Flatten an external CV path to a bare file name; on a (case-insensitive)
/// collision, append a monotonically increasing counter before the
/// extension
fn flatten_name(path: &str, taken: &mut Vec<String>) -> String {
    let base = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string();
    let collides = |name: &str, taken: &[String]| {
        taken.iter().any(|t| t.eq_ignore_ascii_case(name))
    };
    let mut candidate = base.clone();
    let mut counter = 0usize;
    while collides(&candidate, taken) {
        counter += 1;
        candidate = match base.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}-{counter}.{ext}"),
            None => format!("{base}-{counter}"),
        };
    }
    taken.push(candidate.clone());
    candidate
}
