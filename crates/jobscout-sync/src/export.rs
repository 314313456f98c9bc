//! Human-readable and tabular views written next to the persisted collection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray};
use arrow_csv::WriterBuilder;
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use jobscout_core::JobPosting;
use jobscout_storage::{sha256_hex, write_atomic};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";
const CSV_HEADERS: [&str; 8] = [
    "Company",
    "Title",
    "Location",
    "Department",
    "Type",
    "URL",
    "Date Posted",
    "Scraped At",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub titles: PathBuf,
    pub csv: PathBuf,
    pub parquet: PathBuf,
    pub manifest: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub postings: usize,
    pub files: Vec<ExportManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// `jobs.json` -> `jobs_titles.txt`, `jobs.csv`, `jobs.parquet`, `jobs_exports.json` in the same
/// directory.
pub fn export_paths(output_file: &Path) -> ExportPaths {
    let dir = output_file.parent().unwrap_or_else(|| Path::new(""));
    let stem = output_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jobs".to_string());
    ExportPaths {
        titles: dir.join(format!("{stem}_titles.txt")),
        csv: dir.join(format!("{stem}.csv")),
        parquet: dir.join(format!("{stem}.parquet")),
        manifest: dir.join(format!("{stem}_exports.json")),
    }
}

/// Titles grouped by source, sources sorted by name, postings numbered in collection order.
pub fn render_titles(postings: &[JobPosting], generated_at: DateTime<Utc>) -> String {
    let mut groups: BTreeMap<&str, Vec<&JobPosting>> = BTreeMap::new();
    for posting in postings {
        groups.entry(listed_source(posting)).or_default().push(posting);
    }

    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("JOB TITLES - {}\n", generated_at.format("%Y-%m-%d %H:%M UTC")));
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("Total Jobs: {}\n", postings.len()));
    out.push_str(RULE);
    out.push_str("\n\n");

    for (source, items) in &groups {
        out.push_str(&format!("\n{source} ({} jobs)\n", items.len()));
        out.push_str(THIN_RULE);
        out.push('\n');
        for (idx, posting) in items.iter().enumerate() {
            match posting.location.as_deref() {
                Some(location) => {
                    out.push_str(&format!("{}. {} | {}\n", idx + 1, posting.title, location))
                }
                None => out.push_str(&format!("{}. {}\n", idx + 1, posting.title)),
            }
        }
    }

    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
    out
}

pub async fn write_exports(
    output_file: &Path,
    postings: &[JobPosting],
    generated_at: DateTime<Utc>,
) -> Result<ExportPaths> {
    let paths = export_paths(output_file);

    let titles = render_titles(postings, generated_at);
    write_atomic(&paths.titles, titles.as_bytes()).await?;

    let csv = encode_postings_csv(postings)?;
    write_atomic(&paths.csv, &csv).await?;

    let parquet = encode_postings_parquet(postings)?;
    write_atomic(&paths.parquet, &parquet).await?;

    let manifest = ExportManifest {
        schema_version: 1,
        generated_at,
        postings: postings.len(),
        files: vec![
            manifest_entry("titles", &paths.titles, titles.as_bytes()),
            manifest_entry("spreadsheet", &paths.csv, &csv),
            manifest_entry("postings", &paths.parquet, &parquet),
        ],
    };
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing export manifest")?;
    write_atomic(&paths.manifest, &bytes).await?;
    Ok(paths)
}

fn manifest_entry(name: &str, path: &Path, bytes: &[u8]) -> ExportManifestFile {
    ExportManifestFile {
        name: name.to_string(),
        path: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        sha256: sha256_hex(bytes),
        bytes: bytes.len() as u64,
    }
}

/// Older collections carry no source; their company stands in.
fn listed_source(posting: &JobPosting) -> &str {
    if posting.source.is_empty() {
        &posting.company
    } else {
        &posting.source
    }
}

/// Spreadsheet view. Commas inside the free-text columns become spaces so naive splitters still
/// line up; link and timestamp columns are written as stored.
pub fn encode_postings_csv(postings: &[JobPosting]) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(
        CSV_HEADERS
            .iter()
            .map(|name| ArrowField::new(*name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(flattened_column(postings.iter().map(|p| Some(listed_source(p))))),
            Arc::new(flattened_column(postings.iter().map(|p| Some(p.title.as_str())))),
            Arc::new(flattened_column(postings.iter().map(|p| p.location.as_deref()))),
            Arc::new(flattened_column(postings.iter().map(|p| p.department.as_deref()))),
            Arc::new(flattened_column(postings.iter().map(|p| p.employment_type.as_deref()))),
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.url.as_str())))),
            Arc::new(utf8_column(postings.iter().map(|p| p.date_posted.as_deref()))),
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.scraped_at.as_str())))),
        ],
    )
    .context("building csv record batch")?;

    let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
    writer.write(&batch).context("writing csv rows")?;
    Ok(writer.into_inner())
}

fn encode_postings_parquet(postings: &[JobPosting]) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("company", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("location", DataType::Utf8, true),
        ArrowField::new("department", DataType::Utf8, true),
        ArrowField::new("employment_type", DataType::Utf8, true),
        ArrowField::new("url", DataType::Utf8, false),
        ArrowField::new("date_posted", DataType::Utf8, true),
        ArrowField::new("scraped_at", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.id.as_str())))),
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.source.as_str())))),
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.company.as_str())))),
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.title.as_str())))),
            Arc::new(utf8_column(postings.iter().map(|p| p.location.as_deref()))),
            Arc::new(utf8_column(postings.iter().map(|p| p.department.as_deref()))),
            Arc::new(utf8_column(postings.iter().map(|p| p.employment_type.as_deref()))),
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.url.as_str())))),
            Arc::new(utf8_column(postings.iter().map(|p| p.date_posted.as_deref()))),
            Arc::new(utf8_column(postings.iter().map(|p| Some(p.scraped_at.as_str())))),
        ],
    )
    .context("building postings record batch")?;

    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)
        .context("opening parquet writer")?;
    writer.write(&batch).context("writing postings record batch")?;
    writer.into_inner().context("closing parquet writer")
}

fn utf8_column<'a>(values: impl Iterator<Item = Option<&'a str>>) -> StringArray {
    StringArray::from(values.collect::<Vec<_>>())
}

fn flattened_column<'a>(values: impl Iterator<Item = Option<&'a str>>) -> StringArray {
    StringArray::from(
        values
            .map(|v| v.map(|s| s.replace(',', " ")))
            .collect::<Vec<Option<String>>>(),
    )
}
