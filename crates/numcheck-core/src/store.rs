//! Result artifacts: a plain list of found numbers and a full CSV report.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    domain::{CheckOutcome, OutcomeKind},
    ports::ResultStore,
    utils::csv_field,
    Result,
};

pub const FOUND_FILE: &str = "found_numbers.txt";
pub const FULL_RESULTS_FILE: &str = "full_results.csv";
pub const CSV_HEADER: &str = "Phone Number,WhatsApp Status,Error";

/// Found identifiers, one per line, in check order.
pub fn render_found_txt(outcomes: &[CheckOutcome]) -> String {
    outcomes
        .iter()
        .filter(|o| o.is_found())
        .map(|o| o.identifier.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every outcome as `number,YES|NO` or `number,ERROR,message`.
pub fn render_full_csv(outcomes: &[CheckOutcome]) -> String {
    let mut out = String::from(CSV_HEADER);
    for o in outcomes {
        out.push('\n');
        out.push_str(o.identifier.as_str());
        match o.kind {
            OutcomeKind::Found => out.push_str(",YES"),
            OutcomeKind::NotFound => out.push_str(",NO"),
            OutcomeKind::TransientFailure => {
                out.push_str(",ERROR,");
                out.push_str(&csv_field(o.message.as_deref().unwrap_or("")));
            }
        }
    }
    out
}

/// Writes both artifacts into one directory, replacing previous versions.
#[derive(Clone, Debug)]
pub struct FileResultStore {
    dir: PathBuf,
}

impl FileResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn found_path(&self) -> PathBuf {
        self.dir.join(FOUND_FILE)
    }

    pub fn full_results_path(&self) -> PathBuf {
        self.dir.join(FULL_RESULTS_FILE)
    }
}

/// Write via a sibling temp file + rename so readers never see a half-written artifact.
async fn write_replace(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ResultStore for FileResultStore {
    async fn save(&self, outcomes: &[CheckOutcome]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        write_replace(&self.full_results_path(), &render_full_csv(outcomes)).await?;
        write_replace(&self.found_path(), &render_found_txt(outcomes)).await?;
        Ok(())
    }
}
