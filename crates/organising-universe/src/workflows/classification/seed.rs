//! CSV seed import for demos and local serving.
//!
//! Expected header: `project_id,tier,eba,patch,classification`. `tier` and `classification`
//! may be blank; `eba` and `patch` accept true/false, yes/no, or 1/0.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{Classification, InvalidValue, JobSiteId, NewProject, ProjectId, Tier};
use super::memory::InMemorySignals;
use super::repository::{ProjectRepository, RepositoryError};
use super::service::{ClassificationError, ClassificationService};
use super::signals::SignalProvider;

#[derive(Debug)]
pub enum SeedImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Value { line: usize, source: InvalidValue },
    Duplicate {
        line: usize,
        first_line: usize,
        project_id: ProjectId,
    },
}

impl std::fmt::Display for SeedImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedImportError::Io(err) => write!(f, "failed to read project seed: {}", err),
            SeedImportError::Csv(err) => write!(f, "invalid project seed CSV: {}", err),
            SeedImportError::Value { line, source } => {
                write!(f, "invalid project seed row {}: {}", line, source)
            }
            SeedImportError::Duplicate {
                line,
                first_line,
                project_id,
            } => write!(
                f,
                "project seed row {} repeats project {} from row {}",
                line, project_id, first_line
            ),
        }
    }
}

impl std::error::Error for SeedImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SeedImportError::Io(err) => Some(err),
            SeedImportError::Csv(err) => Some(err),
            SeedImportError::Value { source, .. } => Some(source),
            SeedImportError::Duplicate { .. } => None,
        }
    }
}

impl From<std::io::Error> for SeedImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for SeedImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRow {
    pub project_id: ProjectId,
    pub tier: Option<Tier>,
    pub certified_eba: bool,
    pub patch: bool,
    pub classification: Option<Classification>,
}

impl SeedRow {
    /// Synthetic job site used to carry the row's patch coverage.
    pub fn site_id(&self) -> JobSiteId {
        JobSiteId(format!("{}-site", self.project_id))
    }
}

pub fn read_seed_path<P: AsRef<Path>>(path: P) -> Result<Vec<SeedRow>, SeedImportError> {
    let file = std::fs::File::open(path)?;
    read_seed(file)
}

pub fn read_seed<R: Read>(reader: R) -> Result<Vec<SeedRow>, SeedImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, record) in csv_reader.deserialize::<RawSeedRow>().enumerate() {
        let raw = record?;
        // Header is line 1.
        let line = index + 2;
        let tier = raw
            .tier
            .as_deref()
            .map(str::parse::<Tier>)
            .transpose()
            .map_err(|source| SeedImportError::Value { line, source })?;
        let classification = raw
            .classification
            .as_deref()
            .map(Classification::parse)
            .transpose()
            .map_err(|source| SeedImportError::Value { line, source })?;

        if let Some(&first_line) = seen.get(&raw.project_id) {
            return Err(SeedImportError::Duplicate {
                line,
                first_line,
                project_id: ProjectId(raw.project_id),
            });
        }
        seen.insert(raw.project_id.clone(), line);

        rows.push(SeedRow {
            project_id: ProjectId(raw.project_id),
            tier,
            certified_eba: raw.eba,
            patch: raw.patch,
            classification,
        });
    }

    Ok(rows)
}

/// Publish each row's signals, then register the project through the service so creation
/// classifies it exactly as a live insert would. A row naming an existing project fails with
/// `Conflict` before its signals are published.
pub fn import_seed<R, S>(
    service: &ClassificationService<R, S>,
    signals: &InMemorySignals,
    rows: &[SeedRow],
) -> Result<usize, ClassificationError>
where
    R: ProjectRepository + 'static,
    S: SignalProvider + 'static,
{
    for row in rows {
        match service.get(&row.project_id) {
            Ok(_) => return Err(RepositoryError::Conflict.into()),
            Err(ClassificationError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        signals.set_tier(&row.project_id, row.tier);
        signals.set_certified_eba(&row.project_id, row.certified_eba);
        let site = row.site_id();
        signals.register_site(&site, &row.project_id);
        if row.patch {
            signals.open_patch(&site);
        }

        service.create_project(NewProject {
            id: row.project_id.clone(),
            classification: row.classification,
        })?;
    }

    Ok(rows.len())
}

#[derive(Debug, Deserialize)]
struct RawSeedRow {
    project_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    tier: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    eba: bool,
    #[serde(default, deserialize_with = "flag")]
    patch: bool,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    classification: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "n" | "0" => Ok(false),
        "true" | "yes" | "y" | "1" => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "expected a yes/no flag, found '{other}'"
        ))),
    }
}
