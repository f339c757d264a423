//! GitHub check annotations for missing coverage.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrcovError, Result};
use crate::groups::Group;

/// Severity of a GitHub annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    Notice,
    #[default]
    Warning,
    Error,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Notice => "notice",
            AnnotationType::Warning => "warning",
            AnnotationType::Error => "error",
        }
    }
}

impl FromStr for AnnotationType {
    type Err = PrcovError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "notice" => Ok(AnnotationType::Notice),
            "warning" => Ok(AnnotationType::Warning),
            "error" => Ok(AnnotationType::Error),
            _ => Err(PrcovError::InvalidAnnotationType(s.to_string())),
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub title: String,
    pub message_type: AnnotationType,
    pub message: String,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} in {}:{}-{}",
            self.message_type.as_str().to_uppercase(),
            self.message,
            self.file,
            self.line_start,
            self.line_end
        )
    }
}

impl Annotation {
    /// Serialize a list of annotations to a JSON array.
    pub fn to_json(annotations: &[Annotation]) -> Result<String> {
        Ok(serde_json::to_string(annotations)?)
    }

    /// Base64 of the JSON array, as the contents API expects it.
    pub fn encode(annotations: &[Annotation]) -> Result<String> {
        Ok(base64_encode(Self::to_json(annotations)?.as_bytes()))
    }
}

/// Turn groups into annotations. `branch` switches the wording to branch
/// coverage.
pub fn missing_coverage_annotations(
    annotation_type: AnnotationType,
    groups: &[Group],
    branch: bool,
) -> Vec<Annotation> {
    let kind = if branch { "branch " } else { "" };
    groups
        .iter()
        .map(|group| {
            let message = if group.line_start == group.line_end {
                format!("Missing {kind}coverage on line {}", group.line_start)
            } else {
                format!(
                    "Missing {kind}coverage on lines {}-{}",
                    group.line_start, group.line_end
                )
            };
            Annotation {
                file: group.file.clone(),
                line_start: group.line_start,
                line_end: group.line_end,
                title: format!("Missing {kind}coverage"),
                message_type: annotation_type,
                message,
            }
        })
        .collect()
}

/// Name of the annotations file for a pull request.
pub fn annotations_file_name(pr_number: u64) -> String {
    format!("{pr_number}-annotations.json")
}

/// Write `<dir>/<pr>-annotations.json` and return its path.
pub fn write_annotations(dir: &Path, pr_number: u64, annotations: &[Annotation]) -> Result<PathBuf> {
    let path = dir.join(annotations_file_name(pr_number));
    std::fs::write(&path, Annotation::to_json(annotations)?)?;
    Ok(path)
}

fn base64_encode(input: &[u8]) -> String {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut output = String::with_capacity(input.len().div_ceil(3) * 4);

    for chunk in input.chunks(3) {
        let b = chunk.get(1).copied();
        let c = chunk.get(2).copied();
        let n = (u32::from(chunk[0]) << 16) | (u32::from(b.unwrap_or(0)) << 8) | u32::from(c.unwrap_or(0));

        output.push(TABLE[((n >> 18) & 0x3f) as usize] as char);
        output.push(TABLE[((n >> 12) & 0x3f) as usize] as char);
        output.push(b.map_or('=', |_| TABLE[((n >> 6) & 0x3f) as usize] as char));
        output.push(c.map_or('=', |_| TABLE[(n & 0x3f) as usize] as char));
    }

    output
}
