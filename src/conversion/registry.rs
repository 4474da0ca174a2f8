//! Static table of legal conversions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::capability::{Capability, Tool};
use crate::config::ToolsConfig;
use crate::models::Format;

use Capability::*;

type TableRow = (&'static str, &'static [(&'static str, Option<Capability>)]);

/// Every source format with its advertised targets, in suggestion order.
///
/// A target without a capability is advertised but cannot be converted.
const CONVERSION_TABLE: &[TableRow] = &[
    // Documents
    ("docx", &[("pdf", Some(Office))]),
    (
        "pdf",
        &[
            ("docx", Some(Pandoc)),
            ("pptx", None),
            ("epub", Some(Pandoc)),
            ("txt", Some(Pandoc)),
        ],
    ),
    ("pptx", &[("pdf", Some(Office))]),
    ("odt", &[("docx", Some(Office)), ("pdf", Some(Office))]),
    // Images
    ("png", &[("pdf", Some(ImageMagick))]),
    ("jpg", &[("pdf", Some(ImageMagick))]),
    ("jpeg", &[("pdf", Some(ImageMagick))]),
    ("heic", &[("jpg", Some(ImageMagick)), ("png", Some(ImageMagick))]),
    ("webp", &[("jpg", Some(RasterImage)), ("png", Some(RasterImage))]),
    ("svg", &[("png", Some(Inkscape)), ("pdf", Some(Inkscape))]),
    // Notes
    ("txt", &[("pdf", Some(Pandoc)), ("docx", Some(Pandoc))]),
    ("md", &[("html", Some(Pandoc)), ("pdf", Some(Pandoc))]),
    ("epub", &[("pdf", Some(Pandoc))]),
    // Multimedia
    ("mp4", &[("gif", Some(Ffmpeg)), ("webm", Some(Ffmpeg))]),
    ("mov", &[("gif", Some(Ffmpeg)), ("webm", Some(Ffmpeg))]),
    ("wav", &[("mp3", Some(Ffmpeg))]),
    ("aac", &[("mp3", Some(Ffmpeg))]),
    ("mp3", &[("wav", Some(Ffmpeg))]),
    // Data
    ("csv", &[("xls", Some(Office)), ("xlsx", Some(Office))]),
    ("xls", &[("csv", Some(Office)), ("pdf", Some(Office))]),
    ("tsv", &[("csv", Some(TsvToCsv))]),
    // Archives and web
    ("zip", &[("tar.gz", Some(ZipToTarGz)), ("rar", Some(ZipToRar))]),
    ("html", &[("pdf", Some(HtmlToPdf))]),
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A registered conversion whose tool could not be run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTool {
    pub source: Format,
    pub target: Format,
    pub capability: Capability,
    pub tool: Tool,
    pub command: String,
}

/// Read-only view of the conversion table.
///
/// The legal-output lists and the capability map are both derived from
/// `CONVERSION_TABLE`, so they cannot disagree.
#[derive(Debug, Clone)]
pub struct ConversionRegistry {
    outputs: BTreeMap<Format, Vec<Format>>,
    pairs: HashMap<(Format, Format), Capability>,
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ConversionRegistry {
    pub fn builtin() -> Self {
        Self::from_table(CONVERSION_TABLE)
    }

    fn from_table(table: &[TableRow]) -> Self {
        let mut outputs = BTreeMap::new();
        let mut pairs = HashMap::new();

        for (source, targets) in table {
            let Some(source) = Format::parse(source) else {
                continue;
            };

            let mut legal = Vec::with_capacity(targets.len());
            for (target, capability) in targets.iter() {
                let Some(target) = Format::parse(target) else {
                    continue;
                };
                if let Some(capability) = capability {
                    pairs.insert((source.clone(), target.clone()), *capability);
                }
                legal.push(target);
            }
            outputs.insert(source, legal);
        }

        Self { outputs, pairs }
    }

    /// Capability converting `source` into `target`, if one is registered
    pub fn lookup(&self, source: &Format, target: &Format) -> Option<Capability> {
        self.pairs.get(&(source.clone(), target.clone())).copied()
    }

    /// Advertised targets for `source`; empty for unknown formats
    pub fn legal_outputs(&self, source: &Format) -> &[Format] {
        self.outputs.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_known_format(&self, format: &Format) -> bool {
        self.outputs.contains_key(format)
    }

    /// Targets every format of a batch can be converted to.
    ///
    /// Order follows the first format's list. An empty batch, or one without
    /// a common target, yields an empty list.
    pub fn suggest_outputs(&self, formats: &[Format]) -> Vec<Format> {
        let Some((first, rest)) = formats.split_first() else {
            return Vec::new();
        };

        let mut suggested = self.legal_outputs(first).to_vec();
        for format in rest.iter().filter(|format| *format != first) {
            let legal = self.legal_outputs(format);
            suggested.retain(|target| legal.contains(target));
        }
        suggested
    }

    /// All known sources with their advertised targets
    pub fn formats(&self) -> &BTreeMap<Format, Vec<Format>> {
        &self.outputs
    }

    /// Every (source, target, capability) triple that can actually run
    pub fn capabilities(&self) -> impl Iterator<Item = (&Format, &Format, Capability)> {
        self.pairs
            .iter()
            .map(|((source, target), capability)| (source, target, *capability))
    }

    /// Distinct tools needed by the registered capabilities
    pub fn required_tools(&self) -> BTreeSet<Tool> {
        self.pairs
            .values()
            .flat_map(|capability| capability.required_tools().iter().copied())
            .collect()
    }

    /// Probe every required tool once and report the conversions it breaks.
    ///
    /// Logs one warning per unavailable tool.
    pub async fn validate_tools(&self, tools: &ToolsConfig) -> Vec<MissingTool> {
        let mut unavailable = BTreeSet::new();
        for tool in self.required_tools() {
            let command = tools.command(tool);
            match probe_tool(tool, command).await {
                Some(version) => info!("Found {} ({}): {}", tool, command, version),
                None => {
                    unavailable.insert(tool);
                }
            }
        }

        let mut missing = Vec::new();
        for (source, target, capability) in self.capabilities() {
            for tool in capability.required_tools() {
                if unavailable.contains(tool) {
                    missing.push(MissingTool {
                        source: source.clone(),
                        target: target.clone(),
                        capability,
                        tool: *tool,
                        command: tools.command(*tool).to_string(),
                    });
                }
            }
        }
        missing.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

        for tool in &unavailable {
            let affected: Vec<String> = missing
                .iter()
                .filter(|entry| entry.tool == *tool)
                .map(|entry| format!("{}->{}", entry.source, entry.target))
                .collect();
            warn!(
                "Tool {} ('{}') is not available; {} conversion(s) will fail: {}",
                tool,
                tools.command(*tool),
                affected.len(),
                affected.join(", ")
            );
        }

        missing
    }
}

/// Run `<command> <version args>` and return the first line it printed.
///
/// A tool counts as available when it can be started at all; some print
/// their banner with a non-zero exit code.
async fn probe_tool(tool: Tool, command: &str) -> Option<String> {
    let probe = Command::new(command)
        .args(tool.version_args())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("version unknown")
                .to_string();
            debug!("Probe of {} exited with {}", command, output.status);
            Some(version)
        }
        Ok(Err(e)) => {
            debug!("Failed to execute {} command '{}': {}", tool, command, e);
            None
        }
        Err(_) => {
            debug!("{} command '{}' did not answer within {:?}", tool, command, PROBE_TIMEOUT);
            None
        }
    }
}
