//! The driver's output-file map: for every input, where each kind of output
//! goes. The entry keyed by the empty string holds module-wide outputs.

use crate::error::FlockErr;
use crate::error::Result;
use crate::file_types::FileType;
use crate::paths::make_absolute;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFileMap {
    entries: HashMap<PathBuf, HashMap<FileType, PathBuf>>,
    module_outputs: HashMap<FileType, PathBuf>,
}

impl OutputFileMap {
    pub async fn load(path: &Path, working_dir: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_json(&contents, working_dir).map_err(|err| match err {
            FlockErr::OutputFileMap { source, .. } => FlockErr::OutputFileMap {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse a JSON output-file map. Relative paths, keys and values alike,
    /// are resolved against `working_dir`.
    pub fn from_json(contents: &str, working_dir: &Path) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, String>> = serde_json::from_str(contents)
            .map_err(|source| FlockErr::OutputFileMap {
                path: PathBuf::new(),
                source,
            })?;

        let mut map = OutputFileMap::default();
        for (input, outputs) in raw {
            let mut typed = HashMap::new();
            for (type_name, output) in outputs {
                let Ok(file_type) = FileType::from_str(&type_name) else {
                    debug!(%type_name, "ignoring unknown output type in output file map");
                    continue;
                };
                typed.insert(file_type, make_absolute(Path::new(&output), working_dir)?);
            }
            if input.is_empty() {
                map.module_outputs = typed;
            } else {
                map.entries
                    .insert(make_absolute(Path::new(&input), working_dir)?, typed);
            }
        }
        Ok(map)
    }

    /// Output of `file_type` for `input`, which must be absolute.
    pub fn existing_output(&self, input: &Path, file_type: FileType) -> Option<&Path> {
        self.entries
            .get(input)
            .and_then(|outputs| outputs.get(&file_type))
            .map(PathBuf::as_path)
    }

    /// Module-wide output of `file_type`.
    pub fn module_output(&self, file_type: FileType) -> Option<&Path> {
        self.module_outputs.get(&file_type).map(PathBuf::as_path)
    }
}
