//! File types the driver classifies its inputs and outputs by.

use flock_protocol::OutputKind;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use strum_macros::Display;
use strum_macros::EnumString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum FileType {
    #[strum(serialize = "swift")]
    Swift,
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "autolink")]
    Autolink,
    #[strum(serialize = "swiftmodule")]
    SwiftModule,
    #[strum(serialize = "swiftdoc")]
    SwiftDocumentation,
    #[strum(serialize = "swift-dependencies")]
    SwiftDeps,
    #[strum(serialize = "dependencies")]
    Dependencies,
    #[strum(serialize = "image")]
    Image,
    #[strum(serialize = "dSYM")]
    Dsym,
}

impl FileType {
    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_type = match path.extension()?.to_str()? {
            "swift" => FileType::Swift,
            "o" => FileType::Object,
            "autolink" => FileType::Autolink,
            "swiftmodule" => FileType::SwiftModule,
            "swiftdoc" => FileType::SwiftDocumentation,
            "swiftdeps" => FileType::SwiftDeps,
            "d" => FileType::Dependencies,
            "dSYM" => FileType::Dsym,
            _ => return None,
        };
        Some(file_type)
    }

    /// Inputs that go through the frontend, one primary at a time.
    pub const fn is_part_of_swift_compilation(self) -> bool {
        matches!(self, FileType::Swift)
    }

    /// The remote output kind this file type is returned as, if any.
    pub const fn output_kind(self) -> Option<OutputKind> {
        match self {
            FileType::Object => Some(OutputKind::Object),
            FileType::SwiftModule => Some(OutputKind::Module),
            FileType::SwiftDocumentation => Some(OutputKind::Documentation),
            _ => None,
        }
    }
}

/// A path together with the type of file it holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedPath {
    pub file: PathBuf,
    pub file_type: FileType,
}

impl TypedPath {
    pub fn new(file: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            file: file.into(),
            file_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_classification_by_extension() {
        assert_eq!(FileType::from_path(Path::new("Sources/a.swift")), Some(FileType::Swift));
        assert_eq!(FileType::from_path(Path::new("lib.o")), Some(FileType::Object));
        assert_eq!(FileType::from_path(Path::new("README.md")), None);
        assert_eq!(FileType::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_output_file_map_keys_parse() {
        assert_eq!(FileType::from_str("swift-dependencies").unwrap(), FileType::SwiftDeps);
        assert_eq!(FileType::SwiftDocumentation.to_string(), "swiftdoc");
    }
}
