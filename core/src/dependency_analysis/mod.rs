//! Cross-file dependency analysis for distributed builds
//!
//! Every source file of a module comes with a swiftdeps file listing what the
//! file provides and what it depends on. [`DependencyMapper`] collects those
//! facts for one compilation unit and turns them into a [`DependencyMap`]:
//! for each file, the other files that must accompany it when it is compiled
//! as a primary file.
//!
//! Dependencies are either cascading or non-cascading (`!private`). If
//! `X -> Y` means X directly depends on Y, and A -> B -> C -> D:
//!   - A always depends on B,
//!   - A depends on C if B -> C is cascading,
//!   - A depends on D if both B -> C and C -> D are cascading.
//!
//! Whether A -> B itself is cascading does not matter for A; it only matters
//! to files that reach A.

mod swift_deps;


pub use swift_deps::SwiftDepsParseError;

use crate::error::FlockErr;
use crate::error::Result;
use flock_protocol::SourceFileIndex;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use swift_deps::Fact;
use tracing::debug;

/// A dependency kind and its identifying string(s)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyItem {
    TopLevel(String),
    Nominal(String),
    Member(String, String),
    DynamicLookup(String),
}

/// A `depends-*` entry in a swiftdeps file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependsEntry {
    pub dependant_index: SourceFileIndex,
    pub item: DependencyItem,
    pub is_cascading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyMap {
    /// If `internal_dependencies[i] = {m, n}`, compiling `source_files[i]` as
    /// a primary file requires `source_files[m]` and `source_files[n]` as
    /// secondary files. Never contains `i` itself.
    pub internal_dependencies: Vec<BTreeSet<SourceFileIndex>>,

    /// If any of these files changed since they were observed, the plan built
    /// on this map is stale.
    pub external_dependencies: BTreeSet<PathBuf>,
}

impl DependencyMap {
    pub fn dependencies_of(&self, index: SourceFileIndex) -> &BTreeSet<SourceFileIndex> {
        &self.internal_dependencies[index]
    }

    pub fn source_files_count(&self) -> usize {
        self.internal_dependencies.len()
    }
}

/// Accumulates swiftdeps facts for one compilation unit.
///
/// Load every file exactly once with [`DependencyMapper::load_swift_deps`],
/// then call [`DependencyMapper::compute_dependency_map`]. Loading order does
/// not affect the result.
#[derive(Debug)]
pub struct DependencyMapper {
    source_files_count: usize,
    providers: HashMap<DependencyItem, Vec<SourceFileIndex>>,
    depends_entries: Vec<DependsEntry>,
    external_dependencies: BTreeSet<String>,
    is_swift_deps_file_loaded: Vec<bool>,
}

impl DependencyMapper {
    pub fn new(source_files_count: usize) -> Self {
        Self {
            source_files_count,
            providers: HashMap::new(),
            depends_entries: Vec::new(),
            external_dependencies: BTreeSet::new(),
            is_swift_deps_file_loaded: vec![false; source_files_count],
        }
    }

    /// Read and load the swiftdeps file at `path` for `source_file_index`.
    pub async fn load_swift_deps_file(
        &mut self,
        path: &Path,
        source_file_index: SourceFileIndex,
    ) -> Result<()> {
        let contents = tokio::fs::read_to_string(path).await?;
        self.load_swift_deps(&contents, source_file_index)
            .map_err(|source| FlockErr::SwiftDepsFile {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Load the swiftdeps contents of one source file.
    ///
    /// # Panics
    ///
    /// If `source_file_index` is out of range or was already loaded.
    pub fn load_swift_deps(
        &mut self,
        contents: &str,
        source_file_index: SourceFileIndex,
    ) -> std::result::Result<(), SwiftDepsParseError> {
        assert!(
            source_file_index < self.source_files_count,
            "source file index {source_file_index} out of range ({} files)",
            self.source_files_count
        );
        assert!(
            !self.is_swift_deps_file_loaded[source_file_index],
            "swiftdeps for source file {source_file_index} loaded twice"
        );

        let facts = swift_deps::parse_swift_deps(contents)?;
        debug!(source_file_index, facts = facts.len(), "loaded swiftdeps");
        for fact in facts {
            match fact {
                Fact::Provides(item) => {
                    self.providers.entry(item).or_default().push(source_file_index);
                }
                Fact::Depends { item, is_cascading } => self.depends_entries.push(DependsEntry {
                    dependant_index: source_file_index,
                    item,
                    is_cascading,
                }),
                Fact::External(name) => {
                    self.external_dependencies.insert(name);
                }
            }
        }
        self.is_swift_deps_file_loaded[source_file_index] = true;
        Ok(())
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.is_swift_deps_file_loaded.iter().all(|&loaded| loaded)
    }

    /// # Panics
    ///
    /// If some source file has no swiftdeps loaded yet.
    pub fn compute_dependency_map(&self) -> DependencyMap {
        assert!(
            self.is_fully_loaded(),
            "dependency map computed before every swiftdeps file was loaded"
        );

        let count = self.source_files_count;
        let mut non_cascading = vec![BTreeSet::new(); count];
        let mut direct_cascading = vec![BTreeSet::new(); count];

        for entry in &self.depends_entries {
            let Some(provider_indices) = self.providers.get(&entry.item) else {
                continue;
            };
            let targets = if entry.is_cascading {
                &mut direct_cascading[entry.dependant_index]
            } else {
                &mut non_cascading[entry.dependant_index]
            };
            targets.extend(
                provider_indices
                    .iter()
                    .copied()
                    .filter(|&provider| provider != entry.dependant_index),
            );
        }

        let mut closures: Vec<Option<BTreeSet<SourceFileIndex>>> = vec![None; count];
        let mut internal_dependencies = Vec::with_capacity(count);
        for i in 0..count {
            let direct: BTreeSet<SourceFileIndex> =
                non_cascading[i].union(&direct_cascading[i]).copied().collect();
            let mut all = direct.clone();
            for &dependency in &direct {
                let closure = closures[dependency]
                    .get_or_insert_with(|| cascading_closure(&direct_cascading, dependency));
                all.extend(closure.iter().copied());
            }
            all.remove(&i);
            internal_dependencies.push(all);
        }

        DependencyMap {
            internal_dependencies,
            external_dependencies: self.external_dependencies.iter().map(PathBuf::from).collect(),
        }
    }
}

/// Files reachable from `from` through one or more cascading edges, not
/// including `from`.
fn cascading_closure(
    direct_cascading: &[BTreeSet<SourceFileIndex>],
    from: SourceFileIndex,
) -> BTreeSet<SourceFileIndex> {
    let mut visited = BTreeSet::from([from]);
    let mut worklist: Vec<SourceFileIndex> = direct_cascading[from].iter().copied().collect();
    while let Some(next) = worklist.pop() {
        if visited.insert(next) {
            worklist.extend(
                direct_cascading[next]
                    .iter()
                    .copied()
                    .filter(|d| !visited.contains(d)),
            );
        }
    }
    visited.remove(&from);
    visited
}
