use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::link::{Architecture, ModuleLink, OperatingSystem};
use super::probe::ModuleProbe;
use super::{CandidateError, Module};
use crate::defaults::RunnerConfig;
use crate::error::Result;
use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPathSource {
    User,
    Environment,
    Config,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPath {
    pub path: PathBuf,
    pub source: SearchPathSource,
}

/// Module link directories in ascending priority: later entries override earlier ones.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct SearchPaths {
    entries: Vec<SearchPath>,
}

impl SearchPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>, source: SearchPathSource) {
        self.entries.push(SearchPath {
            path: path.into(),
            source,
        });
    }

    /// User dir, then `MISA_MODULE_LINK_PATHS`, then configured extras, then system dirs.
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        let mut search = Self::new();

        if let Ok(user) = paths::user_modules() {
            search.push(user, SearchPathSource::User);
        }
        for path in paths::env_modules() {
            search.push(path, SearchPathSource::Environment);
        }
        for path in config.expanded_module_paths()? {
            search.push(path, SearchPathSource::Config);
        }
        if config.include_system_paths {
            for path in paths::system_modules() {
                search.push(path, SearchPathSource::System);
            }
        }

        Ok(search)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchPath> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What happened to one module link descriptor during discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Registered { id: String },
    /// A descriptor found later registered the same id.
    Shadowed { id: String, by: PathBuf },
    Unavailable { error: CandidateError },
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub link_path: PathBuf,
    pub search_path: PathBuf,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
}

/// Modules discovered for one run. Immutable once built.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
    candidates: Vec<CandidateReport>,
}

impl ModuleRegistry {
    /// Scan every search path for `*.json` descriptors and query each candidate.
    ///
    /// Candidates that fail any step are reported as unavailable and skipped.
    pub fn discover(search_paths: &SearchPaths, probe: &dyn ModuleProbe) -> Self {
        Self::discover_for(
            search_paths,
            probe,
            OperatingSystem::host(),
            Architecture::host(),
        )
    }

    fn discover_for(
        search_paths: &SearchPaths,
        probe: &dyn ModuleProbe,
        os: OperatingSystem,
        arch: Architecture,
    ) -> Self {
        let mut registry = Self::default();
        let mut registered_at: HashMap<String, usize> = HashMap::new();

        for search_path in search_paths.iter() {
            let dir = &search_path.path;
            if !dir.is_dir() {
                continue;
            }

            for link_path in descriptor_files(dir) {
                let outcome = match load_candidate(&link_path, probe, os, arch) {
                    Ok(module) => {
                        let id = module.id.clone();
                        let index = registry.candidates.len();
                        if let Some(previous) = registered_at.insert(id.clone(), index) {
                            log_status!(
                                "registry",
                                "Module '{}' from {} overrides {}",
                                id,
                                link_path.display(),
                                registry.candidates[previous].link_path.display()
                            );
                            registry.candidates[previous].outcome = CandidateOutcome::Shadowed {
                                id: id.clone(),
                                by: link_path.clone(),
                            };
                        }
                        registry.modules.insert(id.clone(), module);
                        CandidateOutcome::Registered { id }
                    }
                    Err(error) => {
                        log_status!(
                            "registry",
                            "Skipping module link {}: {}",
                            link_path.display(),
                            error
                        );
                        CandidateOutcome::Unavailable { error }
                    }
                };

                registry.candidates.push(CandidateReport {
                    link_path,
                    search_path: dir.clone(),
                    outcome,
                });
            }
        }

        registry
    }

    /// Build a registry from already-known modules; later entries win on id clashes.
    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Self {
        let modules = modules
            .into_iter()
            .map(|module| (module.id.clone(), module))
            .collect();
        Self {
            modules,
            candidates: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// Registered module ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn candidates(&self) -> &[CandidateReport] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// `*.json` regular files directly inside `dir`, sorted by path.
fn descriptor_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/*.json",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let mut files: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

fn load_candidate(
    link_path: &Path,
    probe: &dyn ModuleProbe,
    os: OperatingSystem,
    arch: Architecture,
) -> std::result::Result<Module, CandidateError> {
    let content = std::fs::read_to_string(link_path).map_err(|e| CandidateError::Unreadable {
        error: e.to_string(),
    })?;
    let link = ModuleLink::parse(&content)?;
    let executable_path = link.resolve_executable(link_path)?;
    link.check_compatible(os, arch)?;
    let info = probe.query(&executable_path)?;

    Ok(Module {
        id: info.name.clone(),
        executable_path,
        link_path: link_path.to_path_buf(),
        info,
        metadata: link.metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleInfo;
    use std::fs;
    use tempfile::TempDir;

    /// Answers identity queries from a file-name table instead of spawning.
    struct TableProbe(Vec<(&'static str, std::result::Result<&'static str, CandidateError>)>);

    impl ModuleProbe for TableProbe {
        fn query(&self, executable: &Path) -> std::result::Result<ModuleInfo, CandidateError> {
            let file = executable.file_name().unwrap().to_string_lossy().to_string();
            let (_, answer) = self
                .0
                .iter()
                .find(|(name, _)| *name == file)
                .expect("unexpected probe");
            match answer {
                Ok(stdout) => ModuleInfo::parse(stdout),
                Err(e) => Err(e.clone()),
            }
        }
    }

    fn write_candidate(dir: &Path, link_name: &str, exe_name: &str) {
        fs::create_dir_all(dir).unwrap();
        let exe = dir.join(exe_name);
        fs::write(&exe, "").unwrap();
        let descriptor = serde_json::json!({ "executable-path": exe });
        fs::write(dir.join(link_name), descriptor.to_string()).unwrap();
    }

    fn search(paths: &[&Path]) -> SearchPaths {
        let mut search = SearchPaths::new();
        for p in paths {
            search.push(*p, SearchPathSource::Environment);
        }
        search
    }

    #[test]
    fn later_search_path_overrides_earlier() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        write_candidate(&first, "seg.json", "seg-old");
        write_candidate(&second, "seg.json", "seg-new");

        let probe = TableProbe(vec![
            ("seg-old", Ok(r#"{"name": "seg", "version": "1"}"#)),
            ("seg-new", Ok(r#"{"name": "seg", "version": "2"}"#)),
        ]);
        let registry = ModuleRegistry::discover(&search(&[&first, &second]), &probe);

        let module = registry.get("seg").unwrap();
        assert_eq!(module.executable_path, second.join("seg-new"));
        assert_eq!(module.info.version.as_deref(), Some("2"));
        assert_eq!(
            registry.candidates()[0].outcome,
            CandidateOutcome::Shadowed {
                id: "seg".to_string(),
                by: second.join("seg.json"),
            }
        );
        assert_eq!(
            registry.candidates()[1].outcome,
            CandidateOutcome::Registered {
                id: "seg".to_string()
            }
        );
    }

    #[test]
    fn descriptors_within_a_directory_are_visited_in_name_order() {
        let tmp = TempDir::new().unwrap();
        write_candidate(tmp.path(), "b.json", "exe-b");
        write_candidate(tmp.path(), "a.json", "exe-a");

        let probe = TableProbe(vec![
            ("exe-a", Ok(r#"{"name": "quant"}"#)),
            ("exe-b", Ok(r#"{"name": "quant"}"#)),
        ]);
        let registry = ModuleRegistry::discover(&search(&[tmp.path()]), &probe);

        assert_eq!(
            registry.get("quant").unwrap().executable_path,
            tmp.path().join("exe-b")
        );
    }

    #[test]
    fn failing_candidates_are_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write_candidate(tmp.path(), "good.json", "good");
        write_candidate(tmp.path(), "crash.json", "crash");
        fs::write(tmp.path().join("broken.json"), "{ nope").unwrap();
        fs::write(
            tmp.path().join("ghost.json"),
            r#"{"executable-path": "/nonexistent/ghost"}"#,
        )
        .unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let probe = TableProbe(vec![
            ("good", Ok(r#"{"name": "seg"}"#)),
            ("crash", Err(CandidateError::QueryFailed { exit_code: 1 })),
        ]);
        let registry = ModuleRegistry::discover(&search(&[tmp.path()]), &probe);

        assert_eq!(registry.ids(), vec!["seg".to_string()]);
        assert_eq!(registry.candidates().len(), 4);

        let unavailable: Vec<_> = registry
            .candidates()
            .iter()
            .filter_map(|c| match &c.outcome {
                CandidateOutcome::Unavailable { error } => Some(error.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(unavailable.len(), 3);
        assert!(unavailable
            .iter()
            .any(|e| matches!(e, CandidateError::InvalidDescriptor { .. })));
        assert!(unavailable
            .iter()
            .any(|e| matches!(e, CandidateError::ExecutableNotFound { .. })));
        assert!(unavailable
            .contains(&CandidateError::QueryFailed { exit_code: 1 }));
    }

    #[test]
    fn incompatible_candidates_are_not_queried() {
        let tmp = TempDir::new().unwrap();
        let exe = tmp.path().join("win-only");
        fs::write(&exe, "").unwrap();
        let descriptor = serde_json::json!({
            "executable-path": exe,
            "operating-system": "Windows",
        });
        fs::write(tmp.path().join("win.json"), descriptor.to_string()).unwrap();

        let probe = TableProbe(Vec::new());
        let registry = ModuleRegistry::discover_for(
            &search(&[tmp.path()]),
            &probe,
            OperatingSystem::Linux,
            Architecture::X64,
        );

        assert!(registry.is_empty());
        assert!(matches!(
            registry.candidates()[0].outcome,
            CandidateOutcome::Unavailable {
                error: CandidateError::Incompatible { .. }
            }
        ));
    }

    #[test]
    fn missing_search_directories_are_ignored() {
        let probe = TableProbe(Vec::new());
        let registry =
            ModuleRegistry::discover(&search(&[Path::new("/nonexistent/misa-modules")]), &probe);
        assert!(registry.is_empty());
        assert!(registry.candidates().is_empty());
    }

    #[test]
    fn registry_metadata_comes_from_descriptor() {
        let tmp = TempDir::new().unwrap();
        let exe = tmp.path().join("seg");
        fs::write(&exe, "").unwrap();
        let descriptor = serde_json::json!({
            "executable-path": exe,
            "repository": "misaxx",
        });
        fs::write(tmp.path().join("seg.json"), descriptor.to_string()).unwrap();

        let probe = TableProbe(vec![("seg", Ok(r#"{"name": "seg"}"#))]);
        let registry = ModuleRegistry::discover(&search(&[tmp.path()]), &probe);

        let module = registry.get("seg").unwrap();
        assert_eq!(module.metadata["repository"], "misaxx");
        assert_eq!(module.link_path, tmp.path().join("seg.json"));
    }
}
